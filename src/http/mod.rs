//! HTTP access for remote package sources, with retry and error classification.

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::{NonRetryableError, RetryPolicy, check_response, classify_status, is_retryable};
