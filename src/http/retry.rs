//! Failure classification for release-feed and download requests.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// How often and how patiently a request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: usize, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A single attempt, for tests and callers that handle failure themselves.
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Responses that will not improve by asking again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NonRetryableError {
    #[error("Rate limit exceeded for {0}. Try again later or set GITHUB_TOKEN.")]
    RateLimitExceeded(String),

    #[error("Authentication failed for {0}. Check your GITHUB_TOKEN.")]
    AuthenticationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access forbidden: {0}")]
    Forbidden(String),

    #[error("HTTP {status} for {url}")]
    ClientError { url: String, status: u16 },
}

/// Maps a response status to a non-retryable error, or `None` when the
/// request is worth repeating (server errors, success).
pub fn classify_status(
    status: StatusCode,
    url: &str,
    rate_limit_exhausted: bool,
) -> Option<NonRetryableError> {
    let url = url.to_string();
    match status {
        StatusCode::UNAUTHORIZED => Some(NonRetryableError::AuthenticationFailed(url)),
        StatusCode::FORBIDDEN if rate_limit_exhausted => {
            Some(NonRetryableError::RateLimitExceeded(url))
        }
        StatusCode::FORBIDDEN => Some(NonRetryableError::Forbidden(url)),
        StatusCode::TOO_MANY_REQUESTS => Some(NonRetryableError::RateLimitExceeded(url)),
        StatusCode::NOT_FOUND => Some(NonRetryableError::NotFound(url)),
        s if s.is_client_error() => Some(NonRetryableError::ClientError {
            url,
            status: s.as_u16(),
        }),
        _ => None,
    }
}

/// Turns a failed response into an error, marking it non-retryable where
/// [`classify_status`] says so.
pub fn check_response(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let rate_limit_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .is_some_and(|v| v.as_bytes() == b"0");

    match classify_status(status, &url, rate_limit_exhausted) {
        Some(non_retryable) => Err(non_retryable.into()),
        None => Err(anyhow::anyhow!("HTTP {} for {}", status.as_u16(), url)),
    }
}

pub fn is_retryable(error: &anyhow::Error) -> bool {
    error.downcast_ref::<NonRetryableError>().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        let url = "https://api.github.com/repos/o/r/releases";
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, url, false),
            Some(NonRetryableError::AuthenticationFailed(url.into()))
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, url, true),
            Some(NonRetryableError::RateLimitExceeded(url.into()))
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, url, false),
            Some(NonRetryableError::Forbidden(url.into()))
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, url, false),
            Some(NonRetryableError::RateLimitExceeded(url.into()))
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, url, false),
            Some(NonRetryableError::NotFound(url.into()))
        );
        assert_eq!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, url, false),
            Some(NonRetryableError::ClientError {
                url: url.into(),
                status: 422
            })
        );
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY, url, false), None);
        assert_eq!(classify_status(StatusCode::OK, url, false), None);
    }

    #[test]
    fn test_rate_limit_message_mentions_token() {
        let err = NonRetryableError::RateLimitExceeded("x".into());
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&anyhow::anyhow!("connection reset by peer")));
        assert!(!is_retryable(&anyhow::Error::from(
            NonRetryableError::NotFound("x".into())
        )));
    }

    #[tokio::test]
    async fn test_check_response_rate_limit_header() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .create_async()
            .await;

        let response = reqwest::Client::new().get(server.url()).send().await.unwrap();
        let err = check_response(response).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NonRetryableError>(),
            Some(NonRetryableError::RateLimitExceeded(_))
        ));
    }

    #[tokio::test]
    async fn test_check_response_server_error_is_retryable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let response = reqwest::Client::new().get(server.url()).send().await.unwrap();
        let err = check_response(response).unwrap_err();
        assert!(is_retryable(&err));
        assert!(err.to_string().contains("503"));
    }
}
