//! Retrying HTTP client shared by remote package sources.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::io::Write;

use super::retry::{RetryPolicy, check_response, is_retryable};

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// GET and deserialize a JSON body.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET JSON from {}...", url);

        self.with_retry("GET JSON", || async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .context("Failed to send request")?;

            check_response(response)?
                .json::<T>()
                .await
                .with_context(|| format!("Failed to parse JSON from {}", url))
        })
        .await
    }

    /// GET a body as text. Used for manifest assets, which are parsed by
    /// the caller so that parse failures name the package.
    #[tracing::instrument(skip(self))]
    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET text from {}...", url);

        self.with_retry("GET text", || async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .context("Failed to send request")?;

            check_response(response)?
                .text()
                .await
                .context("Failed to read response body")
        })
        .await
    }

    /// Streams `url` into the writer produced by `create_writer`, calling
    /// `on_chunk` with the size of every chunk written.
    ///
    /// A fresh writer is created for each attempt, so a retried download
    /// never appends to a partial one. Returns the number of bytes written
    /// by the successful attempt.
    #[tracing::instrument(skip(self, create_writer, on_chunk))]
    pub async fn download_file<W, F, P>(
        &self,
        url: &str,
        create_writer: F,
        on_chunk: P,
    ) -> Result<u64>
    where
        W: Write + Send,
        F: Fn() -> Result<W> + Send + Sync,
        P: Fn(u64) + Send + Sync,
    {
        debug!("Downloading file from {}...", url);

        let create_writer = &create_writer;
        let on_chunk = &on_chunk;
        self.with_retry("Download", || {
            self.download_file_once(url, create_writer, on_chunk)
        })
        .await
    }

    async fn download_file_once<W, F, P>(
        &self,
        url: &str,
        create_writer: &F,
        on_chunk: &P,
    ) -> Result<u64>
    where
        W: Write + Send,
        F: Fn() -> Result<W> + Send + Sync,
        P: Fn(u64) + Send + Sync,
    {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to start download request")?;

        let mut response = check_response(response)?;
        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
            on_chunk(chunk.len() as u64);
        }
        writer.flush().context("Failed to flush download")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }

    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !is_retryable(&e) => {
                    debug!("{}: non-retryable error: {}", operation_name, e);
                    return Err(e);
                }
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}...",
                        operation_name, attempt, attempts, e, self.policy.delay
                    );
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::NonRetryableError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    fn client() -> HttpClient {
        HttpClient::new(Client::new()).with_policy(RetryPolicy::new(3, Duration::ZERO))
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/releases")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"tag_name": "v1.0.0"}]"#)
            .create_async()
            .await;

        let result: serde_json::Value = client()
            .get_json(&format!("{}/releases", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result[0]["tag_name"], "v1.0.0");
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let err = client()
            .get_text(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(
            err.downcast_ref::<NonRetryableError>(),
            Some(NonRetryableError::NotFound(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_server_error_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let result = client().get_text(&format!("{}/flaky", server.url())).await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_download_file_reports_chunks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cub.zip")
            .with_status(200)
            .with_body("zip payload")
            .create_async()
            .await;

        let reported = AtomicU64::new(0);
        let bytes = client()
            .download_file(
                &format!("{}/cub.zip", server.url()),
                || Ok(std::io::sink()),
                |n| {
                    reported.fetch_add(n, Ordering::Relaxed);
                },
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, 11);
        assert_eq!(reported.load(Ordering::Relaxed), 11);
    }

    #[tokio::test]
    async fn test_with_retry_recovers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = client()
            .with_retry("test", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(anyhow::anyhow!("connection reset"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_single_attempt_policy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = HttpClient::new(Client::new())
            .with_policy(RetryPolicy::none())
            .with_retry("test", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("timeout"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
