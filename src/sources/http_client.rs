use crate::config::PriceSourceConfig;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tracing::{debug, warn};

#[derive(Debug)]
enum Attempt {
    /// Worth retrying: network errors, 429, 5xx.
    Transient(String),
    Fatal(String),
}

impl Attempt {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) | Self::Fatal(msg) => f.write_str(msg),
        }
    }
}

pub struct HttpClient {
    inner: reqwest::Client,
    config: PriceSourceConfig,
}

impl HttpClient {
    pub fn new(config: &PriceSourceConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based endpoints work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL as text with a polite delay and jittered exponential retry.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.polite_delay().await;

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.request_delay_ms.max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.config.max_retries);

        let mut attempt = 0u32;
        RetryIf::start(
            strategy,
            || {
                attempt += 1;
                self.try_get(url, attempt)
            },
            Attempt::is_transient,
        )
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("All retries exhausted for {}", url))
    }

    async fn try_get(&self, url: &str, attempt: u32) -> std::result::Result<String, Attempt> {
        debug!("GET {} (attempt {})", url, attempt);

        let resp = self.inner.get(url).send().await.map_err(|e| {
            warn!("Request failed on attempt {}: {}", attempt, e);
            Attempt::Transient(format!("Request error: {}", e))
        })?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .text()
                .await
                .map_err(|e| Attempt::Transient(format!("Failed to read response body: {}", e)));
        }

        if status.as_u16() == 429 || status.is_server_error() {
            warn!("HTTP {} on attempt {}, backing off", status, attempt);
            Err(Attempt::Transient(format!("HTTP {}", status)))
        } else {
            Err(Attempt::Fatal(format!("HTTP error {}", status)))
        }
    }

    /// Sleep for the configured delay plus random jitter.
    async fn polite_delay(&self) {
        let base = Duration::from_millis(self.config.request_delay_ms);
        sleep(base + jitter(base)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `statuses` in order (the last one repeats) and counts requests.
    async fn serve(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/chart", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = statuses[n.min(statuses.len() - 1)];
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = if status == 200 { "ok" } else { "" };
                let resp = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(resp.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (url, hits)
    }

    fn client() -> HttpClient {
        let config = PriceSourceConfig {
            request_delay_ms: 1,
            max_retries: 3,
            timeout_secs: 5,
            ..PriceSourceConfig::default()
        };
        HttpClient::new(&config).unwrap()
    }

    #[test]
    fn test_server_errors_are_retried() {
        tokio_test::block_on(async {
            let (url, hits) = serve(vec![503, 503, 200]).await;
            let body = client().get_text(&url).await.unwrap();
            assert_eq!(body, "ok");
            assert_eq!(hits.load(Ordering::SeqCst), 3);
        });
    }

    #[test]
    fn test_client_errors_fail_without_retry() {
        tokio_test::block_on(async {
            let (url, hits) = serve(vec![404]).await;
            let err = client().get_text(&url).await.unwrap_err();
            assert!(format!("{:#}", err).contains("404"));
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        });
    }
}
