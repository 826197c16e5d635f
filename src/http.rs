//! The network call wrapped by the guards
//!
//! One GET under its own deadline. Non-2xx responses become
//! `ApiError::Http` with the status and body text so callers can tell a
//! rejected request from a transport failure.

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Build the shared HTTP client
pub fn build_client() -> ApiResult<Client> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| ApiError::Other(anyhow::anyhow!("failed to build HTTP client: {}", e)))
}

/// Join a backend base URL and a request path; absolute URLs pass through
pub fn join_url(base_url: Option<&str>, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    match base_url {
        Some(base) => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ),
        None => path.to_string(),
    }
}

/// Map a reqwest error to the guard's taxonomy
pub fn classify(err: reqwest::Error, timeout: Duration) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout(timeout)
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        ApiError::Http {
            status: status.as_u16(),
            body: err.to_string(),
        }
    } else {
        ApiError::Network(err.to_string())
    }
}

/// GET `url` and parse the JSON body
pub async fn fetch_json<T>(client: &Client, url: &str, timeout: Duration) -> ApiResult<T>
where
    T: DeserializeOwned,
{
    tracing::debug!("GET {}", url);

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify(e, timeout))?;

    let status = response.status();
    let text = response.text().await.map_err(|e| classify(e, timeout))?;

    if !status.is_success() {
        return Err(ApiError::Http {
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url(Some("https://api.binance.com/api/v3/"), "/ticker/price"),
            "https://api.binance.com/api/v3/ticker/price"
        );
        assert_eq!(
            join_url(Some("https://api.coingecko.com/api/v3"), "ping"),
            "https://api.coingecko.com/api/v3/ping"
        );
        assert_eq!(
            join_url(Some("https://api.binance.com"), "https://example.org/x"),
            "https://example.org/x"
        );
        assert_eq!(join_url(None, "ping"), "ping");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = build_client().unwrap();
        // Port 9 on loopback: nothing listens there in the test environment
        let result: ApiResult<serde_json::Value> =
            fetch_json(&client, "http://127.0.0.1:9/", Duration::from_secs(2)).await;
        match result {
            Err(ApiError::Network(_)) | Err(ApiError::Timeout(_)) => {}
            other => panic!("expected transport failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_error_carries_status_and_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let body = "rate limited";
            let response = format!(
                "HTTP/1.1 429 Too Many Requests\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        let client = build_client().unwrap();
        let url = format!("http://{}/api/v3/ticker/price", addr);
        let result: ApiResult<serde_json::Value> =
            fetch_json(&client, &url, Duration::from_secs(5)).await;

        match result {
            Err(ApiError::Http { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }
    }
}
