//! JSON POST client for the remote collector and the completion notice.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;

use crate::error::Result;

/// Request timeout for every POST.
pub const POST_TIMEOUT: Duration = Duration::from_secs(20);

/// Posts JSON documents to one fixed endpoint.
///
/// Redirects are not followed and the endpoint's TLS certificate is not
/// verified.
#[derive(Debug, Clone)]
pub struct CollectorClient {
    client: reqwest::Client,
    url: String,
}

impl CollectorClient {
    /// Creates a client for `url`.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("PassiveScanner/{}", env!("CARGO_PKG_VERSION")))
            .timeout(POST_TIMEOUT)
            .redirect(Policy::none())
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// The endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// POSTs `body` as `application/json` and returns the response text.
    pub async fn post_json(&self, body: String) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let text = response.text().await?;
        tracing::info!("Return message: {}", text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_responder;
    use crate::ProxyError;

    #[tokio::test]
    async fn posts_json_body() {
        let (addr, mut requests) = spawn_responder("accepted").await;
        let client = CollectorClient::new(format!("http://{}/result", addr)).unwrap();

        let reply = client.post_json(r#"{"id":"r1"}"#.to_string()).await.unwrap();
        assert_eq!(reply, "accepted");

        let request = requests.recv().await.unwrap();
        assert!(request.head.starts_with("POST /result HTTP/1.1"));
        assert!(request
            .head
            .to_ascii_lowercase()
            .contains("content-type: application/json"));
        assert_eq!(request.body, r#"{"id":"r1"}"#);
    }

    #[tokio::test]
    async fn unreachable_collector_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = CollectorClient::new(format!("http://{}/", addr)).unwrap();
        let result = client.post_json("{}".to_string()).await;
        assert!(matches!(result, Err(ProxyError::Network(_))));
    }
}
