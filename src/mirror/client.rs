use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};

use super::Mirror;
use super::error::MirrorError;

/// REST client for a Firebase-style realtime database.
///
/// Each write is `PUT {base_url}/{path}.json`, which replaces the node at
/// `path` wholesale.
pub struct RealtimeDbClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl RealtimeDbClient {
    pub fn new(
        base_url: String,
        auth_token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, MirrorError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.filter(|t| !t.is_empty()),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }
}

#[async_trait]
impl Mirror for RealtimeDbClient {
    async fn put(&self, path: &str, fields: &Map<String, Value>) -> Result<(), MirrorError> {
        let mut request = self.client.put(self.url_for(path)).json(fields);
        if let Some(token) = &self.auth_token {
            request = request.query(&[("auth", token.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(MirrorError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
