//! Identity-auth collaborator: single-use transfer credentials.

use std::time::Duration;

use {serde::Deserialize, tracing::debug, uuid::Uuid};

use crate::{CommsError, Result};

#[derive(Debug, Deserialize)]
struct NewKeyResponse {
    key: String,
}

/// Client for the home user service's key endpoint. Each region transfer is
/// authorized by a fresh key derived from the login auth token.
pub struct AuthClient {
    client: reqwest::Client,
    auth_url: String,
    user_id: Uuid,
    auth_token: Uuid,
}

impl AuthClient {
    pub fn new(auth_url: String, user_id: Uuid, auth_token: Uuid, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            auth_url,
            user_id,
            auth_token,
        }
    }

    /// Mint a new single-use key for a presence transfer.
    pub async fn get_new_key(&self) -> Result<String> {
        let body = serde_json::json!({
            "method": "hg_new_auth_key",
            "user_id": self.user_id,
            "token": self.auth_token,
        });

        let resp: NewKeyResponse = self
            .client
            .post(&self.auth_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if resp.key.is_empty() {
            return Err(CommsError::Backend("auth service returned an empty key".into()));
        }
        debug!(user = %self.user_id, "obtained transfer key");
        Ok(resp.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mints_a_key() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"key": "abc123"}"#)
            .create_async()
            .await;

        let client = AuthClient::new(
            server.url(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Duration::from_secs(6),
        );
        assert_eq!(client.get_new_key().await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn empty_key_is_a_backend_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"key": ""}"#)
            .create_async()
            .await;

        let client = AuthClient::new(
            server.url(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Duration::from_secs(6),
        );
        assert!(client.get_new_key().await.is_err());
    }
}
