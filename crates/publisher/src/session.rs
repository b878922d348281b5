use tracing::{info, warn};

use crate::client::BlueskyClient;
use crate::error::{AutoPostError, Result};
use crate::models::{Credentials, Session};

/// Exchanges credentials for a session. Sessions are never cached or refreshed.
pub struct SessionManager {
    client: BlueskyClient,
}

impl SessionManager {
    pub fn new(client: BlueskyClient) -> Self {
        Self { client }
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Session> {
        if credentials.is_empty() {
            return Err(AutoPostError::Config(
                "Identifier or app password not configured".to_string(),
            ));
        }

        match self.client.create_session(credentials).await {
            Ok(session) => {
                info!("Authenticated as {}", session.did);
                Ok(session)
            }
            Err(AutoPostError::Api { status, body }) => {
                warn!("Session request rejected ({}): {}", status, body);
                Err(AutoPostError::Auth(format!(
                    "identity endpoint returned {}",
                    status
                )))
            }
            Err(e) => {
                warn!("Session request failed: {}", e);
                Err(AutoPostError::Auth(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DEFAULT_SERVICE_URL;
    use crate::http::Method;
    use crate::testing::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    const CREATE_SESSION: &str = "https://bsky.social/xrpc/com.atproto.server.createSession";

    fn manager(transport: MockTransport) -> (Arc<MockTransport>, SessionManager) {
        let transport = Arc::new(transport);
        let client = BlueskyClient::new(transport.clone(), DEFAULT_SERVICE_URL);
        (transport, SessionManager::new(client))
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let (_, manager) = manager(MockTransport::new().json(
            Method::Post,
            CREATE_SESSION,
            200,
            json!({ "did": "did:plc:me", "accessJwt": "jwt" }),
        ));

        let session = manager
            .authenticate(&Credentials::new("me.bsky.social", "pass"))
            .await
            .unwrap();

        assert_eq!(session.did, "did:plc:me");
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_auth_error() {
        let (_, manager) = manager(MockTransport::new().json(
            Method::Post,
            CREATE_SESSION,
            401,
            json!({ "error": "AuthenticationRequired" }),
        ));

        let err = manager
            .authenticate(&Credentials::new("me.bsky.social", "bad"))
            .await
            .unwrap_err();

        assert!(matches!(err, AutoPostError::Auth(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_auth_error() {
        let (_, manager) = manager(MockTransport::new().fail(Method::Post, CREATE_SESSION, "timed out"));

        let err = manager
            .authenticate(&Credentials::new("me.bsky.social", "pass"))
            .await
            .unwrap_err();

        assert!(matches!(err, AutoPostError::Auth(_)));
    }

    #[tokio::test]
    async fn test_empty_credentials_skip_network() {
        let (transport, manager) = manager(MockTransport::new());

        let err = manager
            .authenticate(&Credentials::new("", "pass"))
            .await
            .unwrap_err();

        assert!(matches!(err, AutoPostError::Config(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let credentials = Credentials::new("me.bsky.social", "hunter2");
        let session = Session {
            did: "did:plc:me".to_string(),
            access_jwt: "eyJsecret".to_string(),
            handle: None,
        };

        assert!(!format!("{:?}", credentials).contains("hunter2"));
        assert!(!format!("{:?}", session).contains("eyJsecret"));
    }
}
