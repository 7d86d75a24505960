//! Credentials and service endpoints for the remote services
//!
//! Acquiring tokens is the job of an external collaborator; the agent only
//! asks a [`TokenSource`] for the current session each time it needs one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Remote services the agent talks to with a bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Image catalog
    Image,
    /// Capacity-tracking service
    Placement,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Image => f.write_str("image"),
            ServiceKind::Placement => f.write_str("placement"),
        }
    }
}

/// A bearer token together with the endpoints it is valid for
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    token: String,
    endpoints: HashMap<ServiceKind, String>,
}

impl AuthSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            endpoints: HashMap::new(),
        }
    }

    pub fn with_endpoint(mut self, kind: ServiceKind, url: impl Into<String>) -> Self {
        self.endpoints
            .insert(kind, url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Base URL of a service, without trailing slash
    pub fn endpoint(&self, kind: ServiceKind) -> Option<&str> {
        self.endpoints.get(&kind).map(String::as_str)
    }
}

// Keep tokens out of logs.
impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

/// Supplies the current authentication session
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// The current session, or `None` when no credentials are available
    async fn session(&self) -> Option<AuthSession>;
}

/// Token source backed by fixed, pre-provisioned credentials
#[derive(Debug, Clone, Default)]
pub struct StaticTokenSource {
    session: Option<AuthSession>,
}

impl StaticTokenSource {
    pub fn new(session: AuthSession) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// A source that never yields credentials
    pub fn empty() -> Self {
        Self { session: None }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn session(&self) -> Option<AuthSession> {
        self.session.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_are_normalized() {
        let session =
            AuthSession::new("tok").with_endpoint(ServiceKind::Image, "http://glance:9292/");
        assert_eq!(session.endpoint(ServiceKind::Image), Some("http://glance:9292"));
        assert_eq!(session.endpoint(ServiceKind::Placement), None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = AuthSession::new("secret-token");
        assert!(!format!("{:?}", session).contains("secret-token"));
    }

    #[tokio::test]
    async fn test_static_source() {
        assert!(StaticTokenSource::empty().session().await.is_none());

        let source = StaticTokenSource::new(AuthSession::new("tok"));
        assert_eq!(source.session().await.unwrap().token(), "tok");
    }
}
