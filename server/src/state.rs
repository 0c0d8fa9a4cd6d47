use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenAuthenticator;
use crate::groups::GroupBackend;
use crate::notify::NotificationDispatcher;
use crate::persistence::{IdentityDirectory, PersistenceGateway};

/// Per-connection timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Upper bound on a single persistence call before it counts as failed
    pub persist_timeout: Duration,
    /// Interval between server pings
    pub ping_interval: Duration,
    /// How long to wait for a pong before closing
    pub pong_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            persist_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

/// Shared application state passed to all handlers via axum State extractor.
/// Collaborators are trait objects so tests and deployments can swap them.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<TokenAuthenticator>,
    pub directory: Arc<dyn IdentityDirectory>,
    pub persistence: Arc<dyn PersistenceGateway>,
    /// Group membership and fan-out
    pub groups: Arc<dyn GroupBackend>,
    pub notifications: NotificationDispatcher,
    pub settings: SessionSettings,
}

impl AppState {
    pub fn new(
        jwt_secret: &[u8],
        directory: Arc<dyn IdentityDirectory>,
        persistence: Arc<dyn PersistenceGateway>,
        groups: Arc<dyn GroupBackend>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            authenticator: Arc::new(TokenAuthenticator::new(jwt_secret)),
            directory,
            persistence,
            notifications: NotificationDispatcher::new(groups.clone()),
            groups,
            settings,
        }
    }
}
