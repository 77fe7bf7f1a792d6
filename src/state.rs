use std::sync::Arc;

use crate::service::relay_service::RelayService;

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayService,
    /// Lower-cased name of the header carrying the resolved caller id.
    pub auth_header: Arc<str>,
}

impl AppState {
    pub fn new(relay: RelayService, auth_header: &str) -> Self {
        Self { relay, auth_header: Arc::from(auth_header.to_ascii_lowercase()) }
    }
}
