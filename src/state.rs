//! Application state management

use std::sync::Arc;

use crate::db::MetadataStore;
use crate::upload::{ProgressRegistry, UploadCoordinator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    coordinator: UploadCoordinator,
    metadata: Arc<dyn MetadataStore>,
}

impl AppState {
    pub fn new(coordinator: UploadCoordinator, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                coordinator,
                metadata,
            }),
        }
    }

    /// Get the upload coordinator
    pub fn coordinator(&self) -> &UploadCoordinator {
        &self.inner.coordinator
    }

    /// Get the progress registry
    pub fn registry(&self) -> &ProgressRegistry {
        self.inner.coordinator.registry()
    }

    /// Get the completion record store
    pub fn metadata(&self) -> &dyn MetadataStore {
        self.inner.metadata.as_ref()
    }
}
