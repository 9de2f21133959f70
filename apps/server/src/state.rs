use std::sync::Arc;

use doc_translator_core::{
    AppConfig, BatchRegistry, Scheduler, ServiceError, TaskStore,
};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<TaskStore>,
    pub scheduler: Arc<Scheduler>,
    pub batches: Arc<BatchRegistry>,
}

impl AppState {
    /// Map a service error into an API response. Outside production the
    /// body carries the error chain for debugging.
    pub fn reject(&self, error: ServiceError) -> ApiError {
        ApiError::from_service(error, !self.config.is_production())
    }
}
