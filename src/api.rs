//! HTTP API for the consultation simulator

mod handlers;
mod types;

pub use handlers::create_router;

use crate::service::ConsultService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: ConsultService,
}

impl AppState {
    pub fn new(service: ConsultService) -> Self {
        Self { service }
    }
}
