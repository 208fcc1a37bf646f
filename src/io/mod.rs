//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `status_api` - GraphQL client for the remote zone status API
//! - `persistence` - Zone state storage (JSON file)
//! - `pushover` - Push notification channel
//! - `webhook` - JSON webhook notification channel
//! - `status_server` - Status/Prometheus HTTP endpoint

pub mod persistence;
pub mod pushover;
pub mod status_api;
pub mod status_server;
pub mod webhook;

// Re-export commonly used types
pub use persistence::{JsonFileStore, PersistenceGateway};
pub use status_api::{HttpStatusClient, RemoteStatusClient};
pub use status_server::{start_status_server, StatusState};
