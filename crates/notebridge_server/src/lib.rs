//! # notebridge server
//!
//! Trigger surface for notebridge sync passes.
//!
//! This crate provides:
//! - [`SyncService`]: handles "sync now" and "status" requests
//! - [`Scheduler`]: runs passes on a fixed interval (hourly by default)
//! - JSON request and response types for embedding behind any HTTP stack
//!
//! # Endpoints
//!
//! The service does not listen on a socket. An embedder maps its routes
//! onto requests:
//!
//! | Route | Request |
//! |---|---|
//! | `POST /sync` | `{"action": "sync"}` |
//! | `GET /status` | `{"action": "status"}` |
//!
//! ```rust,ignore
//! let service = Arc::new(SyncService::new(Arc::new(driver)));
//! let scheduler = Scheduler::start(Arc::clone(&service), &ServerConfig::default());
//!
//! // In a request handler:
//! let (code, body) = service.handle_json(r#"{"action":"status"}"#);
//!
//! // On shutdown:
//! let report = scheduler.shutdown().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod scheduler;
mod service;

pub use config::{ServerConfig, DEFAULT_SYNC_INTERVAL};
pub use error::{ServerError, ServerResult};
pub use scheduler::{Scheduler, SchedulerReport};
pub use service::{ServiceRequest, ServiceResponse, StatusReport, SyncService};
