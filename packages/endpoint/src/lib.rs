//! # silo-endpoint
//!
//! Compute endpoints, in-process or served over HTTP.
//!
//! ```text
//! ExecutionRequest ──> LocalEndpoint ──create──> TaskBoard (Host Task API)
//!                           │                        ▲   │
//!                           └──spawn──> Agent ──fetch┘   │
//!                                         └──post result─┘
//! ```
//!
//! [`serve`] puts a [`LocalEndpoint`] behind `POST /api/execute` and exposes
//! its board as the Host Task API, so `HttpExecutor` callers and
//! `silo-agent` processes can reach it over the network.

pub mod board;
pub mod config;
pub mod endpoint;
pub mod server;

pub use board::{BoardError, TaskBoard, TaskRecord, TaskStatus};
pub use config::EndpointConfig;
pub use endpoint::{LocalCluster, LocalEndpoint, NO_REPORT_MESSAGE};
pub use server::{router, serve, ServeError, ServeHandle};
