//! # safe_exec HTTP service
//!
//! Thin HTTP front end over [`safe_exec::Engine`].
//!
//! ## Endpoints
//!
//! *   `GET /health` returns `{"ok": true}`.
//! *   `POST /execute` takes `{"script": "..."}` and returns either
//!     `{"result": ..., "stdout": "..."}` with 200 or an error envelope
//!     `{"error": {"code", "message", "details"?}}` whose status follows the
//!     code's class (see [`error::status_for`]).
//! *   `GET /openapi.json` and `GET /docs` describe the two endpoints above.
//!
//! The engine is stateless between requests, so one instance is shared by all
//! handlers behind an `Arc`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use safe_exec::{Engine, ExecConfig};
//! use safe_exec_http::{ServerConfig, start_server};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Arc::new(Engine::new(Arc::new(ExecConfig::default())));
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:8080".parse()?,
//!     };
//!     start_server(config, engine).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod openapi;
pub mod server;

pub use error::{ApiError, Result, ServerError, status_for};
pub use server::{ServerConfig, build_router, start_server};
