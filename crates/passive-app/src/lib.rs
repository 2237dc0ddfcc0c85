//! Passive Scanner - command-line front end of the passive scan proxy.
//!
//! This crate wires the proxy into a single timed run:
//!
//! - [`cli`]: flags, build info and the `--generate-ca` mode
//! - [`run`]: [`RunController`] waits for the deadline or a cancellation,
//!   then persists the captured requests
//! - [`logging`]: diagnostic logging to console and a rolling file
//!
//! # Usage
//!
//! ```ignore
//! use passive_app::{RunController, RunError};
//! use passive_core::RunSettings;
//!
//! let settings = RunSettings::new("task-1", "/opt/scanner").with_max_run_time(30);
//! let mut controller = RunController::new(settings);
//! let outcome = controller.run(async { let _ = tokio::signal::ctrl_c().await; }).await;
//! assert!(outcome.is_termination());
//! ```

pub mod cli;
pub mod error;
pub mod logging;
pub mod run;

pub use cli::{generate_ca, Args, BuildInfo};
pub use error::RunError;
pub use run::{persist_run_log, RunController, RunState};
