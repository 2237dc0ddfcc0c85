//! Passive Core - request records, fingerprinting, and deduplication.
//!
//! This crate holds the parts of the passive scanner that do not touch the
//! network:
//!
//! - [`RunSettings`]: immutable configuration of one capture run
//! - [`CapturedRequest`]: the record emitted for every unique request
//! - [`fingerprint`]: canonical request shapes and their MD5 dedup digest
//! - [`DedupGate`]: admits each digest once per run
//!
//! ## Pipeline
//!
//! ```text
//! CapturedRequest → fingerprint(ignore_case) → md5 → DedupGate.try_admit
//!                                                        │
//!                                         ┌──────────────┴──────────────┐
//!                                         │ first time                  │ seen
//!                                         ▼                             ▼
//!                                  record.admitted(digest)            drop
//! ```

mod dedup;
mod error;
pub mod features;
pub mod fingerprint;
mod record;
pub mod settings;

pub use dedup::DedupGate;
pub use error::{CoreError, Result};
pub use record::{
    canonical_header_name, is_capturable_length, is_captured_method, CapturedRequest,
    CompletionNotice, RemoteOutput, ADMITTED_TAG, MAX_CAPTURED_BODY,
};
pub use settings::RunSettings;
