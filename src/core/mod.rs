// This module gathers the infrastructure shared by every stage of the offload pass: the error
// taxonomy (OffloadError with its internal-consistency and external-failure variants) and the
// per-run session that owns unique-name generation and statistics. Stages receive these
// explicitly rather than through globals, so several pass runs can coexist in one process.

//! Core offload infrastructure
//!
//! ## Errors (`error`)
//! - [`OffloadError`] and the [`OffloadResult`] alias
//! - Internal-consistency errors carry the offending symbol
//!
//! ## Session Management (`session`)
//! - Unique names for synthesized result variables
//! - Offload statistics

pub mod error;
pub mod session;

pub use error::{OffloadError, OffloadResult};
pub use session::{OffloadSession, SessionStats};
