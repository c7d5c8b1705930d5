//! Chunk transfer engine
//!
//! Transfers one file into one server-side session:
//! - chunk slicing and strictly sequential upload
//! - per-chunk retry with exponential backoff
//! - reconciliation against server-reported chunk state on (re)start
//! - cooperative pause/cancel through [`AbortSignal`]

mod abort;
mod engine;

pub use abort::{AbortReason, AbortSignal};
pub use engine::{TransferEngine, TransferListener};
