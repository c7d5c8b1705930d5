//! Upload queue with a background worker
//!
//! - `handle`: [`UploadQueue`], the command surface
//! - `worker`: admission, pause/cancel/resume/retry and completion handling
//! - `registry`: active runs and their abort signals
//! - `state`: observer trait and status publishing

mod handle;
mod registry;
mod state;
mod worker;

pub use handle::UploadQueue;
pub use state::TaskObserver;
pub use worker::QueueSnapshot;
