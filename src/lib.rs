//! Client-side image compression: pick or drop images, resize them to a
//! chosen maximum side, re-encode them on a background codec worker and
//! report the savings.
//!
//! Everything here runs without a window; `src/main.rs` is the iced front
//! end that drives [`session::AppState`].

pub mod archive;
pub mod batch;
pub mod codec;
pub mod config;
pub mod error;
pub mod intake;
pub mod metrics;
pub mod mime;
pub mod orchestrator;
pub mod resize;
pub mod session;
pub mod worker;

pub use codec::{EncodeOptions, ProcessedResult};
pub use config::Settings;
pub use orchestrator::Orchestrator;
pub use resize::ResizePolicy;
pub use worker::CodecWorker;
