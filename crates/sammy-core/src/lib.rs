//! Core protocol engine for flashing Samsung mobile devices in download
//! mode: USB transport, frame codec, session state machine, PIT retrieval,
//! the partition flasher, the firmware package parser, and the
//! orchestrator that sequences them.
//!
//! This crate has no process-wide state: every session, transport, and
//! orchestrator run is a value the caller owns.

pub mod engine;
pub mod error;
pub mod flasher;
pub mod frame;
pub mod orchestrator;
pub mod package;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use engine::Engine;
pub use error::EngineError;
pub use flasher::{CancelToken, ChunkSize, NoProgress, Progress, ProgressSink};
pub use frame::PacketType;
pub use orchestrator::{FlashSource, OrchestratorOptions, VerifyPolicy};
pub use package::Integrity;
pub use session::{DeviceInfo, Session, SessionState};
pub use transport::{
    DOWNLOAD_MODE_PRODUCT_IDS, DeviceDescriptor, DeviceMode, RusbTransport, SAMSUNG_VENDOR_ID,
    discover,
};
