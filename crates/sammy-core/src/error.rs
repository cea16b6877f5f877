use thiserror::Error;

/// No matching device found, or the OS denied access to it.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no Samsung download-mode device found")]
    NoDeviceFound,
    #[error("permission denied opening USB device (bus {bus}, address {address})")]
    PermissionDenied { bus: u8, address: u8 },
    #[error("device (bus {bus}, address {address}) is already claimed by another session")]
    AlreadyClaimed { bus: u8, address: u8 },
    #[error("no bulk in/out endpoint pair found on interface 0")]
    NoBulkEndpoints,
    #[error("libusb error: {0}")]
    Usb(#[from] rusb::Error),
}

/// Failures at the USB transport layer: timeouts, stalls, disconnects.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("endpoint stalled")]
    Stall,
    #[error("device disconnected mid-transfer")]
    Disconnected,
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("libusb error: {0}")]
    Usb(rusb::Error),
}

/// Wire-protocol violations: the device didn't speak the protocol correctly.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("frame length {0} exceeds maximum accepted payload of {1} bytes")]
    OversizedLength(u32, u32),
    #[error("reply packet type {got:#x} does not match request type {expected:#x}")]
    ReplyTypeMismatch { expected: u32, got: u32 },
}

/// A sidecar digest did not match the file it describes.
#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("MD5 mismatch for {path}: expected {expected}, computed {computed}")]
    Mismatch {
        path: String,
        expected: String,
        computed: String,
    },
}

/// The firmware archive or one of its members could not be read.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("failed to open firmware archive {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read archive member {name}: {source}")]
    Member {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// An operation was invoked in a session state that does not permit it.
#[derive(Error, Debug)]
#[error("operation '{operation}' is not legal in session state '{state}'")]
pub struct StateError {
    pub operation: &'static str,
    pub state: &'static str,
}

/// The caller requested cancellation of an in-progress operation.
#[derive(Error, Debug)]
#[error("operation cancelled")]
pub struct CancelledError;

/// The top-level error type returned by every `sammy-core` operation.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Cancelled(#[from] CancelledError),
    #[error("engine '{0}' is not implemented; it shells out to a third-party binary")]
    Unsupported(&'static str),
}
