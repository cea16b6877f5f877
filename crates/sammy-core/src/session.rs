//! The protocol state machine: disconnected -> connected -> handshaken ->
//! closed. Enforces that operations are issued only in legal states and
//! guarantees interface release on every exit path.

use std::time::Duration;

use crate::error::{EngineError, ProtocolError, StateError};
use crate::flasher::{ChunkSize, Progress, ProgressSink};
use crate::frame::{self, PacketType};
use crate::transport::{DeviceDescriptor, RusbTransport, UsbTransport};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);
const PIT_TIMEOUT: Duration = Duration::from_secs(10);
const CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Handshaken,
    Closed,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::Handshaken => "handshaken",
            SessionState::Closed => "closed",
        }
    }
}

/// Device metadata returned by the `DEVICE_TYPE` packet. The payload format
/// is otherwise opaque to the core; the two leading little-endian u32
/// fields are the ones the original tooling relies on.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub raw: Vec<u8>,
}

impl DeviceInfo {
    pub fn device_type(&self) -> Option<u32> {
        self.raw
            .get(0..4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn bootloader_version(&self) -> Option<u32> {
        self.raw
            .get(4..8)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// A claimed USB interface plus the state machine that governs legal
/// operations on it. Generic over the transport so tests can substitute a
/// [`crate::test_support::MockTransport`] for real hardware.
pub struct Session<T: UsbTransport> {
    transport: Option<T>,
    state: SessionState,
}

impl Session<RusbTransport> {
    /// Claims the USB interface for `descriptor`, moving disconnected ->
    /// connected. On failure the session remains disconnected (no session
    /// object is produced).
    pub fn connect(descriptor: &DeviceDescriptor) -> Result<Self, EngineError> {
        let transport = RusbTransport::open(descriptor)?;
        log::info!("connected to {} ({})", descriptor.label(), descriptor.address);
        Ok(Self {
            transport: Some(transport),
            state: SessionState::Connected,
        })
    }
}

impl<T: UsbTransport> Session<T> {
    /// Wraps an already-open transport directly into the `connected` state.
    /// Used by tests and by callers that manage device opening themselves.
    pub fn from_transport(transport: T) -> Self {
        Self {
            transport: Some(transport),
            state: SessionState::Connected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn require_state(
        &self,
        operation: &'static str,
        expected: SessionState,
    ) -> Result<(), StateError> {
        if self.state != expected {
            return Err(StateError {
                operation,
                state: self.state.name(),
            });
        }
        Ok(())
    }

    fn transport_mut(&mut self) -> &mut T {
        self.transport
            .as_mut()
            .expect("transport present while state != Closed")
    }

    fn close(&mut self) {
        self.state = SessionState::Closed;
        self.transport = None;
    }

    /// Sends `packet_type` with `payload` and awaits a reply of the same
    /// type. On any transport or protocol failure the session closes.
    fn request(
        &mut self,
        packet_type: PacketType,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, EngineError> {
        let frame = frame::encode(packet_type, payload);

        let result: Result<Vec<u8>, EngineError> = (|| {
            self.transport_mut().write(&frame, timeout)?;
            let (reply_type, reply_payload) = frame::decode(self.transport_mut(), timeout)?;
            if reply_type != packet_type.code() {
                return Err(ProtocolError::ReplyTypeMismatch {
                    expected: packet_type.code(),
                    got: reply_type,
                }
                .into());
            }
            Ok(reply_payload)
        })();

        if result.is_err() {
            self.close();
        }

        result
    }

    /// Sends `HANDSHAKE` and awaits the reply. On mismatch or timeout the
    /// session closes and a [`ProtocolError`] is returned.
    pub fn handshake(&mut self) -> Result<(), EngineError> {
        self.require_state("handshake", SessionState::Connected)?;
        self.request(PacketType::Handshake, &[], CONTROL_TIMEOUT)?;
        self.state = SessionState::Handshaken;
        log::info!("handshake complete");
        Ok(())
    }

    /// Requests `DEVICE_TYPE`. Legal only once handshaken.
    pub fn device_info(&mut self) -> Result<DeviceInfo, EngineError> {
        self.require_state("device_info", SessionState::Handshaken)?;
        let raw = self.request(PacketType::DeviceType, &[], CONTROL_TIMEOUT)?;
        Ok(DeviceInfo { raw })
    }

    /// Requests `PIT_FILE` with an empty payload and returns the raw PIT
    /// image verbatim. Uses an extended timeout because the device reads
    /// flash media to answer.
    pub fn get_pit(&mut self) -> Result<Vec<u8>, EngineError> {
        self.require_state("get_pit", SessionState::Handshaken)?;
        log::info!("requesting PIT");
        let pit = self.request(PacketType::PitFile, &[], PIT_TIMEOUT)?;
        log::info!("received PIT ({} bytes)", pit.len());
        Ok(pit)
    }

    /// Flashes `data` under `partition_name` using the
    /// `set-total-bytes -> send-chunk -> ack` loop. The partition name is
    /// informational for this layer. Chunks are strictly sequential: the
    /// engine never has more than one outstanding request. Any protocol-level
    /// error is fatal for the partition and closes the session; the core
    /// does not retry in-band because the device may be left in an
    /// indeterminate write state.
    pub fn flash_partition(
        &mut self,
        partition_name: &str,
        data: &[u8],
        chunk_size: ChunkSize,
        progress: &mut dyn ProgressSink,
        cancel: &crate::flasher::CancelToken,
    ) -> Result<(), EngineError> {
        self.require_state("flash_partition", SessionState::Handshaken)?;

        let total = data.len();
        log::info!("flashing partition '{partition_name}' ({total} bytes)");

        self.request(
            PacketType::FlashSetTotalBytes,
            &(total as u32).to_le_bytes(),
            CONTROL_TIMEOUT,
        )?;

        let chunk_size = chunk_size.bytes();
        let mut sent = 0usize;

        while sent < total {
            if cancel.is_cancelled() {
                log::warn!("flash of '{partition_name}' cancelled at {sent}/{total} bytes");
                self.close();
                return Err(crate::error::CancelledError.into());
            }

            let end = (sent + chunk_size).min(total);
            let chunk = &data[sent..end];

            self.request(PacketType::FlashSendData, chunk, CHUNK_TIMEOUT)?;

            sent = end;

            progress.on_progress(&Progress {
                current_bytes: sent as u64,
                total_bytes: total as u64,
                current_file: partition_name.to_string(),
                stage: "sending".to_string(),
                percentage: if total == 0 {
                    100.0
                } else {
                    100.0 * sent as f32 / total as f32
                },
            });
        }

        if total == 0 {
            progress.on_progress(&Progress {
                current_bytes: 0,
                total_bytes: 0,
                current_file: partition_name.to_string(),
                stage: "sending".to_string(),
                percentage: 0.0,
            });
        }

        log::info!("partition '{partition_name}' flashed successfully");
        Ok(())
    }

    /// Sends `END_SESSION` and tears the session down. The device resets its
    /// USB endpoint on receiving this, so the session transitions to closed
    /// unconditionally, whether or not the send succeeds.
    pub fn reboot(&mut self) -> Result<(), EngineError> {
        self.require_state("reboot", SessionState::Handshaken)?;
        log::info!("sending end-of-session / reboot");
        let frame = frame::encode(PacketType::EndSession, &[]);
        let result = self.transport_mut().write(&frame, CONTROL_TIMEOUT);
        self.close();
        result?;
        Ok(())
    }

    /// Releases the USB interface. Idempotent once closed; does not send
    /// `END_SESSION` (callers that want a clean device-side teardown should
    /// call [`Session::reboot`] first).
    pub fn disconnect(&mut self) {
        if self.state != SessionState::Closed {
            log::info!("disconnecting session");
        }
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::flasher::{CancelToken, ChunkSize, NoProgress};
    use crate::test_support::MockTransport;

    fn handshaken_session() -> Session<MockTransport> {
        let mut mock = MockTransport::new();
        mock.queue_reply(PacketType::Handshake, &[]);
        let mut session = Session::from_transport(mock);
        session.handshake().unwrap();
        session
    }

    #[test]
    fn handshake_success_transitions_to_handshaken() {
        let session = handshaken_session();
        assert_eq!(session.state(), SessionState::Handshaken);
    }

    #[test]
    fn handshake_mismatch_closes_session_and_blocks_further_ops() {
        let mut mock = MockTransport::new();
        // S4: device replies to HANDSHAKE with a different packet type.
        mock.queue_reply(PacketType::EndSession, &[]);
        let mut session = Session::from_transport(mock);

        let err = session.handshake().unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
        assert_eq!(session.state(), SessionState::Closed);

        let err = session
            .flash_partition(
                "BL",
                b"data",
                ChunkSize::default(),
                &mut NoProgress,
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
    }

    #[test]
    fn operation_illegal_before_handshake_yields_state_error_and_state_unchanged() {
        let mock = MockTransport::new();
        let mut session = Session::from_transport(mock);

        let err = session.get_pit().unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn get_pit_returns_raw_bytes_verbatim() {
        let pit_bytes = b"opaque PIT blob".to_vec();

        let mut mock = MockTransport::new();
        mock.queue_reply(PacketType::Handshake, &[]);
        mock.queue_reply(PacketType::PitFile, &pit_bytes);
        let mut session = Session::from_transport(mock);
        session.handshake().unwrap();

        let pit = session.get_pit().unwrap();
        assert_eq!(pit, pit_bytes);
    }

    #[test]
    fn flash_empty_partition_emits_single_zero_progress() {
        let mut mock = MockTransport::new();
        mock.queue_reply(PacketType::Handshake, &[]);
        mock.queue_reply(PacketType::FlashSetTotalBytes, &0u32.to_le_bytes());
        let mut session = Session::from_transport(mock);
        session.handshake().unwrap();

        let mut updates = Vec::new();
        session
            .flash_partition(
                "BL",
                &[],
                ChunkSize::default(),
                &mut |p: &crate::flasher::Progress| updates.push(p.clone()),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].current_bytes, 0);
        assert_eq!(updates[0].total_bytes, 0);
        assert_eq!(updates[0].percentage, 0.0);
    }

    #[test]
    fn flash_boundary_emits_expected_chunk_count() {
        let total = 3 * 1024 * 1024;
        let data = vec![0xABu8; total];

        let mut mock = MockTransport::new();
        mock.queue_reply(PacketType::Handshake, &[]);
        mock.queue_reply(PacketType::FlashSetTotalBytes, &(total as u32).to_le_bytes());
        for _ in 0..3 {
            mock.queue_reply(PacketType::FlashSendData, &[]);
        }
        let mut session = Session::from_transport(mock);
        session.handshake().unwrap();

        let mut updates = Vec::new();
        session
            .flash_partition(
                "AP",
                &data,
                ChunkSize::default(),
                &mut |p: &crate::flasher::Progress| updates.push(p.clone()),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(updates.len(), 3);
        assert_eq!(updates.last().unwrap().current_bytes, total as u64);
        assert_eq!(updates.last().unwrap().percentage, 100.0);
    }

    #[test]
    fn reboot_transitions_to_closed() {
        let mut mock = MockTransport::new();
        mock.queue_reply(PacketType::Handshake, &[]);
        let mut session = Session::from_transport(mock);
        session.handshake().unwrap();

        session.reboot().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mock = MockTransport::new();
        let mut session = Session::from_transport(mock);
        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), SessionState::Closed);
    }
}

