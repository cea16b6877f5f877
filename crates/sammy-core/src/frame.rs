//! The small fixed frame header used by every control packet:
//! `{packet_type: u32 LE, payload_length: u32 LE, payload}`.

use std::time::Duration;

use crate::error::{EngineError, ProtocolError};
use crate::transport::UsbTransport;

/// Defends against a corrupted or misbehaving device claiming an absurd
/// payload length.
pub const MAX_PAYLOAD_LEN: u32 = 8 * 1024 * 1024;

/// The packet types of the wire protocol. The numeric codes are part of the
/// wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketType {
    Handshake = 0,
    FlashSetTotalBytes = 1,
    FlashSendData = 2,
    DumpPartPit = 3,
    DumpPartNand = 4,
    EndSession = 5,
    DeviceType = 6,
    PitFile = 7,
    DumpPartSboot = 8,
}

impl PacketType {
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Emits `type_u32_le || length_u32_le || payload`.
pub fn encode(packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&packet_type.code().to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Reads exactly eight header bytes, parses the two little-endian words,
/// then reads exactly `length` payload bytes. Returns the raw packet type
/// code and payload; the caller matches the code against the request it
/// sent.
///
/// A failure to read either the header or the payload is a
/// [`EngineError::Transport`], per the wire contract that
/// [`UsbTransport::read`] either returns exactly the requested byte count or
/// an error — it is never a [`ProtocolError`], which is reserved for frames
/// the device read successfully but that violate the protocol itself (an
/// oversized declared length, or a reply of the wrong packet type).
pub fn decode(
    transport: &mut dyn UsbTransport,
    timeout: Duration,
) -> Result<(u32, Vec<u8>), EngineError> {
    let header = transport.read(8, timeout)?;

    let packet_type = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    if length > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::OversizedLength(length, MAX_PAYLOAD_LEN).into());
    }

    let payload = if length == 0 {
        Vec::new()
    } else {
        transport.read(length as usize, timeout)?
    };

    Ok((packet_type, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTransport;

    #[test]
    fn round_trip_frame() {
        let payload = b"hello world".to_vec();
        let encoded = encode(PacketType::DeviceType, &payload);

        let mut mock = MockTransport::new();
        mock.to_read.extend(encoded);

        let (ty, decoded_payload) = decode(&mut mock, Duration::from_secs(1)).unwrap();
        assert_eq!(ty, PacketType::DeviceType.code());
        assert_eq!(decoded_payload, payload);
    }

    #[test]
    fn round_trip_empty_payload() {
        let encoded = encode(PacketType::Handshake, &[]);
        let mut mock = MockTransport::new();
        mock.to_read.extend(encoded);

        let (ty, payload) = decode(&mut mock, Duration::from_secs(1)).unwrap();
        assert_eq!(ty, PacketType::Handshake.code());
        assert!(payload.is_empty());
    }

    #[test]
    fn sequential_frames_decode_in_order() {
        let mut mock = MockTransport::new();
        mock.queue_reply(PacketType::Handshake, &[]);
        mock.queue_reply(PacketType::FlashSetTotalBytes, &42u32.to_le_bytes());
        mock.queue_reply(PacketType::FlashSendData, b"chunk");

        let (t1, p1) = decode(&mut mock, Duration::from_secs(1)).unwrap();
        let (t2, p2) = decode(&mut mock, Duration::from_secs(1)).unwrap();
        let (t3, p3) = decode(&mut mock, Duration::from_secs(1)).unwrap();

        assert_eq!(t1, PacketType::Handshake.code());
        assert!(p1.is_empty());
        assert_eq!(t2, PacketType::FlashSetTotalBytes.code());
        assert_eq!(p2, 42u32.to_le_bytes());
        assert_eq!(t3, PacketType::FlashSendData.code());
        assert_eq!(p3, b"chunk");
    }

    #[test]
    fn oversized_length_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&PacketType::PitFile.code().to_le_bytes());
        frame.extend_from_slice(&(MAX_PAYLOAD_LEN + 1).to_le_bytes());

        let mut mock = MockTransport::new();
        mock.to_read.extend(frame);

        let err = decode(&mut mock, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Protocol(ProtocolError::OversizedLength(_, _))
        ));
    }

    #[test]
    fn transport_failure_surfaces_as_transport_error_not_protocol_error() {
        let mut mock = MockTransport::new();
        mock.fail_next_read = true;

        let err = decode(&mut mock, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
    }
}
