//! In-memory [`UsbTransport`] used by unit tests across the crate: no real
//! hardware, just pre-queued reply bytes and a record of what was written.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::TransportError;
use crate::frame::{PacketType, encode};
use crate::transport::UsbTransport;

pub struct MockTransport {
    pub written: Vec<Vec<u8>>,
    pub to_read: VecDeque<u8>,
    pub fail_next_read: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            written: Vec::new(),
            to_read: VecDeque::new(),
            fail_next_read: false,
        }
    }

    pub fn queue_reply(&mut self, packet_type: PacketType, payload: &[u8]) {
        self.to_read.extend(encode(packet_type, payload));
    }
}

impl UsbTransport for MockTransport {
    fn write(&mut self, bytes: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
        self.written.push(bytes.to_vec());
        Ok(bytes.len())
    }

    fn read(&mut self, len: usize, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if self.fail_next_read {
            self.fail_next_read = false;
            return Err(TransportError::Timeout(Duration::from_secs(0)));
        }
        if self.to_read.len() < len {
            return Err(TransportError::ShortRead {
                expected: len,
                got: self.to_read.len(),
            });
        }
        Ok((0..len).map(|_| self.to_read.pop_front().unwrap()).collect())
    }
}
