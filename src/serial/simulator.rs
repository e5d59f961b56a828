//! Scripted stand-in for a switch on the bench
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::port::SerialPortIO;
use super::{Result, SerialError, STATUS_COMMAND};
use crate::config::packet::{ConfigPacket, PACKET_SIZE};

/// Success byte at the head of every healthy reply
const ACK: u8 = 0x01;

/// Frames written to a [`SimulatedDevice`], readable after the device is boxed
#[derive(Debug, Clone, Default)]
pub struct WriteLog {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl WriteLog {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Command codes in the order they were received (configuration packets excluded)
    pub fn command_codes(&self) -> Vec<u8> {
        self.frames()
            .into_iter()
            .filter(|frame| frame.len() != PACKET_SIZE || !ConfigPacket::validate(frame))
            .filter_map(|frame| frame.first().copied())
            .collect()
    }

    /// Configuration packets received so far
    pub fn config_packets(&self) -> Vec<ConfigPacket> {
        self.frames()
            .iter()
            .filter_map(|frame| ConfigPacket::from_bytes(frame).ok())
            .collect()
    }

    fn push(&self, frame: Vec<u8>) {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).push(frame);
    }
}

/// Answers status and test commands from a reply table.
///
/// Codes without an entry get no reply at all. A valid configuration packet
/// is accepted silently, as the real firmware does.
pub struct SimulatedDevice {
    replies: HashMap<u8, Vec<u8>>,
    pending: VecDeque<u8>,
    frame_len: Option<usize>,
    fail_writes: bool,
    written: WriteLog,
}

impl SimulatedDevice {
    /// A device with no replies configured
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            pending: VecDeque::new(),
            frame_len: None,
            fail_writes: false,
            written: WriteLog::default(),
        }
    }

    /// Passes every catalog test; metering reads 100 and replies are padded to full frames
    pub fn healthy() -> Self {
        let mut device = Self::new().padded_to(PACKET_SIZE);
        device.replies.insert(STATUS_COMMAND, vec![ACK]);
        for code in 0x10..=0x17u8 {
            device.replies.insert(code, vec![ACK]);
        }
        device.with_reply(0x15, vec![ACK, 0x00, 0x64])
    }

    pub fn with_reply(mut self, code: u8, reply: Vec<u8>) -> Self {
        self.replies.insert(code, reply);
        self
    }

    /// Never answer `code`
    pub fn silent(mut self, code: u8) -> Self {
        self.replies.remove(&code);
        self
    }

    /// Zero-pad every reply to `len` bytes
    pub fn padded_to(mut self, len: usize) -> Self {
        self.frame_len = Some(len);
        self
    }

    /// Send the replies exactly as configured
    pub fn unpadded(mut self) -> Self {
        self.frame_len = None;
        self
    }

    /// Make every write fail with an IO error
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Shared view of the frames written to this device
    pub fn written(&self) -> WriteLog {
        self.written.clone()
    }

    fn respond_to(&mut self, frame: &[u8]) {
        if frame.len() == PACKET_SIZE && ConfigPacket::validate(frame) {
            log::debug!("Simulator accepted configuration packet");
            return;
        }

        let Some(&code) = frame.first() else {
            return;
        };

        match self.replies.get(&code) {
            Some(reply) => {
                let mut reply = reply.clone();
                if let Some(len) = self.frame_len {
                    if reply.len() < len {
                        reply.resize(len, 0x00);
                    }
                }
                log::trace!("Simulator reply to 0x{:02X}: {}", code, hex::encode_upper(&reply));
                self.pending.extend(reply);
            }
            None => log::trace!("Simulator ignoring 0x{:02X}", code),
        }
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SerialPortIO for SimulatedDevice {
    async fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        if self.fail_writes {
            return Err(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated write failure",
            )));
        }

        self.written.push(data.to_vec());
        self.respond_to(data);
        Ok(data.len())
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        Ok(self.pending.len())
    }

    async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
