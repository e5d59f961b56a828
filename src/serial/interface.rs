use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

use super::cancel::CancelToken;
use super::port::{NativePort, SerialPortIO};
use super::{Result, SerialError, STATUS_COMMAND};

pub const DEFAULT_RESPONSE_LEN: usize = 40;
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LINE_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Read behaviour used by [`SerialInterface::send_command`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub expected_response_len: usize,
    pub response_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            expected_response_len: DEFAULT_RESPONSE_LEN,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Half-duplex command/response transport to a single device
pub struct SerialInterface {
    port: Option<Box<dyn SerialPortIO>>,
    port_name: Option<String>,
    options: TransportOptions,
    cancel: CancelToken,
}

impl SerialInterface {
    pub fn new() -> Self {
        Self::with_options(TransportOptions::default())
    }

    pub fn with_options(options: TransportOptions) -> Self {
        Self {
            port: None,
            port_name: None,
            options,
            cancel: CancelToken::never(),
        }
    }

    /// Wrap an already open byte stream (simulator, test double)
    pub fn from_io(io: Box<dyn SerialPortIO>) -> Self {
        let mut interface = Self::new();
        interface.attach(io, "<attached>");
        interface
    }

    /// Open `port_name` at `baud_rate`, 8N1, with a symmetric read/write timeout
    pub fn open(&mut self, port_name: &str, baud_rate: u32, timeout: Duration) -> Result<()> {
        if self.is_connected() {
            log::warn!("Port already open, closing before reopening on {}", port_name);
            self.close();
        }

        let port = NativePort::open(port_name, baud_rate, timeout).map_err(|e| {
            log::error!("Failed to open {}: {}", port_name, e);
            e
        })?;

        self.attach(Box::new(port), port_name);
        log::info!("Opened {} at {} baud", port_name, baud_rate);
        Ok(())
    }

    /// Take ownership of an open byte stream
    pub fn attach(&mut self, io: Box<dyn SerialPortIO>, name: &str) {
        self.port = Some(io);
        self.port_name = Some(name.to_string());
    }

    /// Release the port; closing a closed interface is a no-op
    pub fn close(&mut self) {
        if let Some(name) = self.port_name.take() {
            log::info!("Closing {}", name);
        }
        self.port = None;
    }

    pub fn state(&self) -> ConnectionState {
        if self.port.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: TransportOptions) {
        self.options = options;
    }

    /// Token observed by every subsequent read
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    /// Swap in `token`, handing back the one it replaces
    pub fn replace_cancel_token(&mut self, token: CancelToken) -> CancelToken {
        std::mem::replace(&mut self.cancel, token)
    }

    /// Write raw bytes and flush
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;

        log::trace!("TX {}", hex::encode_upper(data));
        let written = port.send_data(data).await?;
        port.flush().await?;

        if written != data.len() {
            return Err(SerialError::WriteIncomplete {
                written,
                expected: data.len(),
            });
        }

        Ok(written)
    }

    /// Poll for up to `expected_bytes` until `timeout` elapses.
    ///
    /// Returns whatever arrived, which may be shorter than `expected_bytes`.
    /// Fails with [`SerialError::Timeout`] if nothing arrived at all and with
    /// [`SerialError::Cancelled`] if the cancel token fires.
    pub async fn read_response(&mut self, expected_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        let poll_interval = self.options.poll_interval;
        let cancel = self.cancel.clone();
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;

        let deadline = Instant::now() + timeout;
        let mut buffer = Vec::with_capacity(expected_bytes);

        while buffer.len() < expected_bytes {
            if cancel.is_cancelled() {
                return Err(SerialError::Cancelled);
            }

            let available = port.bytes_to_read()?;
            if available > 0 {
                let mut chunk = vec![0u8; available.min(expected_bytes - buffer.len())];
                let n = port.read_data(&mut chunk).await?;
                buffer.extend_from_slice(&chunk[..n]);
                if n > 0 {
                    continue;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            tokio::select! {
                _ = sleep(poll_interval.min(deadline - now)) => {}
                _ = cancel.cancelled() => return Err(SerialError::Cancelled),
            }
        }

        if buffer.is_empty() {
            log::debug!("No response within {:?}", timeout);
            return Err(SerialError::Timeout);
        }
        if buffer.len() < expected_bytes {
            log::warn!(
                "Partial response: {} of {} bytes within {:?}",
                buffer.len(),
                expected_bytes,
                timeout
            );
        }

        log::trace!("RX {}", hex::encode_upper(&buffer));
        Ok(buffer)
    }

    /// Send `code` followed by `payload`.
    ///
    /// When `wait_for_response` is set, reads back using the configured
    /// expected length and response timeout; otherwise returns `Ok(None)`.
    pub async fn send_command(
        &mut self,
        code: u8,
        payload: &[u8],
        wait_for_response: bool,
    ) -> Result<Option<Vec<u8>>> {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(code);
        frame.extend_from_slice(payload);

        self.send_raw(&frame).await?;

        if !wait_for_response {
            return Ok(None);
        }

        let TransportOptions {
            expected_response_len,
            response_timeout,
            ..
        } = self.options;
        self.read_response(expected_response_len, response_timeout)
            .await
            .map(Some)
    }

    /// Send a bare command code and wait for its response
    pub async fn query(&mut self, code: u8) -> Result<Vec<u8>> {
        self.send_command(code, &[], true)
            .await?
            .ok_or(SerialError::Timeout)
    }

    /// True iff the device answers the status command with at least one byte
    pub async fn check_device_status(&mut self) -> bool {
        match self.query(STATUS_COMMAND).await {
            Ok(response) => !response.is_empty(),
            Err(e) => {
                log::debug!("Status check failed: {}", e);
                false
            }
        }
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new()
    }
}
