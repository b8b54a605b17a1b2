use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::config::SerialConfig;
use crate::drivers::{EngineError, Transport};

const READ_CHUNK: usize = 256;
/// Longest run of bytes kept while waiting for `\n`.
const MAX_PENDING: usize = 4096;

/// Potentiostat on a serial port, 8N1, `\n`-terminated lines.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    pending: Vec<u8>,
    flush_window: Duration,
}

impl SerialTransport {
    /// Open the configured port and wait for the board to settle.
    pub fn open(config: &SerialConfig) -> Result<Self, EngineError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()?;
        log::info!("opened {} at {} baud", config.port, config.baud_rate);
        thread::sleep(Duration::from_millis(config.settle_ms));
        let mut transport = Self::from_port(port, Duration::from_millis(config.flush_window_ms));
        transport.clear_input()?;
        Ok(transport)
    }

    /// Wrap a port opened elsewhere.
    pub fn from_port(port: Box<dyn SerialPort>, flush_window: Duration) -> Self {
        let name = port.name().unwrap_or_else(|| "serial".to_owned());
        Self {
            port,
            name,
            pending: Vec::new(),
            flush_window,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&raw).trim_end_matches(['\r', '\n']).to_owned())
    }
}

impl Transport for SerialTransport {
    fn write_command(&mut self, command: &str) -> Result<(), EngineError> {
        self.port.write_all(command.as_bytes())?;
        self.port.flush()?;
        log::debug!("{} <- {command}", self.name);
        Ok(())
    }

    /// Returns within one port timeout even if bytes keep arriving without
    /// a terminator.
    fn read_line(&mut self) -> Result<Option<String>, EngineError> {
        let deadline = Instant::now().checked_add(self.port.timeout());
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if self.pending.len() >= MAX_PENDING {
                // 丢弃无换行的垃圾数据, 交给解码器记为一次失败
                log::warn!("{}: {} bytes without a line end", self.name, self.pending.len());
                let raw = std::mem::take(&mut self.pending);
                return Ok(Some(String::from_utf8_lossy(&raw).into_owned()));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
            match self.port.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    return Ok(None)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), EngineError> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }

    /// Reset the OS buffer, then drain whatever the board still emits for
    /// up to the flush window.
    fn clear_input(&mut self) -> Result<(), EngineError> {
        self.port.clear(ClearBuffer::Input)?;
        self.pending.clear();
        let deadline = Instant::now() + self.flush_window;
        let mut drained = 0usize;
        while Instant::now() < deadline {
            match self.port.bytes_to_read() {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    log::warn!("{}: cannot query input buffer: {e}", self.name);
                    break;
                }
            }
            match self.read_line() {
                Ok(Some(_)) => drained += 1,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("{}: error while flushing input: {e}", self.name);
                    break;
                }
            }
        }
        self.pending.clear();
        if drained > 0 {
            log::debug!("{}: discarded {drained} stale lines", self.name);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
