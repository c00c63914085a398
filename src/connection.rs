use crate::error::Result;
use log::info;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// How long a single serial read waits before reporting "no data yet". The
/// real per-line deadline is enforced by the AT channel on top of this.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A byte stream to the phone.
///
/// `receive` reports `ErrorKind::TimedOut` or `ErrorKind::WouldBlock` when no
/// byte arrived during its poll interval, and `Ok(0)` when the link is gone.
pub trait AtConnection: Send {
    fn connect(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn send(&mut self, data: &[u8]) -> io::Result<()>;
    fn receive(&mut self, buffer: &mut [u8]) -> io::Result<usize>;
    fn is_connected(&self) -> bool;
}

pub struct SerialAtConnection {
    port: String,
    baudrate: u32,
    stream: Option<Box<dyn SerialPort>>,
}

impl SerialAtConnection {
    pub fn new(port: String, baudrate: u32) -> Self {
        Self {
            port,
            baudrate,
            stream: None,
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "serial port is not open")
}

impl AtConnection for SerialAtConnection {
    fn connect(&mut self) -> Result<()> {
        info!("Opening serial port {} at {}", self.port, self.baudrate);
        let port = serialport::new(&self.port, self.baudrate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(io::Error::from)?;
        self.stream = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stream = None;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.write_all(data)?;
        stream.flush()
    }

    fn receive(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.read(buffer)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays canned phone output and records everything written to it.
    pub struct ScriptedConnection {
        input: VecDeque<u8>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl ScriptedConnection {
        pub fn new(input: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let written = Arc::new(Mutex::new(Vec::new()));
            let connection = Self {
                input: input.iter().copied().collect(),
                written: written.clone(),
            };
            (connection, written)
        }
    }

    impl AtConnection for ScriptedConnection {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn send(&mut self, data: &[u8]) -> io::Result<()> {
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        fn receive(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
            let n = buffer.len().min(self.input.len());
            for slot in buffer.iter_mut().take(n) {
                *slot = self.input.pop_front().unwrap();
            }
            Ok(n)
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    /// Phone output for one command: the echoed command line followed by
    /// the answer lines, each CRLF terminated.
    pub fn exchange(command: &str, answer: &[&str]) -> Vec<u8> {
        let mut bytes = format!("{command}\r\n").into_bytes();
        for line in answer {
            bytes.extend_from_slice(line.as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        bytes
    }

    pub fn written_commands(written: &Arc<Mutex<Vec<u8>>>) -> Vec<String> {
        String::from_utf8_lossy(&written.lock().unwrap())
            .split('\r')
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}
