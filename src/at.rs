use crate::charset::decode_windows_1252;
use crate::connection::AtConnection;
use crate::error::{Error, Result};
use log::debug;
use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

/// Answer line buffer size suitable for short status answers.
pub const SHORT_ANSWER_LENGTH: usize = 256;

/// Answer line buffer size for answers carrying hexadecimal payloads.
pub const LONG_ANSWER_LENGTH: usize = 4096;

/// Command/answer exchange with the phone over an exclusively owned link.
///
/// Commands are terminated by a single CR and their echo is discarded.
/// Answers are CRLF terminated lines, read one byte at a time.
pub struct AtChannel {
    connection: Box<dyn AtConnection>,
    buffer: VecDeque<u8>,
    read_timeout: Option<Duration>,
    /// A command was sent and its final result line has not been read yet.
    answer_pending: bool,
}

/// Whether `line` ends the answer to a command.
fn is_final_result(line: &str) -> bool {
    line == "OK" || line.starts_with("+CMS ERROR") || line.starts_with("+CME ERROR")
}

impl AtChannel {
    /// `read_timeout` bounds how long one answer line may take to complete;
    /// `None` waits forever.
    pub fn new(connection: Box<dyn AtConnection>, read_timeout: Option<Duration>) -> Self {
        Self {
            connection,
            buffer: VecDeque::new(),
            read_timeout,
            answer_pending: false,
        }
    }

    pub fn close(&mut self) -> Result<()> {
        self.connection.close()
    }

    fn read_byte(&mut self, started: Instant) -> Result<u8> {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(byte) = self.buffer.pop_front() {
                return Ok(byte);
            }
            if let Some(limit) = self.read_timeout {
                if started.elapsed() >= limit {
                    return Err(Error::Timeout(limit));
                }
            }
            match self.connection.receive(&mut chunk) {
                Ok(0) => return Err(Error::Closed),
                Ok(n) => self.buffer.extend(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Send `command` followed by CR, then swallow the echo up to the first LF.
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        debug!("Sending command: {}", command);
        self.connection.send(command.as_bytes())?;
        self.connection.send(b"\r")?;

        self.answer_pending = false;
        let started = Instant::now();
        while self.read_byte(started)? != b'\n' {}
        self.answer_pending = true;
        Ok(())
    }

    /// Read one CRLF terminated answer line.
    ///
    /// At most `max_length - 1` bytes (terminator included) are read; a line
    /// that does not complete within them yields `BufferTooSmall`. A line that
    /// is exactly `ERROR` yields `RemoteError`. Empty lines are returned as is.
    pub fn receive_answer_line(&mut self, max_length: usize) -> Result<String> {
        let result = self.read_answer_line(max_length);
        match &result {
            Ok(line) if is_final_result(line) => self.answer_pending = false,
            Err(Error::RemoteError { .. }) => self.answer_pending = false,
            // Nothing more can be expected from a silent or broken link.
            Err(Error::Timeout(_) | Error::Closed | Error::Io(_)) => self.answer_pending = false,
            _ => {}
        }
        result
    }

    fn read_answer_line(&mut self, max_length: usize) -> Result<String> {
        if max_length <= 2 {
            return Err(Error::BufferTooSmall { max_length });
        }

        let started = Instant::now();
        let mut line: Vec<u8> = Vec::with_capacity(max_length.min(LONG_ANSWER_LENGTH));
        for _ in 0..max_length - 1 {
            let byte = self.read_byte(started)?;
            if byte == b'\n' && line.last() == Some(&b'\r') {
                line.pop();
                let answer = decode_windows_1252(&line);
                debug!("Received: {}", answer);
                if answer == "ERROR" {
                    return Err(Error::RemoteError {
                        command: String::new(),
                    });
                }
                return Ok(answer);
            }
            line.push(byte);
        }
        Err(Error::BufferTooSmall { max_length })
    }

    /// Whether the answer to the last command has not been read to its end.
    pub fn is_answer_pending(&self) -> bool {
        self.answer_pending
    }

    /// Discard what is left of an answer abandoned halfway, up to and
    /// including its final result line.
    pub fn drain_answer(&mut self) -> Result<()> {
        while self.answer_pending {
            match self.receive_answer_line(LONG_ANSWER_LENGTH) {
                Ok(line) if !line.is_empty() => debug!("Discarding leftover answer: {}", line),
                Ok(_) | Err(Error::RemoteError { .. }) | Err(Error::BufferTooSmall { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Same as `receive_answer_line`, naming `command` in a remote error.
    pub fn receive_answer_to(&mut self, command: &str, max_length: usize) -> Result<String> {
        self.receive_answer_line(max_length)
            .map_err(|e| match e {
                Error::RemoteError { .. } => Error::RemoteError {
                    command: command.to_string(),
                },
                other => other,
            })
    }

    /// Expect the next answer line to be `OK`.
    pub fn expect_ok(&mut self, command: &str) -> Result<()> {
        let answer = self.receive_answer_to(command, SHORT_ANSWER_LENGTH)?;
        if answer != "OK" {
            return Err(Error::format(format!(
                "expected \"OK\" after \"{command}\", got \"{answer}\""
            )));
        }
        Ok(())
    }

    /// Send a command that only answers `OK`.
    pub fn execute(&mut self, command: &str) -> Result<()> {
        self.send_command(command)?;
        self.expect_ok(command)
    }

    /// Collect every non-empty answer line until `OK`.
    pub fn receive_records(&mut self, command: &str, max_length: usize) -> Result<Vec<String>> {
        let mut records = Vec::new();
        loop {
            let line = self.receive_answer_to(command, max_length)?;
            if line == "OK" {
                return Ok(records);
            }
            if !line.is_empty() {
                records.push(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::scripted::{exchange, written_commands, ScriptedConnection};

    fn channel(input: &[u8]) -> AtChannel {
        let (connection, _) = ScriptedConnection::new(input);
        AtChannel::new(Box::new(connection), None)
    }

    #[test]
    fn receives_ok_line() {
        let mut at = channel(b"OK\r\n");
        assert_eq!(at.receive_answer_line(10).unwrap(), "OK");
    }

    #[test]
    fn error_line_is_remote_error() {
        let mut at = channel(b"ERROR\r\n");
        assert!(matches!(
            at.receive_answer_line(10),
            Err(Error::RemoteError { .. })
        ));
    }

    #[test]
    fn line_longer_than_buffer() {
        let mut at = channel(b"+EFSL: 0123456789\r\n");
        assert!(matches!(
            at.receive_answer_line(10),
            Err(Error::BufferTooSmall { max_length: 10 })
        ));
    }

    #[test]
    fn tiny_buffer_rejected() {
        let mut at = channel(b"K\r\n");
        assert!(matches!(
            at.receive_answer_line(2),
            Err(Error::BufferTooSmall { max_length: 2 })
        ));
    }

    #[test]
    fn empty_lines_are_kept() {
        let mut at = channel(b"\r\nOK\r\n");
        assert_eq!(at.receive_answer_line(10).unwrap(), "");
        assert_eq!(at.receive_answer_line(10).unwrap(), "OK");
    }

    #[test]
    fn lone_line_feed_is_data() {
        let mut at = channel(b"a\nb\r\n");
        assert_eq!(at.receive_answer_line(10).unwrap(), "a\nb");
    }

    #[test]
    fn send_command_discards_echo() {
        let (connection, written) =
            ScriptedConnection::new(&exchange("AT+CPBS=\"ME\"", &["OK"]));
        let mut at = AtChannel::new(Box::new(connection), None);
        at.execute("AT+CPBS=\"ME\"").unwrap();
        assert_eq!(written.lock().unwrap().as_slice(), b"AT+CPBS=\"ME\"\r");
        assert_eq!(written_commands(&written), vec!["AT+CPBS=\"ME\""]);
    }

    #[test]
    fn records_until_ok() {
        let mut at = channel(&exchange("AT+X", &["+X: 1", "", "+X: 2", "OK"]));
        at.send_command("AT+X").unwrap();
        assert_eq!(
            at.receive_records("AT+X", 64).unwrap(),
            vec!["+X: 1".to_string(), "+X: 2".to_string()]
        );
    }

    #[test]
    fn remote_error_names_command() {
        let mut at = channel(&exchange("AT+Y", &["ERROR"]));
        match at.execute("AT+Y") {
            Err(Error::RemoteError { command }) => assert_eq!(command, "AT+Y"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn closed_link_is_reported() {
        let mut at = channel(b"OK");
        assert!(matches!(at.receive_answer_line(10), Err(Error::Closed)));
    }

    #[test]
    fn drains_an_abandoned_answer() {
        let mut script = exchange("AT+X", &["+X: 1", "+X: 2", "", "OK"]);
        script.extend(exchange("AT+Y", &["OK"]));
        let mut at = channel(&script);
        at.send_command("AT+X").unwrap();
        assert_eq!(at.receive_answer_line(64).unwrap(), "+X: 1");
        assert!(at.is_answer_pending());

        at.drain_answer().unwrap();
        assert!(!at.is_answer_pending());
        at.execute("AT+Y").unwrap();
    }

    #[test]
    fn final_result_lines_end_the_answer() {
        let mut script = exchange("AT+EMGR=4", &["+CMS ERROR: 321"]);
        script.extend(exchange("AT+Z", &["ERROR"]));
        let mut at = channel(&script);
        at.send_command("AT+EMGR=4").unwrap();
        assert_eq!(at.receive_answer_line(64).unwrap(), "+CMS ERROR: 321");
        assert!(!at.is_answer_pending());

        assert!(at.execute("AT+Z").is_err());
        assert!(!at.is_answer_pending());
        at.drain_answer().unwrap();
    }

    struct SilentConnection;

    impl AtConnection for SilentConnection {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn send(&mut self, _data: &[u8]) -> io::Result<()> {
            Ok(())
        }
        fn receive(&mut self, _buffer: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(5));
            Err(io::Error::from(io::ErrorKind::TimedOut))
        }
        fn is_connected(&self) -> bool {
            true
        }
    }

    #[test]
    fn silent_phone_times_out() {
        let limit = Duration::from_millis(30);
        let mut at = AtChannel::new(Box::new(SilentConnection), Some(limit));
        assert!(matches!(at.receive_answer_line(10), Err(Error::Timeout(d)) if d == limit));
    }
}
