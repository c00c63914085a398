//! Phone file system access through the vendor file manager AT commands.
//!
//! Every exchange is bracketed by `AT+ESUO=3` / `AT+ESUO=4`. The phone AT
//! interface stays stuck until reboot if the second command is not sent, so
//! the bracket is held by [`FileManagerSession`] which disables the file
//! manager on every exit path.

use crate::at::{AtChannel, SHORT_ANSWER_LENGTH};
use crate::charset::{self, Charset};
use crate::error::{Error, Result};
use crate::hex_codec::{bytes_to_hex, hex_to_bytes};
use crate::local_fs::{create_directory, sanitize_file_name};
use crate::models::{FileAttributes, FileEntry};
use log::{debug, info, warn};
use regex::Regex;
use std::fs::File;
use std::io::{Read, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::OnceLock;

const ENABLE_COMMAND: &str = "AT+ESUO=3";
const DISABLE_COMMAND: &str = "AT+ESUO=4";

/// Largest UTF-16 encoded path the phone accepts.
const MAXIMUM_PATH_SIZE: usize = 512;

/// Room for one `+EFSR:` chunk record.
const READ_ANSWER_LENGTH: usize = 8192;

/// Room for one listing record: a 255 character name is 1020 hex digits.
const LIST_ANSWER_LENGTH: usize = 1200;

static RE_LIST_RECORD: OnceLock<Regex> = OnceLock::new();
static RE_WRITE_CAPACITY: OnceLock<Regex> = OnceLock::new();

/// Holds the phone file manager enabled for as long as it lives.
pub struct FileManagerSession<'a> {
    at: &'a mut AtChannel,
    active: bool,
}

impl<'a> FileManagerSession<'a> {
    pub fn open(at: &'a mut AtChannel) -> Result<Self> {
        at.execute(ENABLE_COMMAND)?;
        Ok(Self { at, active: true })
    }

    /// Disable the file manager, reporting a failure to do so.
    pub fn close(mut self) -> Result<()> {
        self.active = false;
        disable(&mut *self.at)
    }
}

impl Deref for FileManagerSession<'_> {
    type Target = AtChannel;

    fn deref(&self) -> &AtChannel {
        &*self.at
    }
}

impl DerefMut for FileManagerSession<'_> {
    fn deref_mut(&mut self) -> &mut AtChannel {
        &mut *self.at
    }
}

impl Drop for FileManagerSession<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = disable(&mut *self.at) {
                warn!("Failed to disable the file manager: {}", e);
            }
        }
    }
}

/// Send the disable command and wait for its `OK`, first skipping whatever
/// an interrupted operation left in the answer stream.
fn disable(at: &mut AtChannel) -> Result<()> {
    if let Err(e) = at.drain_answer() {
        warn!("Could not skip the rest of an interrupted answer: {}", e);
    }
    at.send_command(DISABLE_COMMAND)?;
    loop {
        let line = at.receive_answer_to(DISABLE_COMMAND, READ_ANSWER_LENGTH)?;
        if line == "OK" {
            return Ok(());
        }
        if !line.is_empty() {
            debug!("Discarding leftover answer: {}", line);
        }
    }
}

/// Hexadecimal UTF-16BE form of a path, as embedded in file manager commands.
pub fn encode_path(path: &str) -> Result<String> {
    let encoded = charset::convert(
        path.as_bytes(),
        Charset::Utf8,
        Charset::Utf16BigEndian,
        MAXIMUM_PATH_SIZE,
    )?;
    Ok(bytes_to_hex(&encoded))
}

fn decode_name(hex: &str) -> Result<String> {
    let bytes = hex_to_bytes(hex, LIST_ANSWER_LENGTH)?;
    charset::decode_utf16_be(&bytes)
}

/// Join a phone directory and an entry name with the phone `\` separator.
pub fn join_phone_path(directory: &str, name: &str) -> String {
    if directory.ends_with('\\') {
        format!("{directory}{name}")
    } else {
        format!("{directory}\\{name}")
    }
}

/// Parse a `+EFSL:`/`+EFSD:` record: `"<hex name>", <size>, <flags>`.
pub fn parse_list_record(line: &str) -> Result<FileEntry> {
    let re = RE_LIST_RECORD.get_or_init(|| {
        Regex::new(r#"^\+EFS[LD]: "([0-9A-Fa-f]*)",\s*(\d+),\s*(0[xX][0-9A-Fa-f]+|\d+)"#).unwrap()
    });
    let caps = re
        .captures(line)
        .ok_or_else(|| Error::format(format!("malformed file list record \"{line}\"")))?;

    let name = decode_name(&caps[1])?;
    if name.len() > 255 {
        return Err(Error::format(format!("file name too long in \"{line}\"")));
    }
    let size = caps[2]
        .parse::<u32>()
        .map_err(|e| Error::format(format!("bad file size in \"{line}\": {e}")))?;
    let flags_text = &caps[3];
    let flags = match flags_text
        .strip_prefix("0x")
        .or_else(|| flags_text.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => flags_text.parse::<u8>(),
    }
    .map_err(|e| Error::format(format!("bad file flags in \"{line}\": {e}")))?;

    Ok(FileEntry {
        name,
        size,
        flags: FileAttributes::from_bits_retain(flags),
    })
}

fn collect_entries(records: Vec<String>, prefix: &str) -> Result<Vec<FileEntry>> {
    records
        .iter()
        .filter(|line| line.starts_with(prefix))
        .map(|line| parse_list_record(line))
        .collect()
}

pub fn list_drives(at: &mut AtChannel) -> Result<Vec<FileEntry>> {
    let mut session = FileManagerSession::open(at)?;
    let command = "AT+EFSD?";
    session.send_command(command)?;
    let records = session.receive_records(command, LIST_ANSWER_LENGTH)?;
    let drives = collect_entries(records, "+EFSD: ")?;
    session.close()?;
    Ok(drives)
}

/// List a directory content (not recursive).
pub fn list_directory(at: &mut AtChannel, path: &str) -> Result<Vec<FileEntry>> {
    let command = format!("AT+EFSL=\"{}\"", encode_path(path)?);
    let mut session = FileManagerSession::open(at)?;
    session.send_command(&command)?;
    let records = match session.receive_records(&command, LIST_ANSWER_LENGTH) {
        Ok(records) => records,
        Err(Error::RemoteError { .. }) => return Err(Error::NotFound(path.to_string())),
        Err(e) => return Err(e),
    };
    let entries = collect_entries(records, "+EFSL: ")?;
    session.close()?;
    Ok(entries)
}

/// One `+EFSR:` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub is_last: bool,
    pub total_size: u32,
    pub payload: Vec<u8>,
}

/// Parse `+EFSR: <is_last>, <total_size>, <payload_len>, "<hex>"`.
///
/// The three numeric fields are scanned to find where the quoted payload
/// starts, so the payload itself is never copied before decoding.
pub fn parse_chunk_record(line: &str) -> Result<FileChunk> {
    let malformed = || Error::format(format!("malformed file chunk record \"{line}\""));
    let fields = line.strip_prefix("+EFSR:").ok_or_else(malformed)?;

    let mut numbers = [0u32; 3];
    let mut offset = 0;
    for number in numbers.iter_mut() {
        let comma = fields[offset..].find(',').ok_or_else(malformed)?;
        *number = fields[offset..offset + comma]
            .trim()
            .parse()
            .map_err(|_| malformed())?;
        offset += comma + 1;
    }
    let [is_last, total_size, payload_len] = numbers;
    if is_last > 1 {
        return Err(malformed());
    }

    let quoted = fields[offset..].trim();
    let hex = quoted
        .strip_prefix('"')
        .and_then(|q| q.strip_suffix('"'))
        .ok_or_else(malformed)?;
    let payload = hex_to_bytes(hex, READ_ANSWER_LENGTH)?;
    if payload.len() != payload_len as usize {
        return Err(Error::format(format!(
            "file chunk announces {} bytes but carries {}",
            payload_len,
            payload.len()
        )));
    }

    Ok(FileChunk {
        is_last: is_last == 1,
        total_size,
        payload,
    })
}

/// Checks that a sequence of chunks describes exactly one whole file.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    total_size: Option<u32>,
    received: u64,
    complete: bool,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the next chunk; returns the payload to append.
    pub fn accept<'c>(&mut self, chunk: &'c FileChunk) -> Result<&'c [u8]> {
        if self.complete {
            return Err(Error::format("file chunk received after the last one"));
        }
        let total = *self.total_size.get_or_insert(chunk.total_size);
        if total != chunk.total_size {
            return Err(Error::format(format!(
                "file size changed from {} to {} between chunks",
                total, chunk.total_size
            )));
        }
        self.received += chunk.payload.len() as u64;
        if self.received > total as u64 {
            return Err(Error::format(format!(
                "received {} bytes for a {}-byte file",
                self.received, total
            )));
        }
        if chunk.is_last {
            if self.received != total as u64 {
                return Err(Error::format(format!(
                    "last chunk received after {} of {} bytes",
                    self.received, total
                )));
            }
            self.complete = true;
        }
        Ok(&chunk.payload)
    }

    pub fn finish(&self) -> Result<u64> {
        if !self.complete {
            return Err(Error::format(format!(
                "transfer ended after {} bytes without a last chunk",
                self.received
            )));
        }
        Ok(self.received)
    }
}

/// Stream a phone file chunk by chunk into `sink`.
fn receive_file<F>(at: &mut AtChannel, phone_path: &str, mut sink: F) -> Result<u64>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    let command = format!("AT+EFSR=\"{}\"", encode_path(phone_path)?);
    let mut session = FileManagerSession::open(at)?;
    session.send_command(&command)?;

    let mut assembler = ChunkAssembler::new();
    loop {
        let line = match session.receive_answer_to(&command, READ_ANSWER_LENGTH) {
            Ok(line) => line,
            Err(Error::RemoteError { .. }) => return Err(Error::NotFound(phone_path.to_string())),
            Err(e) => return Err(e),
        };
        if line == "OK" {
            break;
        }
        if !line.starts_with("+EFSR:") {
            if !line.is_empty() {
                debug!("Ignoring answer while reading file: {}", line);
            }
            continue;
        }
        let chunk = parse_chunk_record(&line)?;
        sink(assembler.accept(&chunk)?)?;
    }
    let size = assembler.finish()?;
    session.close()?;
    Ok(size)
}

/// Read a whole phone file into memory.
pub fn read_file(at: &mut AtChannel, phone_path: &str) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    receive_file(at, phone_path, |data| {
        content.extend_from_slice(data);
        Ok(())
    })?;
    Ok(content)
}

/// Copy a phone file to a local file.
///
/// The local file is created with the first chunk and removed again if the
/// transfer fails, so a failed download leaves nothing behind.
pub fn download_file(at: &mut AtChannel, phone_path: &str, pc_path: &Path) -> Result<u64> {
    let mut file: Option<File> = None;
    let result = receive_file(at, phone_path, |data| {
        let handle = match file.take() {
            Some(handle) => handle,
            None => File::create(pc_path).map_err(|e| Error::resource(pc_path, e))?,
        };
        file.insert(handle)
            .write_all(data)
            .map_err(|e| Error::resource(pc_path, e))
    })
    .and_then(|size| {
        if let Some(handle) = file.as_mut() {
            handle.flush().map_err(|e| Error::resource(pc_path, e))?;
        }
        Ok(size)
    });

    match result {
        Ok(size) => {
            info!("Downloaded \"{}\" ({} bytes)", phone_path, size);
            Ok(size)
        }
        Err(e) => {
            if file.take().is_some() {
                if let Err(remove_error) = std::fs::remove_file(pc_path) {
                    warn!(
                        "Failed to remove the partial file \"{}\": {}",
                        pc_path.display(),
                        remove_error
                    );
                }
            }
            Err(e)
        }
    }
}

fn parse_write_capacity(line: &str) -> Result<usize> {
    let re = RE_WRITE_CAPACITY.get_or_init(|| Regex::new(r"^\+EFSW:\s*(\d+)").unwrap());
    re.captures(line)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| Error::format(format!("malformed write capacity answer \"{line}\"")))
}

/// Copy a local file to the phone, in chunks no larger than both the phone
/// limit and `buffer_size`.
pub fn send_file(
    at: &mut AtChannel,
    pc_path: &Path,
    phone_path: &str,
    buffer_size: usize,
) -> Result<u64> {
    let mut file = File::open(pc_path).map_err(|e| Error::resource(pc_path, e))?;
    let file_size = file
        .metadata()
        .map_err(|e| Error::resource(pc_path, e))?
        .len();
    let open_command = format!("AT+EFSW=0,\"{}\"", encode_path(phone_path)?);

    let mut session = FileManagerSession::open(at)?;

    session.send_command("AT+EFSW?")?;
    let capacity = session
        .receive_records("AT+EFSW?", SHORT_ANSWER_LENGTH)?
        .iter()
        .find(|line| line.starts_with("+EFSW:"))
        .map(|line| parse_write_capacity(line))
        .ok_or_else(|| Error::format("no write capacity in the AT+EFSW? answer"))??;
    let chunk_size = capacity.min(buffer_size);
    if chunk_size == 0 {
        return Err(Error::format("the phone reports a zero write chunk size"));
    }
    debug!(
        "Phone accepts {} byte chunks, using {} byte chunks",
        capacity, chunk_size
    );

    session.execute(&open_command)?;

    let mut buffer = vec![0u8; chunk_size];
    let mut remaining = file_size;
    loop {
        let length = remaining.min(chunk_size as u64) as usize;
        file.read_exact(&mut buffer[..length])
            .map_err(|e| Error::resource(pc_path, e))?;
        remaining -= length as u64;
        let is_last = remaining == 0;
        let command = format!(
            "AT+EFSW=2,{},{},\"{}\"",
            u8::from(is_last),
            length,
            bytes_to_hex(&buffer[..length])
        );
        session.execute(&command)?;
        if is_last {
            break;
        }
    }

    session.execute("AT+EFSW=1")?;
    session.close()?;
    info!("Sent \"{}\" ({} bytes)", pc_path.display(), file_size);
    Ok(file_size)
}

/// Mirror a phone directory tree into `pc_path`.
pub fn download_directory(at: &mut AtChannel, phone_path: &str, pc_path: &Path) -> Result<()> {
    let entries = list_directory(at, phone_path)?;
    create_directory(pc_path)?;

    for entry in entries {
        if entry.name == "." || entry.name == ".." {
            continue;
        }
        let child_phone_path = join_phone_path(phone_path, &entry.name);
        let child_pc_path = pc_path.join(sanitize_file_name(&entry.name));
        if entry.is_directory() {
            download_directory(at, &child_phone_path, &child_pc_path)?;
        } else {
            download_file(at, &child_phone_path, &child_pc_path)?;
        }
    }
    Ok(())
}

fn attribute_letters(flags: FileAttributes) -> String {
    [
        (FileAttributes::ARCHIVE, 'A'),
        (FileAttributes::DIRECTORY, 'D'),
        (FileAttributes::SYSTEM, 'S'),
        (FileAttributes::HIDDEN, 'H'),
        (FileAttributes::READ_ONLY, 'R'),
    ]
    .iter()
    .map(|&(flag, letter)| if flags.contains(flag) { letter } else { '-' })
    .collect()
}

/// Render a listing like the DOS `dir` command.
pub fn format_directory_listing(entries: &[FileEntry]) -> String {
    let mut output = String::new();
    let mut files = 0usize;
    let mut directories = 0usize;
    let mut bytes = 0u64;

    for entry in entries {
        let size = if entry.is_directory() {
            directories += 1;
            "<DIR>".to_string()
        } else {
            files += 1;
            bytes += entry.size as u64;
            entry.size.to_string()
        };
        output.push_str(&format!(
            "{:>12}  {}  {}\n",
            size,
            attribute_letters(entry.flags),
            entry.name
        ));
    }
    output.push_str(&format!(
        "{files} file(s), {bytes} bytes\n{directories} directory(ies)\n"
    ));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::scripted::{exchange, written_commands, ScriptedConnection};
    use std::sync::{Arc, Mutex};

    fn channel(script: Vec<u8>) -> (AtChannel, Arc<Mutex<Vec<u8>>>) {
        let (connection, written) = ScriptedConnection::new(&script);
        (AtChannel::new(Box::new(connection), None), written)
    }

    fn hex_utf16(text: &str) -> String {
        bytes_to_hex(&charset::encode_utf16_be(text))
    }

    #[test]
    fn encodes_paths_as_utf16_hex() {
        assert_eq!(encode_path("C:\\").unwrap(), "0043003A005C");
        assert!(encode_path(&"x".repeat(300)).is_err());
    }

    #[test]
    fn parses_list_records() {
        let entry = parse_list_record("+EFSL: \"007000690063002E006A00700067\", 1234, 0x20").unwrap();
        assert_eq!(entry.name, "pic.jpg");
        assert_eq!(entry.size, 1234);
        assert_eq!(entry.flags, FileAttributes::ARCHIVE);

        let dir = parse_list_record("+EFSL: \"00410042\", 0, 16").unwrap();
        assert!(dir.is_directory());

        assert!(parse_list_record("+EFSL: \"0041\", x, 16").is_err());
        assert!(parse_list_record("+EFSL: \"004\", 1, 16").is_err());
    }

    #[test]
    fn parses_chunk_records() {
        let chunk = parse_chunk_record("+EFSR: 0, 5, 3, \"414243\"").unwrap();
        assert!(!chunk.is_last);
        assert_eq!(chunk.total_size, 5);
        assert_eq!(chunk.payload, b"ABC");

        assert!(parse_chunk_record("+EFSR: 1, 5, 4, \"414243\"").is_err());
        assert!(parse_chunk_record("+EFSR: 2, 5, 3, \"414243\"").is_err());
        assert!(parse_chunk_record("+EFSR: 1, 5, 3, 414243").is_err());
    }

    #[test]
    fn assembler_rejects_early_last_chunk() {
        let mut assembler = ChunkAssembler::new();
        let first = FileChunk {
            is_last: false,
            total_size: 6,
            payload: b"abc".to_vec(),
        };
        assembler.accept(&first).unwrap();
        let early = FileChunk {
            is_last: true,
            total_size: 6,
            payload: b"d".to_vec(),
        };
        assert!(matches!(assembler.accept(&early), Err(Error::Format(_))));
    }

    #[test]
    fn assembler_requires_last_chunk() {
        let mut assembler = ChunkAssembler::new();
        let chunk = FileChunk {
            is_last: false,
            total_size: 3,
            payload: b"abc".to_vec(),
        };
        assembler.accept(&chunk).unwrap();
        assert!(assembler.finish().is_err());
    }

    #[test]
    fn lists_directory_and_disables_manager() {
        let path = hex_utf16("C:\\Photos\\");
        let list_command = format!("AT+EFSL=\"{path}\"");
        let mut script = exchange("AT+ESUO=3", &["OK"]);
        script.extend(exchange(
            &list_command,
            &[
                &format!("+EFSL: \"{}\", 1234, 0x20", hex_utf16("pic.jpg")),
                &format!("+EFSL: \"{}\", 0, 0x10", hex_utf16("Old")),
                "",
                "OK",
            ],
        ));
        script.extend(exchange("AT+ESUO=4", &["OK"]));
        let (mut at, written) = channel(script);

        let entries = list_directory(&mut at, "C:\\Photos\\").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "pic.jpg");
        assert!(entries[1].is_directory());
        assert_eq!(
            written_commands(&written),
            vec!["AT+ESUO=3".to_string(), list_command, "AT+ESUO=4".to_string()]
        );
    }

    #[test]
    fn missing_directory_is_not_found_and_still_disables() {
        let path = hex_utf16("C:\\Nope");
        let list_command = format!("AT+EFSL=\"{path}\"");
        let mut script = exchange("AT+ESUO=3", &["OK"]);
        script.extend(exchange(&list_command, &["ERROR"]));
        script.extend(exchange("AT+ESUO=4", &["OK"]));
        let (mut at, written) = channel(script);

        match list_directory(&mut at, "C:\\Nope") {
            Err(Error::NotFound(p)) => assert_eq!(p, "C:\\Nope"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(written_commands(&written).last().unwrap(), "AT+ESUO=4");
    }

    #[test]
    fn reads_file_in_chunks() {
        let path = hex_utf16("C:\\a.bin");
        let read_command = format!("AT+EFSR=\"{path}\"");
        let mut script = exchange("AT+ESUO=3", &["OK"]);
        script.extend(exchange(
            &read_command,
            &[
                "+EFSR: 0, 7, 3, \"010203\"",
                "+EFSR: 0, 7, 2, \"0405\"",
                "+EFSR: 1, 7, 2, \"0607\"",
                "",
                "OK",
            ],
        ));
        script.extend(exchange("AT+ESUO=4", &["OK"]));
        let (mut at, _) = channel(script);

        assert_eq!(read_file(&mut at, "C:\\a.bin").unwrap(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn early_last_chunk_fails_and_disables() {
        let path = hex_utf16("C:\\a.bin");
        let read_command = format!("AT+EFSR=\"{path}\"");
        let mut script = exchange("AT+ESUO=3", &["OK"]);
        script.extend(exchange(&read_command, &["+EFSR: 1, 7, 3, \"010203\"", "", "OK"]));
        script.extend(b"AT+ESUO=4\r\nOK\r\n");
        let (mut at, written) = channel(script);

        assert!(matches!(read_file(&mut at, "C:\\a.bin"), Err(Error::Format(_))));
        assert_eq!(written_commands(&written).last().unwrap(), "AT+ESUO=4");
    }

    #[test]
    fn failed_download_leaves_no_local_file() {
        let path = hex_utf16("C:\\a.bin");
        let read_command = format!("AT+EFSR=\"{path}\"");
        let mut script = exchange("AT+ESUO=3", &["OK"]);
        script.extend(exchange(
            &read_command,
            &["+EFSR: 0, 7, 3, \"010203\"", "+EFSR: 0, 7, 9, \"04\"", "", "OK"],
        ));
        script.extend(exchange("AT+ESUO=4", &["OK"]));
        script.extend(exchange("AT+ESUO=3", &["OK"]));
        let (mut at, written) = channel(script);

        let target = std::env::temp_dir().join(format!("b100-partial-{}.bin", std::process::id()));
        assert!(matches!(
            download_file(&mut at, "C:\\a.bin", &target),
            Err(Error::Format(_))
        ));
        assert!(!target.exists());

        // The interrupted answer was skipped, so the next exchange lines up.
        at.execute("AT+ESUO=3").unwrap();
        assert_eq!(
            written_commands(&written),
            vec![
                "AT+ESUO=3".to_string(),
                read_command,
                "AT+ESUO=4".to_string(),
                "AT+ESUO=3".to_string()
            ]
        );
    }

    #[test]
    fn sends_file_in_clamped_chunks() {
        let dir = std::env::temp_dir().join(format!("b100-send-file-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("note.txt");
        std::fs::write(&source, b"hello").unwrap();

        let open_command = format!("AT+EFSW=0,\"{}\"", hex_utf16("C:\\note.txt"));
        let mut script = exchange("AT+ESUO=3", &["OK"]);
        script.extend(exchange("AT+EFSW?", &["+EFSW: 512", "", "OK"]));
        script.extend(exchange(&open_command, &["OK"]));
        script.extend(exchange("AT+EFSW=2,0,2,\"6865\"", &["OK"]));
        script.extend(exchange("AT+EFSW=2,0,2,\"6C6C\"", &["OK"]));
        script.extend(exchange("AT+EFSW=2,1,1,\"6F\"", &["OK"]));
        script.extend(exchange("AT+EFSW=1", &["OK"]));
        script.extend(exchange("AT+ESUO=4", &["OK"]));
        let (mut at, written) = channel(script);

        assert_eq!(send_file(&mut at, &source, "C:\\note.txt", 2).unwrap(), 5);
        let commands = written_commands(&written);
        assert_eq!(commands[3], "AT+EFSW=2,0,2,\"6865\"");
        assert_eq!(commands[5], "AT+EFSW=2,1,1,\"6F\"");
        assert_eq!(commands.last().unwrap(), "AT+ESUO=4");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn formats_listing() {
        let entries = vec![
            FileEntry {
                name: "Photos".into(),
                size: 0,
                flags: FileAttributes::DIRECTORY,
            },
            FileEntry {
                name: "a.txt".into(),
                size: 42,
                flags: FileAttributes::ARCHIVE | FileAttributes::READ_ONLY,
            },
        ];
        let listing = format_directory_listing(&entries);
        assert!(listing.contains("       <DIR>  -D---  Photos\n"));
        assert!(listing.contains("          42  A---R  a.txt\n"));
        assert!(listing.contains("1 file(s), 42 bytes"));
    }

    #[test]
    fn joins_phone_paths() {
        assert_eq!(join_phone_path("C:\\", "a"), "C:\\a");
        assert_eq!(join_phone_path("C:\\Photos", "a"), "C:\\Photos\\a");
    }
}
