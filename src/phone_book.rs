use crate::at::{AtChannel, SHORT_ANSWER_LENGTH};
use crate::error::{Error, Result};
use crate::models::PhoneBookEntry;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const SELECT_STORAGE_COMMAND: &str = "AT+CPBS=\"ME\"";
const QUERY_RANGE_COMMAND: &str = "AT+CPBR=?";

static RE_RANGE: OnceLock<Regex> = OnceLock::new();
static RE_ENTRY: OnceLock<Regex> = OnceLock::new();

/// How many times a single phone book entry read is attempted before the
/// whole read is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Contacts stored in the phone memory, indexed by normalized number.
#[derive(Debug, Default, Clone)]
pub struct PhoneBook {
    entries: Vec<PhoneBookEntry>,
    by_number: HashMap<String, usize>,
}

impl PhoneBook {
    pub fn from_entries(entries: Vec<PhoneBookEntry>) -> Self {
        let mut by_number = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            by_number.entry(entry.number.clone()).or_insert(index);
        }
        Self { entries, by_number }
    }

    /// Read every entry of the phone memory phone book.
    pub fn read_all(at: &mut AtChannel, retry: RetryPolicy) -> Result<Self> {
        at.execute(SELECT_STORAGE_COMMAND)?;
        let (first, last) = read_index_range(at)?;
        debug!("Phone book indexes {}..={}", first, last);

        let mut entries = Vec::new();
        for index in first..=last {
            if let Some(entry) = read_entry_with_retry(at, index, retry)? {
                entries.push(entry);
            }
        }
        info!("Read {} phone book entries", entries.len());
        Ok(Self::from_entries(entries))
    }

    pub fn entries(&self) -> &[PhoneBookEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the contact name for `number`. An exact match wins; otherwise the
    /// number is retried with its international prefix swapped for a
    /// national leading zero (`33612345678` becomes `0612345678`).
    pub fn lookup(&self, number: &str) -> Option<&str> {
        let number = normalize_number(number);
        let index = self.by_number.get(number).or_else(|| {
            national_form(number).and_then(|national| self.by_number.get(&national))
        })?;
        let name = self.entries[*index].name.as_str();
        (!name.is_empty()).then_some(name)
    }

    pub fn name_or_number(&self, number: &str) -> String {
        self.lookup(number).unwrap_or(number).to_string()
    }
}

/// Strip the `00` international call prefix.
pub fn normalize_number(number: &str) -> &str {
    number.strip_prefix("00").unwrap_or(number)
}

fn national_form(number: &str) -> Option<String> {
    let mut chars = number.chars();
    chars.next()?;
    chars.next()?;
    let rest = chars.as_str();
    if rest.is_empty() {
        return None;
    }
    Some(format!("0{rest}"))
}

fn read_index_range(at: &mut AtChannel) -> Result<(u32, u32)> {
    at.send_command(QUERY_RANGE_COMMAND)?;
    let records = at.receive_records(QUERY_RANGE_COMMAND, SHORT_ANSWER_LENGTH)?;
    let re = RE_RANGE.get_or_init(|| Regex::new(r"^\+CPBR:\s*\((\d+)-(\d+)\)").unwrap());
    records
        .iter()
        .find_map(|line| re.captures(line))
        .and_then(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)))
        .ok_or_else(|| {
            Error::format(format!(
                "no index range in the answer to \"{QUERY_RANGE_COMMAND}\": {records:?}"
            ))
        })
}

fn read_entry_with_retry(
    at: &mut AtChannel,
    index: u32,
    retry: RetryPolicy,
) -> Result<Option<PhoneBookEntry>> {
    let mut attempt = 1;
    loop {
        match read_entry(at, index) {
            Ok(entry) => return Ok(entry),
            Err(e) if attempt < retry.max_attempts => {
                warn!(
                    "Reading phone book entry {} failed (attempt {}/{}): {}",
                    index, attempt, retry.max_attempts, e
                );
                at.drain_answer()?;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Read one entry; an unused index answers a bare `OK`.
fn read_entry(at: &mut AtChannel, index: u32) -> Result<Option<PhoneBookEntry>> {
    let command = format!("AT+CPBR={index}");
    at.send_command(&command)?;
    let records = at.receive_records(&command, SHORT_ANSWER_LENGTH)?;
    match records.first() {
        None => Ok(None),
        Some(line) => parse_entry(line).map(Some),
    }
}

/// Parse `+CPBR: <index>,"<number>",<type>,"<name>"`.
pub fn parse_entry(line: &str) -> Result<PhoneBookEntry> {
    let re = RE_ENTRY
        .get_or_init(|| Regex::new(r#"^\+CPBR:\s*\d+,"([^"]*)",[^"]*"([^"]*)""#).unwrap());
    let caps = re
        .captures(line)
        .ok_or_else(|| Error::format(format!("malformed phone book entry \"{line}\"")))?;
    Ok(PhoneBookEntry {
        number: normalize_number(&caps[1]).to_string(),
        name: caps[2].to_string(),
    })
}
