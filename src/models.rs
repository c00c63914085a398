use bitflags::bitflags;
use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

bitflags! {
    /// File attributes reported by the phone, laid out like the FAT
    /// directory entry attribute byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

impl Serialize for FileAttributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

/// One file, directory or drive as listed by the phone.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u32,
    pub flags: FileAttributes,
}

impl FileEntry {
    pub fn is_directory(&self) -> bool {
        self.flags.contains(FileAttributes::DIRECTORY)
    }
}

/// Where an SMS is stored, which also tells which PDU header shape it uses.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageLocation {
    Inbox,
    Sent,
    Draft,
}

impl StorageLocation {
    pub fn label(self) -> &'static str {
        match self {
            StorageLocation::Inbox => "Received",
            StorageLocation::Sent => "Sent",
            StorageLocation::Draft => "Draft",
        }
    }
}

/// One decoded SMS PDU. Multi-part messages produce one record per part.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct SmsRecord {
    pub phone_number: String,
    pub text: String,
    pub storage_location: StorageLocation,
    pub record_id: u16,
    pub total_parts: u8,
    pub part_number: u8,
    pub timestamp: Option<NaiveDateTime>,
}

impl SmsRecord {
    pub fn is_multi_part(&self) -> bool {
        self.total_parts > 1
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct PhoneBookEntry {
    pub number: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_bits() {
        let flags = FileAttributes::from_bits_truncate(0x31);
        assert!(flags.contains(FileAttributes::ARCHIVE));
        assert!(flags.contains(FileAttributes::DIRECTORY));
        assert!(flags.contains(FileAttributes::READ_ONLY));
        assert!(!flags.contains(FileAttributes::HIDDEN));
    }

    #[test]
    fn entry_serializes_flags_as_byte() {
        let entry = FileEntry {
            name: "a.txt".into(),
            size: 3,
            flags: FileAttributes::ARCHIVE,
        };
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"name":"a.txt","size":3,"flags":32}"#
        );
    }
}
