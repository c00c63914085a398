//! Data retrieval from a CAT B100 phone over its serial AT command interface:
//! file manager, SMS, MMS and phone book.

pub mod at;
pub mod charset;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod file_manager;
pub mod hex_codec;
pub mod local_fs;
pub mod mms;
pub mod mms_pdu;
pub mod models;
pub mod pdu;
pub mod phone_book;
pub mod sms;
pub mod wsp;

pub use error::{Error, ErrorKind, Result};
