//! The request scoped records built from inbound JSON bodies.
//!
//! Each record is parsed from a request body, validated, used to build one (or two) store
//! commands and then dropped. Identifiers are opaque strings; the only check made on them is
//! that they are present, are strings, and are not empty.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{KsError, Result};

/// A registered device and the user who owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// machine code (uuid)
    pub machine: String,
    /// username
    pub username: String,
}

/// a `/userregister` request: a [`UserRecord`] plus the insert `flag`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRegistration {
    /// the record to register
    pub user: UserRecord,
    /// `true` inserts unconditionally, `false` only inserts if no record exists yet
    pub force: bool,
}

#[derive(Deserialize)]
struct RawRegistration {
    machine: String,
    username: String,
    flag: u8,
}

impl UserRegistration {
    /// parses and validates a `/userregister` body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let raw: RawRegistration = serde_json::from_slice(body)?;
        require("machine", &raw.machine)?;
        require("username", &raw.username)?;
        let force = match raw.flag {
            0 => false,
            1 => true,
            n => return Err(KsError::InvalidRequest(format!("'flag' must be 0 or 1, got {}", n))),
        };
        Ok(UserRegistration {
            user: UserRecord { machine: raw.machine, username: raw.username },
            force,
        })
    }
}

/// a lookup of a single registration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserQuery {
    /// machine code (uuid)
    pub machine: String,
}

impl UserQuery {
    /// parses and validates a `/userget` body
    pub fn parse(body: &[u8]) -> Result<Self> {
        parse_with(body, |q: &UserQuery| require("machine", &q.machine))
    }
}

/// An encrypted file's metadata. `data` is the whole request body, stored verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// machine code (uuid) of the owning device
    pub machine: String,
    /// file uuid
    pub uuid: String,
    /// json data
    pub data: String,
}

#[derive(Deserialize)]
struct FileHeader {
    machine: String,
    uuid: String,
}

impl FileRecord {
    /// parses and validates a `/fileset` body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let header: FileHeader = serde_json::from_slice(body)?;
        require("machine", &header.machine)?;
        require("uuid", &header.uuid)?;
        Ok(FileRecord { machine: header.machine, uuid: header.uuid, data: raw_body(body)? })
    }
}

/// a lookup of a single file by its uuid
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileQuery {
    /// file uuid
    pub uuid: String,
}

impl FileQuery {
    /// parses and validates a `/fileget` body
    pub fn parse(body: &[u8]) -> Result<Self> {
        parse_with(body, |q: &FileQuery| require("uuid", &q.uuid))
    }
}

/// One page of a machine's files. `page` is a store scan cursor, `0` starts a new scan
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileAllQuery {
    /// machine code (uuid)
    pub machine: String,
    /// scan cursor
    pub page: u64,
}

impl FileAllQuery {
    /// parses and validates a `/filegetall` body
    pub fn parse(body: &[u8]) -> Result<Self> {
        parse_with(body, |q: &FileAllQuery| require("machine", &q.machine))
    }
}

/// An append-only trace entry on a file.
///
/// `field` is `trace:` followed by the microsecond timestamp at which the record was built,
/// so a file's trace entries sort in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    /// file uuid
    pub uuid: String,
    /// hash field the entry is stored under
    pub field: String,
    /// json data
    pub data: String,
}

#[derive(Deserialize)]
struct TraceHeader {
    uuid: String,
}

impl TraceRecord {
    /// parses and validates a `/filesettrace` body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let header: TraceHeader = serde_json::from_slice(body)?;
        require("uuid", &header.uuid)?;
        let field = format!("trace:{}", chrono::Utc::now().timestamp_micros());
        Ok(TraceRecord { uuid: header.uuid, field, data: raw_body(body)? })
    }
}

/// One page of a file's trace entries. Same cursor semantics as [`FileAllQuery`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TraceQuery {
    /// file uuid
    pub uuid: String,
    /// scan cursor
    pub page: u64,
}

impl TraceQuery {
    /// parses and validates a `/filegettrace` body
    pub fn parse(body: &[u8]) -> Result<Self> {
        parse_with(body, |q: &TraceQuery| require("uuid", &q.uuid))
    }
}

fn parse_with<T, F>(body: &[u8], validate: F) -> Result<T>
where
    T: DeserializeOwned,
    F: FnOnce(&T) -> Result<()>,
{
    let value: T = serde_json::from_slice(body)?;
    validate(&value)?;
    Ok(value)
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(KsError::InvalidRequest(format!("'{}' must not be empty", name)));
    }
    Ok(())
}

fn raw_body(body: &[u8]) -> Result<String> {
    std::str::from_utf8(body)
        .map(|s| s.trim().to_string())
        .map_err(|e| KsError::InvalidRequest(e.to_string()))
}
