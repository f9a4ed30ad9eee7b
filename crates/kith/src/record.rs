//! Credential wire format
//!
//! The plain-text key=value block spoken by `git-credential(1)`: a fixed
//! `protocol=https` first line, then host and username, then - for a full
//! record - the password. A request is the same block without the password,
//! used to ask the credential store for one.

use std::fmt;
use thiserror::Error;

/// Errors from parsing credential-store output.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("Malformed credential line (no '='): {0:?}")]
    MalformedLine(String),

    #[error("Credential output missing field: {0}")]
    MissingField(&'static str),
}

/// A full credential-store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeychainRecord {
    pub host: String,
    pub username: String,
    pub password: String,
}

/// A lookup key for a credential-store entry: a record without its password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeychainRequest {
    pub host: String,
    pub username: String,
}

impl fmt::Display for KeychainRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "protocol=https\nhost={}\nusername={}\npassword={}",
            self.host, self.username, self.password
        )
    }
}

impl fmt::Display for KeychainRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "protocol=https\nhost={}\nusername={}",
            self.host, self.username
        )
    }
}

impl KeychainRecord {
    /// Parse credential-store output back into a record. Each line splits on
    /// the first `=`; a line without one is a hard error, as is a missing
    /// field. Keys this program does not know (the store may emit extras,
    /// e.g. `password_expiry_utc`) are ignored.
    pub fn parse(output: &str) -> Result<Self, RecordError> {
        let mut host = None;
        let mut username = None;
        let mut password = None;

        for line in output.lines() {
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| RecordError::MalformedLine(line.to_string()))?;
            match key {
                "host" => host = Some(value.to_string()),
                "username" => username = Some(value.to_string()),
                "password" => password = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(Self {
            host: host.ok_or(RecordError::MissingField("host"))?,
            username: username.ok_or(RecordError::MissingField("username"))?,
            password: password.ok_or(RecordError::MissingField("password"))?,
        })
    }
}
