//! kith - Share credentials with a small group of friends
//!
//! "Easy to use correctly, difficult to misuse, and easy to audit."
//!
//! kith does as little as possible itself. Encryption is openssl's job,
//! credential storage belongs to git-credential and the system keychain,
//! downloads go through curl. What kith owns is the glue: building the
//! right invocations, feeding the right input, and handing passwords to
//! children over a pipe so they never show up in a process listing.

pub mod config;
pub mod curl;
pub mod git;
pub mod openssl;
pub mod record;
pub mod security;

pub use config::Config;
pub use record::{KeychainRecord, KeychainRequest, RecordError};
