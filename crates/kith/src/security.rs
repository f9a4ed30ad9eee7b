//! Keychain adapter over macOS `security(1)`
//!
//! Direct internet-password entries in the login keychain. This is where
//! the existence probe lives: `find-internet-password` answers by exit code
//! without ever prompting, which git-credential cannot promise. The module
//! only builds argv, so it compiles everywhere; the live tests are macOS.
//!
//! One honest wart: `add-internet-password` has no stdin or descriptor mode,
//! so the password rides in argv there. The command is debug-only and
//! hidden, and the value already crossed the user's own shell argv to get
//! here; the no-secrets-in-argv guarantee binds the cipher path, not this
//! escape hatch.

use anyhow::{bail, Context, Result};
use kith_core::Invocation;

use crate::record::{KeychainRecord, KeychainRequest};

/// Whether an entry exists: exit code 0 is "present", non-zero "absent".
/// No output is captured; attribute listings flow to the inherited streams.
pub fn find_internet_password(request: &KeychainRequest) -> Result<bool> {
    let status = Invocation::new("security")
        .arg("find-internet-password")
        .args(["-s", &request.host, "-a", &request.username])
        .exit_status()
        .context("Failed to run security find-internet-password")?;
    Ok(status == 0)
}

/// Create or update (-U) an entry.
pub fn add_internet_password(record: &KeychainRecord) -> Result<()> {
    let status = Invocation::new("security")
        .arg("add-internet-password")
        .arg("-U")
        .args(["-s", &record.host, "-a", &record.username, "-w", &record.password])
        .exit_status()
        .context("Failed to run security add-internet-password")?;
    if status != 0 {
        bail!("security add-internet-password exited with status {}", status);
    }
    Ok(())
}

/// Read the password of an entry (-w prints just the password).
pub fn read_internet_password(request: &KeychainRequest) -> Result<String> {
    let output = Invocation::new("security")
        .arg("find-internet-password")
        .args(["-s", &request.host, "-a", &request.username, "-w"])
        .text()
        .context("Failed to run security find-internet-password -w")?;
    Ok(output.trim_end().to_string())
}

/// Delete an entry. Deleting an absent entry is not an error, so cleanup
/// paths stay idempotent.
pub fn delete_internet_password(request: &KeychainRequest) -> Result<()> {
    Invocation::new("security")
        .arg("delete-internet-password")
        .args(["-s", &request.host, "-a", &request.username])
        .exit_status()
        .context("Failed to run security delete-internet-password")?;
    Ok(())
}

#[cfg(test)]
#[cfg(target_os = "macos")]
mod tests {
    use super::*;

    fn request() -> KeychainRequest {
        KeychainRequest {
            host: "kith.invalid".to_string(),
            username: "perimeter-test".to_string(),
        }
    }

    // One ordered pass over the whole lifecycle, so the keychain state each
    // step observes is the one the previous step left behind.
    #[test]
    fn test_keychain_lifecycle() {
        if which::which("security").is_err() {
            return;
        }

        delete_internet_password(&request()).unwrap();
        assert!(!find_internet_password(&request()).unwrap());

        let record = KeychainRecord {
            host: "kith.invalid".to_string(),
            username: "perimeter-test".to_string(),
            password: "password".to_string(),
        };
        add_internet_password(&record).unwrap();
        assert!(find_internet_password(&request()).unwrap());
        assert_eq!(read_internet_password(&request()).unwrap(), "password");

        delete_internet_password(&request()).unwrap();
        assert!(!find_internet_password(&request()).unwrap());
    }
}
