//! Credential-store adapter over `git-credential(1)`
//!
//! git fronts the platform credential store for us: `approve` writes a
//! record, `fill` answers a request with a full record, `reject` deletes.
//! Each subcommand takes the key=value block on stdin; only `fill` answers
//! on stdout. Note that `fill` on a missing entry may fall back to an
//! interactive prompt - there is deliberately no existence probe here (the
//! keychain adapter has one that cannot hang).

use anyhow::{bail, Context, Result};
use kith_core::Invocation;

use crate::record::{KeychainRecord, KeychainRequest};

/// The git version line, e.g. "git version 2.39.2".
pub fn version() -> Result<String> {
    let text = Invocation::new("git")
        .arg("version")
        .text()
        .context("Failed to probe git version")?;
    Ok(text.trim_end().to_string())
}

/// Store a record in the credential store.
pub fn credential_approve(record: &KeychainRecord) -> Result<()> {
    let status = Invocation::new("git")
        .args(["credential", "approve"])
        .input(format!("{}\n", record))
        .exit_status()
        .context("Failed to run git credential approve")?;
    if status != 0 {
        bail!("git credential approve exited with status {}", status);
    }
    Ok(())
}

/// Look up the full record for a request.
pub fn credential_fill(request: &KeychainRequest) -> Result<KeychainRecord> {
    let output = Invocation::new("git")
        .args(["credential", "fill"])
        .input(format!("{}\n", request))
        .text()
        .context("Failed to run git credential fill")?;
    KeychainRecord::parse(&output).context("Unparseable git credential fill output")
}

/// Delete the record a request names. Deleting an absent record is not an
/// error; git treats reject as idempotent.
pub fn credential_reject(request: &KeychainRequest) -> Result<()> {
    let status = Invocation::new("git")
        .args(["credential", "reject"])
        .input(format!("{}\n", request))
        .exit_status()
        .context("Failed to run git credential reject")?;
    if status != 0 {
        bail!("git credential reject exited with status {}", status);
    }
    Ok(())
}
