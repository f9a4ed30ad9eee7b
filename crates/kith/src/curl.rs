//! Download adapter over `curl(1)`
//!
//! Long options throughout so an auditor reading argv needs no flag table.

use anyhow::{Context, Result};
use kith_core::Invocation;
use std::path::Path;

/// Program name and version only, e.g. "curl 8.4.0".
pub fn version() -> Result<String> {
    let text = Invocation::new("curl")
        .arg("--version")
        .text()
        .context("Failed to probe curl version")?;
    let words: Vec<&str> = text.split_whitespace().take(2).collect();
    Ok(words.join(" "))
}

/// Fetch a URL into a file. `--fail` turns server errors into a non-zero
/// exit, so failures surface instead of saving an error page.
pub fn download(url: &str, destination: &Path) -> Result<()> {
    Invocation::new("curl")
        .args(["--silent", "--show-error", "--fail", "--output"])
        .arg(destination.to_string_lossy().to_string())
        .arg(url)
        .captured_output()
        .with_context(|| format!("Failed to download {}", url))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curl_missing() -> bool {
        which::which("curl").is_err()
    }

    #[test]
    fn test_version() {
        if curl_missing() {
            return;
        }
        let version = version().unwrap();
        assert!(version.starts_with("curl "));
        assert_eq!(version.split_whitespace().count(), 2);
    }

    #[test]
    fn test_download() {
        if curl_missing() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.txt");
        std::fs::write(&source, "source").unwrap();

        let dest = dir.path().join("dest.txt");
        download(&format!("file://{}", source.display()), &dest).unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "source");
    }

    #[test]
    fn test_download_failure_surfaces() {
        if curl_missing() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest.txt");
        let missing = dir.path().join("no-such-source.txt");
        assert!(download(&format!("file://{}", missing.display()), &dest).is_err());
    }
}
