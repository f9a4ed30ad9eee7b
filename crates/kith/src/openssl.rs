//! Symmetric encryption through the openssl command-line tool
//!
//! kith implements no cryptography. Encryption and decryption are
//! `openssl enc` doing the symmetric work with base64 text framing, and
//! this module's whole job is invoking it safely: the payload goes in on
//! stdin, and the password goes in over a [`SecretChannel`] named by an
//! `fd:<N>` argument - never through argv, the environment, or disk.

use anyhow::{Context, Result};
use kith_core::{Invocation, Payload, SecretChannel};

/// Cipher handed to `openssl enc`. AES-256-CBC fails closed: decrypting
/// with the wrong password makes padding verification exit non-zero instead
/// of emitting garbage, which is what lets callers treat a cipher failure as
/// an authentication failure.
const CIPHER: &str = "aes-256-cbc";

/// The openssl version line, e.g. "OpenSSL 3.0.11" or "LibreSSL 3.3.6".
pub fn version() -> Result<String> {
    let text = Invocation::new("openssl")
        .arg("version")
        .text()
        .context("Failed to probe openssl version")?;
    Ok(text.trim_end().to_string())
}

/// The cipher menu from `openssl enc -list`.
pub fn list_ciphers() -> Result<String> {
    Invocation::new("openssl")
        .args(["enc", "-list"])
        .text()
        .context("Failed to list openssl ciphers")
}

/// Encrypt printable text with a password, returning single-line base64
/// ciphertext with trailing whitespace trimmed.
pub fn symmetric_encrypt(plaintext: &str, password: &str) -> Result<String> {
    run_cipher(plaintext, password, false)
}

/// Inverse of [`symmetric_encrypt`]. A wrong password surfaces as the
/// cipher tool's non-zero exit, never as silently corrupted plaintext.
pub fn symmetric_decrypt(ciphertext: &str, password: &str) -> Result<String> {
    run_cipher(ciphertext, password, true)
}

fn run_cipher(payload: &str, password: &str, decrypt: bool) -> Result<String> {
    let channel = SecretChannel::open().context("Failed to open secret channel")?;
    channel
        .send(password)
        .context("Failed to write password into secret channel")?;

    let output = cipher_invocation(&channel, decrypt)
        .input(Payload::from(payload))
        .text()
        .context(if decrypt {
            "openssl could not decrypt (wrong password, or not kith ciphertext?)"
        } else {
            "openssl could not encrypt"
        })?;

    Ok(output.trim_end().to_string())
}

/// The one place a cipher argv is built. The password is not a parameter:
/// by construction the only secret-shaped thing in the argument list is the
/// `fd:<N>` reference to the channel's read end.
fn cipher_invocation(channel: &SecretChannel, decrypt: bool) -> Invocation {
    let mut invocation = Invocation::new("openssl").arg("enc");
    if decrypt {
        invocation = invocation.arg("-d");
    }
    invocation
        .arg("-A")
        .arg(format!("-{}", CIPHER))
        .arg("-base64")
        .arg("-pass")
        .arg(format!("fd:{}", channel.read_fd()))
        .pass_fd(channel.read_fd())
}
