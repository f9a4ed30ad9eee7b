//! kith - Share credentials with a small group of friends
//!
//! Everything cryptographic or persistent is delegated to tools already on
//! the machine: openssl encrypts, git-credential and the macOS keychain
//! store, curl downloads. kith glues them together and keeps passwords out
//! of argv and the environment while doing so.
//!
//! Commands:
//! - init <USERNAME>: Write the config file
//! - info: Show which external tools are present, with versions
//!
//! The x-* commands are hidden debugging handles over the individual
//! adapters. A user could run them directly, though they should not; they
//! may be removed as the tool stabilizes.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use kith::record::{KeychainRecord, KeychainRequest};
use kith::{config, curl, git, openssl, security, Config};

#[derive(Parser)]
#[command(name = "kith")]
#[command(about = "Share credentials with a small group of friends")]
#[command(version)]
#[command(after_help = r#"SECURITY:
    - Encryption is performed by openssl; kith implements no cryptography
    - Passwords reach openssl over a pipe, referenced as `-pass fd:N`,
      never through process arguments or the environment
    - Storage is delegated to git-credential and the system keychain"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the configuration file with your username
    Init {
        /// Username your credentials are stored under
        username: String,
    },

    /// Show which external tools are present, with versions
    Info,

    /// Print the resolved configuration directory
    #[command(hide = true)]
    XEnvironmentConfig,

    /// List the ciphers the local openssl supports
    #[command(hide = true)]
    XListCiphers,

    /// Encrypt a file's text with a password
    #[command(hide = true)]
    XEncryptSymmetric {
        plaintext_file: PathBuf,
        password: String,
        ciphertext_file: PathBuf,
    },

    /// Decrypt a file's ciphertext with a password
    #[command(hide = true)]
    XDecryptSymmetric {
        ciphertext_file: PathBuf,
        password: String,
        plaintext_file: PathBuf,
    },

    /// Print the git version line
    #[command(hide = true)]
    XGitVersion,

    /// Print the openssl version line
    #[command(hide = true)]
    XOpensslVersion,

    /// Download a URL to a file
    #[command(hide = true)]
    XDownload {
        url: String,
        destination: PathBuf,
    },

    /// Store a keystone password through git-credential (prompts if omitted)
    #[command(hide = true)]
    XKeystoneCreate {
        host: String,
        username: String,
        password: Option<String>,
    },

    /// Read a keystone password back through git-credential
    #[command(hide = true)]
    XKeystoneRead { host: String, username: String },

    /// Delete a keystone password through git-credential
    #[command(hide = true)]
    XKeystoneDelete { host: String, username: String },

    /// Store a password directly in the keychain (prompts if omitted)
    #[command(hide = true)]
    XKeychainCreate {
        host: String,
        username: String,
        password: Option<String>,
    },

    /// Read a password directly from the keychain
    #[command(hide = true)]
    XKeychainRead { host: String, username: String },

    /// Print true/false for whether a keychain entry exists
    #[command(hide = true)]
    XKeychainExists { host: String, username: String },

    /// Delete a keychain entry
    #[command(hide = true)]
    XKeychainDelete { host: String, username: String },
}

fn main() -> Result<()> {
    // Initialize logging to stderr (stdout is for command output)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { username } => cmd_init(username),
        Commands::Info => cmd_info(),
        Commands::XEnvironmentConfig => cmd_environment_config(),
        Commands::XListCiphers => cmd_list_ciphers(),
        Commands::XEncryptSymmetric {
            plaintext_file,
            password,
            ciphertext_file,
        } => cmd_encrypt_symmetric(&plaintext_file, &password, &ciphertext_file),
        Commands::XDecryptSymmetric {
            ciphertext_file,
            password,
            plaintext_file,
        } => cmd_decrypt_symmetric(&ciphertext_file, &password, &plaintext_file),
        Commands::XGitVersion => cmd_git_version(),
        Commands::XOpensslVersion => cmd_openssl_version(),
        Commands::XDownload { url, destination } => cmd_download(&url, &destination),
        Commands::XKeystoneCreate {
            host,
            username,
            password,
        } => cmd_keystone_create(host, username, password),
        Commands::XKeystoneRead { host, username } => cmd_keystone_read(host, username),
        Commands::XKeystoneDelete { host, username } => cmd_keystone_delete(host, username),
        Commands::XKeychainCreate {
            host,
            username,
            password,
        } => cmd_keychain_create(host, username, password),
        Commands::XKeychainRead { host, username } => cmd_keychain_read(host, username),
        Commands::XKeychainExists { host, username } => cmd_keychain_exists(host, username),
        Commands::XKeychainDelete { host, username } => cmd_keychain_delete(host, username),
    }
}

/// Value of XDG_CONFIG_HOME for path resolution, if the user set one.
fn xdg_config_home() -> Option<String> {
    std::env::var("XDG_CONFIG_HOME").ok()
}

/// Write the config file
fn cmd_init(username: String) -> Result<()> {
    let path = config::config_file(xdg_config_home().as_deref());
    let config = Config { username };
    config.save(&path)?;
    println!("success: Configuration written to {}", path.display());
    Ok(())
}

/// Show external tool presence and versions
fn cmd_info() -> Result<()> {
    println!("{}", tool_line("git", git::version));
    println!("{}", tool_line("openssl", openssl::version));
    println!("{}", tool_line("curl", curl::version));
    #[cfg(target_os = "macos")]
    {
        let security = if which::which("security").is_ok() {
            "found"
        } else {
            "not found"
        };
        println!("security: {}", security);
    }
    Ok(())
}

fn tool_line(name: &str, version: fn() -> Result<String>) -> String {
    if which::which(name).is_err() {
        return format!("{}: not found", name);
    }
    match version() {
        Ok(version) => format!("{}: {}", name, version),
        Err(err) => format!("{}: error: {:#}", name, err),
    }
}

fn cmd_environment_config() -> Result<()> {
    println!(
        "{}",
        config::app_config_dir(xdg_config_home().as_deref()).display()
    );
    Ok(())
}

fn cmd_list_ciphers() -> Result<()> {
    print!("{}", openssl::list_ciphers()?);
    Ok(())
}

/// Encrypt a file. The output file is written only after openssl has
/// succeeded, so a failed run never leaves a partial or corrupt file.
fn cmd_encrypt_symmetric(
    plaintext_file: &PathBuf,
    password: &str,
    ciphertext_file: &PathBuf,
) -> Result<()> {
    let plaintext = fs::read_to_string(plaintext_file)
        .with_context(|| format!("Failed to read {}", plaintext_file.display()))?;
    debug!("encrypting {} bytes from {}", plaintext.len(), plaintext_file.display());

    let ciphertext = openssl::symmetric_encrypt(&plaintext, password)?;

    fs::write(ciphertext_file, format!("{}\n", ciphertext))
        .with_context(|| format!("Failed to write {}", ciphertext_file.display()))?;
    Ok(())
}

/// Decrypt a file, with the same write-only-after-success rule.
fn cmd_decrypt_symmetric(
    ciphertext_file: &PathBuf,
    password: &str,
    plaintext_file: &PathBuf,
) -> Result<()> {
    let ciphertext = fs::read_to_string(ciphertext_file)
        .with_context(|| format!("Failed to read {}", ciphertext_file.display()))?;
    debug!("decrypting {}", ciphertext_file.display());

    let plaintext = openssl::symmetric_decrypt(ciphertext.trim_end(), password)?;

    fs::write(plaintext_file, format!("{}\n", plaintext))
        .with_context(|| format!("Failed to write {}", plaintext_file.display()))?;
    Ok(())
}

fn cmd_git_version() -> Result<()> {
    println!("{}", git::version()?);
    Ok(())
}

fn cmd_openssl_version() -> Result<()> {
    println!("{}", openssl::version()?);
    Ok(())
}

fn cmd_download(url: &str, destination: &PathBuf) -> Result<()> {
    debug!("downloading {} to {}", url, destination.display());
    curl::download(url, destination)
}

fn cmd_keystone_create(host: String, username: String, password: Option<String>) -> Result<()> {
    let password = obtain_password(password)?;
    let record = KeychainRecord {
        host,
        username,
        password,
    };
    git::credential_approve(&record)
}

fn cmd_keystone_read(host: String, username: String) -> Result<()> {
    let record = git::credential_fill(&KeychainRequest { host, username })?;
    println!("{}", record.password);
    Ok(())
}

fn cmd_keystone_delete(host: String, username: String) -> Result<()> {
    git::credential_reject(&KeychainRequest { host, username })
}

fn cmd_keychain_create(host: String, username: String, password: Option<String>) -> Result<()> {
    let password = obtain_password(password)?;
    let record = KeychainRecord {
        host,
        username,
        password,
    };
    security::add_internet_password(&record)
}

fn cmd_keychain_read(host: String, username: String) -> Result<()> {
    let password = security::read_internet_password(&KeychainRequest { host, username })?;
    println!("{}", password);
    Ok(())
}

fn cmd_keychain_exists(host: String, username: String) -> Result<()> {
    let exists = security::find_internet_password(&KeychainRequest { host, username })?;
    println!("{}", exists);
    Ok(())
}

fn cmd_keychain_delete(host: String, username: String) -> Result<()> {
    security::delete_internet_password(&KeychainRequest { host, username })
}

/// Use the password given on the command line, or fall back to a hidden
/// prompt so it need not appear in shell history at all.
fn obtain_password(password: Option<String>) -> Result<String> {
    match password {
        Some(password) => Ok(password),
        None => {
            let password = rpassword::prompt_password("Enter password: ")
                .context("Failed to read password")?;
            if password.is_empty() {
                bail!("Empty password not allowed");
            }
            Ok(password)
        }
    }
}
