//! Config-home resolution
//!
//! kith follows the XDG convention on every platform, macOS included: an
//! explicit `XDG_CONFIG_HOME` wins, otherwise `~/.config`. `dirs` would
//! report `~/Library/Application Support` on macOS, so the default is
//! assembled from the home directory by hand.

use std::path::PathBuf;

/// Resolve the configuration home directory. `xdg_config_home` is the value
/// of the `XDG_CONFIG_HOME` environment variable if set; a leading `~` in it
/// is expanded. An unset or empty value falls back to `~/.config`.
pub fn config_home(xdg_config_home: Option<&str>) -> PathBuf {
    match xdg_config_home {
        Some(value) if !value.is_empty() => {
            PathBuf::from(shellexpand::tilde(value).to_string())
        }
        _ => home_dir().join(".config"),
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_home_none() {
        assert!(config_home(None).ends_with(".config"));
    }

    #[test]
    fn test_config_home_some() {
        let home = config_home(Some("~/.altconfig"));
        assert!(home.ends_with(".altconfig"));
        assert!(!home.to_string_lossy().contains('~'));
    }

    #[test]
    fn test_config_home_bare_tilde() {
        assert_eq!(config_home(Some("~")), dirs::home_dir().unwrap());
    }

    #[test]
    fn test_config_home_absolute() {
        assert_eq!(config_home(Some("/etc/xdg")), PathBuf::from("/etc/xdg"));
    }

    #[test]
    fn test_config_home_empty_is_unset() {
        assert!(config_home(Some("")).ends_with(".config"));
    }
}
