//! Configuration loading utilities
//!
//! Resolves the configuration directory and loads the optional
//! `manager.toml` on top of the built-in defaults.

use crate::{ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolved manager configuration, passed to every component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Directory holding the working loader.conf and recorded state
    pub config_dir: PathBuf,
    /// EFI system partition mount point
    pub esp: PathBuf,
    /// Working loader.conf edited by the manager
    pub loader_conf: PathBuf,
    /// loader.conf read by systemd-boot
    pub live_loader_conf: PathBuf,
    /// Boot loader specification entries
    pub entries_dir: PathBuf,
    /// Recorded root partition UUID
    pub uuid_record: PathBuf,
    /// Recorded default boot entry
    pub default_record: PathBuf,
    /// Whether the default entry is enforced
    pub manage_default: bool,
    /// Block device listing program and leading arguments
    pub lsblk_command: Vec<String>,
    /// Colourize reports
    pub color: bool,
}

impl ManagerConfig {
    /// Defaults for a configuration directory and ESP
    pub fn with_dirs(config_dir: impl Into<PathBuf>, esp: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        let esp = esp.into();

        Self {
            loader_conf: config_dir.join(paths::LOADER_CONF),
            live_loader_conf: esp.join("loader").join(paths::LOADER_CONF),
            entries_dir: esp.join("loader").join("entries"),
            uuid_record: config_dir.join(paths::UUID_RECORD),
            default_record: config_dir.join(paths::DEFAULT_RECORD),
            manage_default: true,
            lsblk_command: vec!["lsblk".to_string()],
            color: true,
            config_dir,
            esp,
        }
    }

    /// Apply a parsed manager.toml; relative paths are taken from the config dir
    fn apply(mut self, file: ManagerFile) -> Result<Self> {
        if let Some(esp) = file.esp {
            let esp = self.resolve(esp);
            let defaults = Self::with_dirs(&self.config_dir, &esp);
            self.live_loader_conf = defaults.live_loader_conf;
            self.entries_dir = defaults.entries_dir;
            self.esp = esp;
        }
        if let Some(path) = file.loader_conf {
            self.loader_conf = self.resolve(path);
        }
        if let Some(path) = file.live_loader_conf {
            self.live_loader_conf = self.resolve(path);
        }
        if let Some(path) = file.entries_dir {
            self.entries_dir = self.resolve(path);
        }
        if let Some(path) = file.uuid_record {
            self.uuid_record = self.resolve(path);
        }
        if let Some(path) = file.default_record {
            self.default_record = self.resolve(path);
        }
        if let Some(manage) = file.manage_default {
            self.manage_default = manage;
        }
        if let Some(command) = file.lsblk_command {
            if command.first().map_or(true, |program| program.is_empty()) {
                return Err(ConfigError::Invalid(
                    "lsblk_command must name a program".to_string(),
                ));
            }
            self.lsblk_command = command;
        }
        if let Some(color) = file.color {
            self.color = color;
        }
        Ok(self)
    }

    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.config_dir.join(path)
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::with_dirs(paths::system_config(), paths::esp())
    }
}

/// On-disk form of manager.toml; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ManagerFile {
    esp: Option<PathBuf>,
    loader_conf: Option<PathBuf>,
    live_loader_conf: Option<PathBuf>,
    entries_dir: Option<PathBuf>,
    uuid_record: Option<PathBuf>,
    default_record: Option<PathBuf>,
    manage_default: Option<bool>,
    lsblk_command: Option<Vec<String>>,
    color: Option<bool>,
}

/// Configuration loader for the manager
pub struct ConfigLoader {
    /// Configuration directory
    root: PathBuf,
    /// Whether a missing manager.toml falls back to defaults
    use_defaults: bool,
}

impl ConfigLoader {
    /// Create a loader rooted at a configuration directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            use_defaults: true,
        }
    }

    /// Loader for the system configuration directory
    pub fn system() -> Self {
        Self::new(get_config_root(None))
    }

    /// Set whether to use defaults when manager.toml is missing
    pub fn use_defaults(mut self, use_defaults: bool) -> Self {
        self.use_defaults = use_defaults;
        self
    }

    /// Load the configuration
    pub fn load(&self) -> Result<ManagerConfig> {
        let defaults = ManagerConfig::with_dirs(&self.root, paths::esp());
        let path = self.root.join(paths::MANAGER_TOML);

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && self.use_defaults => {
                debug!(path = %path.display(), "No manager.toml, using defaults");
                return Ok(defaults);
            }
            Err(e) => return Err(ConfigError::io(&path, e)),
        };

        let file: ManagerFile = toml::from_str(&content)
            .map_err(|source| ConfigError::TomlParse { path: path.clone(), source })?;
        debug!(path = %path.display(), "Loaded manager.toml");
        defaults.apply(file)
    }
}

/// Default configuration paths
pub mod paths {
    use std::path::PathBuf;

    /// Working loader.conf file name
    pub const LOADER_CONF: &str = "loader.conf";
    /// Recorded root UUID file name
    pub const UUID_RECORD: &str = "root_uuid";
    /// Recorded default entry file name
    pub const DEFAULT_RECORD: &str = "default_entry";
    /// Manager settings file name
    pub const MANAGER_TOML: &str = "manager.toml";

    /// System configuration root
    pub fn system_config() -> PathBuf {
        PathBuf::from("/etc/sdboot-manager")
    }

    /// EFI system partition
    pub fn esp() -> PathBuf {
        PathBuf::from("/boot")
    }
}

/// Environment variable names used by the configuration system
pub mod env_vars {
    /// Configuration root override
    pub const CONFIG_DIR: &str = "SDBOOT_MANAGER_CONFIG_DIR";
}

/// Configuration root from an explicit path, the environment, or the default
pub fn get_config_root(custom: Option<&Path>) -> PathBuf {
    if let Some(path) = custom {
        return path.to_path_buf();
    }
    std::env::var_os(env_vars::CONFIG_DIR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(paths::system_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.loader_conf, PathBuf::from("/etc/sdboot-manager/loader.conf"));
        assert_eq!(config.live_loader_conf, PathBuf::from("/boot/loader/loader.conf"));
        assert_eq!(config.entries_dir, PathBuf::from("/boot/loader/entries"));
        assert_eq!(config.uuid_record, PathBuf::from("/etc/sdboot-manager/root_uuid"));
        assert!(config.manage_default);
        assert_eq!(config.lsblk_command, vec!["lsblk"]);
    }

    #[test]
    fn test_loader_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let config = ConfigLoader::new(dir.path()).load().unwrap();
        assert_eq!(config.config_dir, dir.path());
        assert_eq!(config.default_record, dir.path().join("default_entry"));
    }

    #[test]
    fn test_loader_no_defaults() {
        let dir = TempDir::new().unwrap();
        let result = ConfigLoader::new(dir.path()).use_defaults(false).load();
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn test_loader_reads_toml() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("manager.toml"),
            r#"
esp = "/efi"
uuid_record = "state/uuid"
manage_default = false
lsblk_command = ["sh", "-c", "cat devices.json"]
color = false
"#,
        )
        .unwrap();

        let config = ConfigLoader::new(dir.path()).load().unwrap();
        assert_eq!(config.esp, PathBuf::from("/efi"));
        assert_eq!(config.live_loader_conf, PathBuf::from("/efi/loader/loader.conf"));
        assert_eq!(config.entries_dir, PathBuf::from("/efi/loader/entries"));
        assert_eq!(config.uuid_record, dir.path().join("state/uuid"));
        assert!(!config.manage_default);
        assert!(!config.color);
        assert_eq!(config.lsblk_command[0], "sh");
    }

    #[test]
    fn test_loader_rejects_unknown_keys() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manager.toml"), "timeout = 5\n").unwrap();
        let err = ConfigLoader::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse { .. }));
    }

    #[test]
    fn test_loader_rejects_empty_command() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manager.toml"), "lsblk_command = []\n").unwrap();
        let err = ConfigLoader::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_explicit_root_wins() {
        let root = get_config_root(Some(Path::new("/tmp/custom")));
        assert_eq!(root, PathBuf::from("/tmp/custom"));
    }
}
