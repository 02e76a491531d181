//! sdboot-manager configuration
//!
//! This crate owns everything the manager keeps on disk:
//!
//! - [`loader`]: the manager's own settings (`manager.toml`) and paths
//! - [`loader_conf`]: editing systemd-boot's `loader.conf`
//! - [`record`]: recorded root UUID and default entry files
//!
//! # Configuration Structure
//!
//! ```text
//! /etc/sdboot-manager/
//! ├── manager.toml     # Optional overrides for paths and behaviour
//! ├── loader.conf      # Working loader config, copied to the ESP on apply
//! ├── root_uuid        # Recorded root partition UUID
//! └── default_entry    # Recorded default boot entry
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sdboot_config::{loader_conf, ConfigLoader, EditorMode};
//!
//! let config = ConfigLoader::system().load().unwrap();
//! loader_conf::set_timeout(&config.loader_conf, "5").unwrap();
//! loader_conf::set_editor(&config.loader_conf, EditorMode::Disable).unwrap();
//! ```

pub mod error;
pub mod loader;
pub mod loader_conf;
pub mod record;

pub use error::{ConfigError, Result};
pub use loader::{env_vars, get_config_root, paths, ConfigLoader, ManagerConfig};
pub use loader_conf::{EditorMode, LoaderConf, SetOutcome};
pub use record::{read_record, write_atomic, write_record};
