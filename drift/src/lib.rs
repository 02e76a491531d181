//! Drift detection between recorded and detected boot state
//!
//! - [`devices`]: block device enumeration through lsblk
//! - [`entries`]: the boot entry collaborator (default entry, live loader.conf)
//! - [`checker`]: per-track comparison and the repair loop
//!
//! ```rust,no_run
//! use config::ConfigLoader;
//! use sdboot_drift::DriftChecker;
//!
//! let config = ConfigLoader::system().load().unwrap();
//! let report = DriftChecker::from_config(&config).check().unwrap();
//! if report.has_drift() {
//!     eprintln!("boot configuration drifted");
//! }
//! ```

pub mod checker;
pub mod devices;
pub mod entries;
pub mod error;

pub use checker::{Category, DriftChecker, DriftReport, Settings, TrackState};
pub use devices::{BlockDevice, BlockDevices, Lsblk};
pub use entries::{apply_loader_config, EntryManager, LoaderEntries};
pub use error::{Error, Result};
