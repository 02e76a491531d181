//! Drift checking and repair
//!
//! Two tracks are compared independently: the root partition UUID and the
//! default boot entry. Each recorded value is checked against a value
//! computed from the running system.

use crate::devices::{device_for_partuuid, root_partuuid, BlockDevice, BlockDevices, Lsblk};
use crate::entries::{EntryManager, LoaderEntries};
use crate::{Error, Result};
use config::{read_record, write_record, ManagerConfig};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// Tracked categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Uuid,
    Default,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Uuid => write!(f, "UUID"),
            Category::Default => write!(f, "DEFAULT"),
        }
    }
}

/// State of one track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackState {
    /// Nothing recorded, or the collaborator does not enforce this track
    NotConfigured,
    Matching { value: String },
    Mismatched { recorded: String, expected: String },
}

impl TrackState {
    pub fn is_matching(&self) -> bool {
        matches!(self, TrackState::Matching { .. })
    }

    pub fn is_mismatched(&self) -> bool {
        matches!(self, TrackState::Mismatched { .. })
    }
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackState::NotConfigured => write!(f, "not configured"),
            TrackState::Matching { .. } => write!(f, "matching"),
            TrackState::Mismatched { .. } => write!(f, "mismatched"),
        }
    }
}

/// Result of a check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftReport {
    pub uuid: TrackState,
    pub default: TrackState,
}

impl DriftReport {
    /// Both tracks in category order
    pub fn tracks(&self) -> [(Category, &TrackState); 2] {
        [(Category::Uuid, &self.uuid), (Category::Default, &self.default)]
    }

    /// Whether any track is mismatched
    pub fn has_drift(&self) -> bool {
        self.uuid.is_mismatched() || self.default.is_mismatched()
    }
}

/// Recorded settings, only available while every track matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub root_uuid: String,
    /// Device node carrying the root UUID
    pub root_device: Option<String>,
    pub default_entry: String,
}

/// Compares recorded state with the running system
pub struct DriftChecker<D, E> {
    uuid_record: PathBuf,
    devices: D,
    entries: E,
}

impl DriftChecker<Lsblk, LoaderEntries> {
    /// Checker backed by lsblk and the ESP entries directory
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(
            config.uuid_record.clone(),
            Lsblk::new(config.lsblk_command.clone()),
            LoaderEntries::new(config),
        )
    }
}

impl<D: BlockDevices, E: EntryManager> DriftChecker<D, E> {
    pub fn new(uuid_record: impl Into<PathBuf>, devices: D, entries: E) -> Self {
        Self {
            uuid_record: uuid_record.into(),
            devices,
            entries,
        }
    }

    /// The boot entry collaborator
    pub fn entries(&self) -> &E {
        &self.entries
    }

    /// Compare both tracks
    pub fn check(&self) -> Result<DriftReport> {
        let (report, _) = self.check_with_devices()?;
        Ok(report)
    }

    fn check_with_devices(&self) -> Result<(DriftReport, Option<Vec<BlockDevice>>)> {
        let (uuid, devices) = match read_record(&self.uuid_record)? {
            None => (TrackState::NotConfigured, None),
            Some(recorded) => {
                let devices = self.devices.list()?;
                let expected = root_partuuid(&devices);
                debug!(recorded = %recorded, expected = %expected, "Comparing root UUID");
                let state = if recorded == expected {
                    TrackState::Matching { value: recorded }
                } else {
                    TrackState::Mismatched { recorded, expected }
                };
                (state, Some(devices))
            }
        };

        let default = self.default_state()?;

        Ok((DriftReport { uuid, default }, devices))
    }

    fn default_state(&self) -> Result<TrackState> {
        if !self.entries.is_controlling() {
            return Ok(TrackState::NotConfigured);
        }

        let recorded = match self.entries.recorded_default()? {
            Some(recorded) => recorded,
            None => return Ok(TrackState::NotConfigured),
        };

        let expected = self.entries.current_default()?;
        debug!(recorded = %recorded, expected = %expected, "Comparing default entry");
        if self.entries.defaults_match(&recorded, &expected) {
            Ok(TrackState::Matching { value: recorded })
        } else {
            Ok(TrackState::Mismatched { recorded, expected })
        }
    }

    /// Recompute and persist both tracks, apply, then check again.
    ///
    /// Everything is detected before anything is written, so a failed
    /// detection leaves the recorded state as it was.
    pub fn repair(&self) -> Result<DriftReport> {
        let devices = self.devices.list()?;
        let uuid = root_partuuid(&devices);
        let default = self.entries.current_default()?;

        info!(uuid = %uuid, default = %default, "Recording detected boot state");
        write_record(&self.uuid_record, &uuid)?;
        self.entries.record_default(&default)?;
        self.entries.write_live_config()?;

        self.check()
    }

    /// Recorded settings, failing unless both tracks match
    pub fn settings(&self) -> Result<Settings> {
        let (report, devices) = self.check_with_devices()?;

        match (&report.uuid, &report.default) {
            (
                TrackState::Matching { value: root_uuid },
                TrackState::Matching { value: default_entry },
            ) => {
                let root_device = devices
                    .as_deref()
                    .and_then(|devices| device_for_partuuid(devices, root_uuid))
                    .map(|device| device.path.clone());
                Ok(Settings {
                    root_uuid: root_uuid.clone(),
                    root_device,
                    default_entry: default_entry.clone(),
                })
            }
            _ => Err(Error::CorruptedSettings(format!(
                "UUID {}, DEFAULT {}",
                report.uuid, report.default
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    struct FakeDevices(Vec<BlockDevice>);

    impl BlockDevices for FakeDevices {
        fn list(&self) -> Result<Vec<BlockDevice>> {
            Ok(self.0.clone())
        }
    }

    struct FailingDevices;

    impl BlockDevices for FailingDevices {
        fn list(&self) -> Result<Vec<BlockDevice>> {
            Err(Error::DeviceQuery {
                code: 32,
                stderr: "lsblk: failed".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct FakeEntries {
        controlling: bool,
        current: String,
        recorded: RefCell<Option<String>>,
        applied: RefCell<usize>,
    }

    impl EntryManager for FakeEntries {
        fn is_controlling(&self) -> bool {
            self.controlling
        }

        fn current_default(&self) -> Result<String> {
            Ok(self.current.clone())
        }

        fn recorded_default(&self) -> Result<Option<String>> {
            Ok(self.recorded.borrow().clone())
        }

        fn record_default(&self, id: &str) -> Result<()> {
            *self.recorded.borrow_mut() = Some(id.to_string());
            Ok(())
        }

        fn remove_live_config(&self) -> Result<()> {
            Ok(())
        }

        fn write_live_config(&self) -> Result<()> {
            *self.applied.borrow_mut() += 1;
            Ok(())
        }
    }

    fn root(uuid: &str) -> FakeDevices {
        FakeDevices(vec![
            BlockDevice {
                path: "/dev/sda1".to_string(),
                kind: "part".to_string(),
                mountpoint: Some("/boot".to_string()),
                partuuid: Some("esp-uuid".to_string()),
            },
            BlockDevice {
                path: "/dev/sda2".to_string(),
                kind: "part".to_string(),
                mountpoint: Some("/".to_string()),
                partuuid: Some(uuid.to_string()),
            },
        ])
    }

    fn entries(current: &str, recorded: Option<&str>) -> FakeEntries {
        FakeEntries {
            controlling: true,
            current: current.to_string(),
            recorded: RefCell::new(recorded.map(str::to_string)),
            ..Default::default()
        }
    }

    #[test]
    fn test_uuid_mismatch() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("root_uuid");
        fs::write(&record, "abc-123\n").unwrap();

        let checker = DriftChecker::new(&record, root("xyz-789"), entries("arch.conf", Some("arch.conf")));
        let report = checker.check().unwrap();

        assert_eq!(
            report.uuid,
            TrackState::Mismatched {
                recorded: "abc-123".to_string(),
                expected: "xyz-789".to_string()
            }
        );
        assert!(report.default.is_matching());
        assert!(report.has_drift());
    }

    #[test]
    fn test_missing_records_not_configured() {
        let dir = TempDir::new().unwrap();
        let checker = DriftChecker::new(dir.path().join("root_uuid"), FailingDevices, entries("arch.conf", None));
        let report = checker.check().unwrap();

        // Devices are never queried without a recorded UUID
        assert_eq!(report.uuid, TrackState::NotConfigured);
        assert_eq!(report.default, TrackState::NotConfigured);
        assert!(!report.has_drift());
    }

    #[test]
    fn test_not_controlling() {
        let dir = TempDir::new().unwrap();
        let mut fake = entries("new.conf", Some("old.conf"));
        fake.controlling = false;
        let checker = DriftChecker::new(dir.path().join("root_uuid"), root("x"), fake);

        assert_eq!(checker.check().unwrap().default, TrackState::NotConfigured);
    }

    #[test]
    fn test_default_mismatch() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("root_uuid");
        fs::write(&record, "xyz-789\n").unwrap();
        let checker = DriftChecker::new(&record, root("xyz-789"), entries("linux-6.10.conf", Some("linux-6.9.conf")));

        let report = checker.check().unwrap();
        assert!(report.uuid.is_matching());
        assert!(report.default.is_mismatched());
    }

    #[test]
    fn test_repair_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("root_uuid");
        fs::write(&record, "abc-123\n").unwrap();
        let checker = DriftChecker::new(&record, root("xyz-789"), entries("arch.conf", Some("old.conf")));

        for _ in 0..2 {
            let report = checker.repair().unwrap();
            assert!(report.uuid.is_matching());
            assert!(report.default.is_matching());
        }

        assert_eq!(fs::read_to_string(&record).unwrap(), "xyz-789\n");
        assert_eq!(*checker.entries().applied.borrow(), 2);
    }

    #[test]
    fn test_repair_device_failure_keeps_records() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("root_uuid");
        fs::write(&record, "abc-123\n").unwrap();
        let checker = DriftChecker::new(&record, FailingDevices, entries("arch.conf", Some("old.conf")));

        match checker.repair() {
            Err(Error::DeviceQuery { code, .. }) => assert_eq!(code, 32),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(fs::read_to_string(&record).unwrap(), "abc-123\n");
        assert_eq!(checker.entries().recorded_default().unwrap().as_deref(), Some("old.conf"));
        assert_eq!(*checker.entries().applied.borrow(), 0);
    }

    #[test]
    fn test_settings() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("root_uuid");
        fs::write(&record, "xyz-789\n").unwrap();
        let checker = DriftChecker::new(&record, root("xyz-789"), entries("arch.conf", Some("arch.conf")));

        let settings = checker.settings().unwrap();
        assert_eq!(settings.root_uuid, "xyz-789");
        assert_eq!(settings.root_device.as_deref(), Some("/dev/sda2"));
        assert_eq!(settings.default_entry, "arch.conf");
    }

    #[test]
    fn test_settings_corrupted() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("root_uuid");
        fs::write(&record, "xyz-789\n").unwrap();

        // Missing default record
        let checker = DriftChecker::new(&record, root("xyz-789"), entries("arch.conf", None));
        assert!(matches!(checker.settings(), Err(Error::CorruptedSettings(_))));

        // Mismatched UUID
        let checker = DriftChecker::new(&record, root("other"), entries("arch.conf", Some("arch.conf")));
        assert!(matches!(checker.settings(), Err(Error::CorruptedSettings(_))));
    }
}
