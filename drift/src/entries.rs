//! Boot entry collaborator
//!
//! Resolves which boot loader specification entry should be the default,
//! keeps the recorded default and renders the live loader.conf.

use crate::{Error, Result};
use config::{read_record, write_record, LoaderConf, ManagerConfig};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Boot entry management as seen by the drift checker
pub trait EntryManager {
    /// Whether a default entry is actively enforced
    fn is_controlling(&self) -> bool;

    /// The entry that should currently be the default
    fn current_default(&self) -> Result<String>;

    /// The recorded default, `None` if nothing was recorded yet
    fn recorded_default(&self) -> Result<Option<String>>;

    /// Record a new default
    fn record_default(&self, id: &str) -> Result<()>;

    /// Whether a recorded default and the current one name the same entry
    fn defaults_match(&self, recorded: &str, current: &str) -> bool {
        entry_stem(recorded) == entry_stem(current)
    }

    /// Remove the live loader.conf, ignoring a file that is already gone
    fn remove_live_config(&self) -> Result<()>;

    /// Render the working loader.conf into the live location
    fn write_live_config(&self) -> Result<()>;
}

fn entry_stem(id: &str) -> &str {
    id.strip_suffix(".conf").unwrap_or(id)
}

/// Entries in an ESP `loader/entries` directory
#[derive(Debug, Clone)]
pub struct LoaderEntries {
    entries_dir: PathBuf,
    default_record: PathBuf,
    loader_conf: PathBuf,
    live_loader_conf: PathBuf,
    manage_default: bool,
}

impl LoaderEntries {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            entries_dir: config.entries_dir.clone(),
            default_record: config.default_record.clone(),
            loader_conf: config.loader_conf.clone(),
            live_loader_conf: config.live_loader_conf.clone(),
            manage_default: config.manage_default,
        }
    }

    /// Entry file names, unsorted
    pub fn list(&self) -> Result<Vec<String>> {
        let read_dir = fs::read_dir(&self.entries_dir)
            .map_err(|e| config::ConfigError::io(&self.entries_dir, e))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| config::ConfigError::io(&self.entries_dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.ends_with(".conf") {
                    entries.push(name.to_string());
                }
            }
        }
        Ok(entries)
    }

    /// Path of the live loader.conf
    pub fn live_loader_conf(&self) -> &Path {
        &self.live_loader_conf
    }
}

impl EntryManager for LoaderEntries {
    fn is_controlling(&self) -> bool {
        self.manage_default
    }

    fn current_default(&self) -> Result<String> {
        let newest = self
            .list()?
            .into_iter()
            .max_by(|a, b| natural_cmp(a, b))
            .ok_or_else(|| Error::NoEntries(self.entries_dir.clone()))?;
        debug!(entry = %newest, "Resolved current default entry");
        Ok(newest)
    }

    fn recorded_default(&self) -> Result<Option<String>> {
        Ok(read_record(&self.default_record)?)
    }

    fn record_default(&self, id: &str) -> Result<()> {
        Ok(write_record(&self.default_record, id)?)
    }

    fn remove_live_config(&self) -> Result<()> {
        match fs::remove_file(&self.live_loader_conf) {
            Ok(()) => {
                debug!(path = %self.live_loader_conf.display(), "Removed live loader.conf");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(config::ConfigError::io(&self.live_loader_conf, e).into()),
        }
    }

    fn write_live_config(&self) -> Result<()> {
        let mut conf = LoaderConf::load(&self.loader_conf)?;

        if self.manage_default {
            if let Some(id) = self.recorded_default()? {
                conf.upsert("default", &id);
            }
        }

        if let Some(parent) = self.live_loader_conf.parent() {
            fs::create_dir_all(parent).map_err(|e| config::ConfigError::io(parent, e))?;
        }
        conf.save_to(&self.live_loader_conf)?;
        info!(path = %self.live_loader_conf.display(), "Wrote live loader.conf");
        Ok(())
    }
}

/// Replace the live loader.conf with a freshly rendered one
pub fn apply_loader_config<E: EntryManager>(entries: &E) -> Result<()> {
    entries.remove_live_config()?;
    entries.write_live_config()
}

/// Compare names so that digit runs order numerically (`6.10` after `6.9`)
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();

    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (num_a, rest_a) = split_digits(a);
                let (num_b, rest_b) = split_digits(b);
                let ord = compare_digit_runs(num_a, num_b);
                if ord != Ordering::Equal {
                    return ord;
                }
                a = rest_a;
                b = rest_b;
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(y);
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
    let end = s.iter().position(|c| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let trim = |s: &[u8]| -> usize { s.iter().position(|&c| c != b'0').unwrap_or(s.len()) };
    let a_trimmed = &a[trim(a)..];
    let b_trimmed = &b[trim(b)..];
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
        .then_with(|| a.len().cmp(&b.len()))
}
