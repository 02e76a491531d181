//! Block device enumeration
//!
//! The expected root partition UUID comes from `lsblk`. List mode flattens the
//! disk/partition tree so every device is a single record.

use crate::{Error, Result};
use serde::Deserialize;
use std::process::Command;
use tracing::{debug, warn};

/// Arguments appended to the configured lsblk command
pub const LSBLK_ARGS: &[&str] = &["--json", "--list", "--output", "PATH,TYPE,MOUNTPOINT,PARTUUID"];

/// One row of lsblk output
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockDevice {
    /// Device node, e.g. /dev/nvme0n1p2
    pub path: String,
    /// lsblk device type (disk, part, loop, crypt, ...)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub partuuid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<BlockDevice>,
}

/// Source of block devices
pub trait BlockDevices {
    /// List all block devices
    fn list(&self) -> Result<Vec<BlockDevice>>;
}

/// Block devices from the lsblk command
#[derive(Debug, Clone)]
pub struct Lsblk {
    command: Vec<String>,
}

impl Lsblk {
    /// `command` is the program followed by any leading arguments
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl BlockDevices for Lsblk {
    fn list(&self) -> Result<Vec<BlockDevice>> {
        let mut command = match self.command.split_first() {
            Some((program, leading)) => {
                let mut command = Command::new(program);
                command.args(leading);
                command
            }
            None => Command::new("lsblk"),
        };
        let program = self.command.first().map_or("lsblk", String::as_str);

        debug!(program, "Listing block devices");
        let output = command
            .args(LSBLK_ARGS)
            .output()
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::DeviceQuery {
                code: output.status.code().unwrap_or(1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        parse_lsblk(&output.stdout)
    }
}

/// Parse `lsblk --json --list` output
pub fn parse_lsblk(json: &[u8]) -> Result<Vec<BlockDevice>> {
    let output: LsblkOutput = serde_json::from_slice(json)?;
    Ok(output.blockdevices)
}

fn root_candidates(devices: &[BlockDevice]) -> Vec<&BlockDevice> {
    devices
        .iter()
        .filter(|d| d.kind != "loop")
        .filter(|d| d.mountpoint.as_deref() == Some("/"))
        .collect()
}

/// PARTUUID of the device mounted at `/`.
///
/// Returns an empty string when nothing is mounted at `/` or the root device
/// has no PARTUUID; callers compare it like any other value.
pub fn root_partuuid(devices: &[BlockDevice]) -> String {
    let candidates = root_candidates(devices);

    let root = match candidates.as_slice() {
        [] => {
            warn!("No block device is mounted at /, root UUID is empty");
            return String::new();
        }
        [root] => root,
        [first, ..] => {
            warn!(
                count = candidates.len(),
                device = %first.path,
                "Several block devices are mounted at /, using the first"
            );
            first
        }
    };

    match &root.partuuid {
        Some(uuid) => uuid.clone(),
        None => {
            warn!(device = %root.path, "Root device has no PARTUUID");
            String::new()
        }
    }
}

/// Device carrying the given PARTUUID
pub fn device_for_partuuid<'a>(devices: &'a [BlockDevice], uuid: &str) -> Option<&'a BlockDevice> {
    devices
        .iter()
        .find(|d| d.partuuid.as_deref() == Some(uuid))
}
