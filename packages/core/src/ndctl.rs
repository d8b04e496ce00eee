//! ndctl-backed unsafe shutdown tool (Linux).
//!
//! Enumerates DIMMs from the region metadata reported by `ndctl list` and
//! reads/injects the shutdown counter through the health query and
//! `inject-smart` commands. All ndctl output is machine-readable JSON,
//! decoded with serde.

use serde::Deserialize;
use serde_json::Value;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::{CommandRunner, SystemRunner, display_command};
use crate::tool::{Dimm, UscTool};

/// Region entry from `ndctl list -R -N -v`.
#[derive(Debug, Deserialize)]
struct Region {
    #[serde(default)]
    mappings: Option<Vec<Value>>,
    #[serde(default)]
    namespaces: Vec<Namespace>,
}

#[derive(Debug, Deserialize)]
struct Namespace {
    #[serde(default)]
    blockdev: Option<String>,
    #[serde(default)]
    chardev: Option<String>,
}

/// Per-DIMM entry from `ndctl list -HD`.
#[derive(Debug, Deserialize)]
struct DimmListing {
    #[serde(default)]
    health: Option<Health>,
}

#[derive(Debug, Deserialize)]
struct Health {
    #[serde(default)]
    shutdown_count: Option<Value>,
}

/// Unsafe shutdown tool driving `ndctl`.
pub struct NdctlUsc {
    runner: Box<dyn CommandRunner>,
}

impl NdctlUsc {
    /// Creates the tool with the system command runner.
    ///
    /// Fails with [`Error::InvalidToolType`] on Windows, where ndctl is
    /// not available; use ipmctl there instead.
    pub fn new() -> Result<Self> {
        if cfg!(target_os = "windows") {
            return Err(Error::InvalidToolType {
                message: "ndctl is not available on Windows - use ipmctl instead".to_string(),
            });
        }
        Ok(Self::with_runner(Box::new(SystemRunner)))
    }

    /// Creates the tool over a custom command runner.
    pub fn with_runner(runner: Box<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// DIMM name recorded in a mapping handle, e.g. `nmem0`.
    fn dimm_name<'a>(&self, dimm: &'a Dimm) -> Result<&'a str> {
        let mapping = match dimm {
            Dimm::Mapping(mapping) => mapping,
            Dimm::Id(_) => {
                return Err(Error::MissingField {
                    field: "dimm".to_string(),
                });
            }
        };

        mapping
            .get("dimm")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MissingField {
                field: "dimm".to_string(),
            })
    }
}

impl UscTool for NdctlUsc {
    fn dev_dimms(&self, dev: &Device) -> Result<Vec<Dimm>> {
        let path = match dev {
            Device::Path(path) => path,
            Device::DiskNumber(number) => {
                return Err(Error::InvalidToolType {
                    message: format!(
                        "ndctl identifies devices by path, but disk number {number} was supplied"
                    ),
                });
            }
        };
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::DeviceNotFound {
                message: format!("'{}' has no device name", path.display()),
            })?;

        let args = ["list", "-R", "-N", "-v"];
        let out = self.runner.run("ndctl", &args)?;
        let command = display_command("ndctl", &args);

        if !out.success() {
            return Err(Error::ToolInvocationFailed {
                command,
                code: out.code.unwrap_or(-1),
                output: out.merged(),
            });
        }

        let regions = decode_regions(&out.stdout).map_err(|_| Error::UnparsableToolOutput {
            command,
            output: out.stdout.clone(),
        })?;

        let region = regions
            .into_iter()
            .find(|region| {
                region.namespaces.iter().any(|ns| {
                    ns.blockdev.as_deref() == Some(name) || ns.chardev.as_deref() == Some(name)
                })
            })
            .ok_or_else(|| Error::DeviceNotFound {
                message: format!("no region backs device '{}'", path.display()),
            })?;

        let mappings = region.mappings.ok_or_else(|| Error::MissingField {
            field: "mappings".to_string(),
        })?;

        Ok(mappings.into_iter().map(Dimm::Mapping).collect())
    }

    fn read_usc(&self, dimm: &Dimm) -> Result<u64> {
        let name = self.dimm_name(dimm)?;
        let args = ["list", "-HD", "-d", name];
        let out = self.runner.run("ndctl", &args)?;
        let command = display_command("ndctl", &args);

        if !out.success() {
            return Err(Error::ToolInvocationFailed {
                command,
                code: out.code.unwrap_or(-1),
                output: out.merged(),
            });
        }

        let listing: Vec<DimmListing> =
            serde_json::from_str(&out.stdout).map_err(|_| Error::UnparsableToolOutput {
                command: command.clone(),
                output: out.stdout.clone(),
            })?;

        let health = listing
            .first()
            .and_then(|entry| entry.health.as_ref())
            .ok_or_else(|| Error::MissingField {
                field: "health".to_string(),
            })?;
        let count = health
            .shutdown_count
            .as_ref()
            .ok_or_else(|| Error::MissingField {
                field: "shutdown_count".to_string(),
            })?;

        shutdown_count_value(count).ok_or_else(|| Error::UnparsableToolOutput {
            command,
            output: out.stdout.clone(),
        })
    }

    fn inject_usc(&self, dimm: &Dimm) -> Result<()> {
        let name = self.dimm_name(dimm)?;
        let args = ["inject-smart", "-U", name];
        let out = self.runner.run("ndctl", &args)?;

        if !out.success() {
            return Err(Error::ToolInvocationFailed {
                command: display_command("ndctl", &args),
                code: out.code.unwrap_or(-1),
                output: out.merged(),
            });
        }

        Ok(())
    }
}

/// Decodes the region listing.
///
/// `ndctl list` prints a bare array when a single object type is selected
/// and wraps the listing in an object keyed by type when several are.
fn decode_regions(out: &str) -> serde_json::Result<Vec<Region>> {
    #[derive(Deserialize)]
    struct Envelope {
        #[serde(default)]
        regions: Vec<Region>,
    }

    serde_json::from_str::<Vec<Region>>(out)
        .or_else(|_| serde_json::from_str::<Envelope>(out).map(|envelope| envelope.regions))
}

/// The counter arrives as either a JSON number or a decimal string,
/// depending on the ndctl version.
fn shutdown_count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
