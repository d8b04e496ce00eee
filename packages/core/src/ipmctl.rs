//! ipmctl-backed unsafe shutdown tool (Windows).
//!
//! Enumerates the DIMMs behind a physical disk with the `Get-PmemDisk`
//! PowerShell cmdlet and reads/injects the latched dirty shutdown counter
//! through the `ipmctl` inventory/sensor command family. The sensor output
//! is a pipe-delimited table; parsing it is isolated here so the facade
//! never sees the textual format.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::{CommandRunner, SystemRunner, display_command};
use crate::tool::{Dimm, UscTool};

/// Row label of the unsafe shutdown counter in `ipmctl show -sensor` output.
const USC_ROW_TITLE: &str = "LatchedDirtyShutdownCount";

/// Unsafe shutdown tool driving `ipmctl` and the PmemDisk cmdlets.
pub struct Ipmctl {
    runner: Box<dyn CommandRunner>,
}

impl std::fmt::Debug for Ipmctl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ipmctl").finish_non_exhaustive()
    }
}

impl Ipmctl {
    /// Creates the tool with the system command runner.
    ///
    /// Fails with [`Error::InvalidToolType`] on anything but Windows;
    /// use ndctl there instead.
    pub fn new() -> Result<Self> {
        if !cfg!(target_os = "windows") {
            return Err(Error::InvalidToolType {
                message: "ipmctl unsafe shutdown handling is only implemented for Windows \
                          - for Linux use ndctl instead"
                    .to_string(),
            });
        }
        Ok(Self::with_runner(Box::new(SystemRunner)))
    }

    /// Creates the tool over a custom command runner.
    pub fn with_runner(runner: Box<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn dimm_id<'a>(&self, dimm: &'a Dimm) -> Result<&'a str> {
        match dimm {
            Dimm::Id(id) => Ok(id),
            Dimm::Mapping(_) => Err(Error::MissingField {
                field: "id".to_string(),
            }),
        }
    }
}

impl UscTool for Ipmctl {
    fn dev_dimms(&self, dev: &Device) -> Result<Vec<Dimm>> {
        let disk_no = match dev {
            Device::DiskNumber(number) => *number,
            Device::Path(path) => {
                return Err(Error::InvalidToolType {
                    message: format!(
                        "ipmctl identifies devices by disk number, not by path '{}'",
                        path.display()
                    ),
                });
            }
        };

        let query = format!(
            "Get-PmemDisk | Where DiskNumber -Eq {disk_no} \
             | Format-Table -Property PhysicalDeviceIds -HideTableHeaders -Autosize"
        );
        let args = ["-NoProfile", "-Command", query.as_str()];
        let out = self.runner.run("powershell", &args)?;

        if !out.success() {
            return Err(Error::ToolInvocationFailed {
                command: display_command("powershell", &args),
                code: out.code.unwrap_or(-1),
                output: out.merged(),
            });
        }

        // Output is the id set in braces, e.g. "{20, 120}".
        let ids = out
            .stdout
            .trim()
            .trim_matches(|c| c == '{' || c == '}')
            .trim();
        if ids.is_empty() {
            return Err(Error::DeviceNotFound {
                message: format!("disk {disk_no} has no underlying DIMMs"),
            });
        }

        // Hex prefix for compliance with the read/inject commands.
        Ok(ids
            .split(',')
            .map(|id| Dimm::Id(format!("0x{}", id.trim())))
            .collect())
    }

    fn read_usc(&self, dimm: &Dimm) -> Result<u64> {
        let id = self.dimm_id(dimm)?;
        let args = ["show", "-sensor", "-dimm", id];
        let out = self.runner.run("ipmctl", &args)?;
        let command = display_command("ipmctl", &args);

        if !out.success() {
            return Err(Error::ToolInvocationFailed {
                command,
                code: out.code.unwrap_or(-1),
                output: out.merged(),
            });
        }

        parse_usc_row(&out.stdout).ok_or_else(|| Error::UnparsableToolOutput {
            command,
            output: out.stdout.clone(),
        })
    }

    fn inject_usc(&self, dimm: &Dimm) -> Result<()> {
        let id = self.dimm_id(dimm)?;
        let args = ["set", "-dimm", id, "DirtyShutdown=1"];
        let out = self.runner.run("ipmctl", &args)?;

        if !out.success() {
            return Err(Error::ToolInvocationFailed {
                command: display_command("ipmctl", &args),
                code: out.code.unwrap_or(-1),
                output: out.merged(),
            });
        }

        Ok(())
    }
}

/// Extracts the counter from the sensor table.
///
/// The relevant row looks like:
///
/// ```text
/// 0x0101 | LatchedDirtyShutdownCount   | 4           | Normal
/// ```
///
/// and the count is the third pipe-delimited column.
fn parse_usc_row(out: &str) -> Option<u64> {
    let row = out.lines().find(|line| line.contains(USC_ROW_TITLE))?;
    row.split('|').nth(2)?.trim().parse().ok()
}
