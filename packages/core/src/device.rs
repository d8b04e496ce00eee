//! Device resolution module.
//!
//! Maps a filesystem directory to the device backing it: the block device
//! path on Linux (via the mount table) or the physical disk number owning
//! the volume on Windows (via PowerShell). Resolution is performed fresh
//! on every call and never cached — the backing device can change between
//! invocations.

use std::fmt;
use std::path::{Component, Path, PathBuf, Prefix};

use crate::error::{Error, Result};
use crate::executor::{CommandRunner, display_command};

/// Platform-native identifier of the device backing a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    /// Block device path, e.g. `/dev/pmem0`.
    Path(PathBuf),
    /// Number of the physical disk owning the volume.
    DiskNumber(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Path(path) => write!(f, "{}", path.display()),
            Device::DiskNumber(number) => write!(f, "disk {number}"),
        }
    }
}

/// Resolves the device backing `dir`.
///
/// Fails with [`Error::PathNotFound`] before any external command is
/// issued when `dir` is not an existing directory. Resolution failures
/// are never retried; the mount table does not change on retry.
pub fn resolve(runner: &dyn CommandRunner, dir: &Path) -> Result<Device> {
    if !dir.is_dir() {
        return Err(Error::PathNotFound {
            path: dir.to_path_buf(),
        });
    }

    if cfg!(target_os = "windows") {
        resolve_windows(runner, dir)
    } else {
        resolve_linux(runner, dir)
    }
}

/// Resolves via the mount table: `df <dir>` reports the backing device
/// as the first token of its second output line.
fn resolve_linux(runner: &dyn CommandRunner, dir: &Path) -> Result<Device> {
    let dir_arg = dir.to_string_lossy();
    let args = [dir_arg.as_ref()];
    let out = runner.run("df", &args)?;
    let command = display_command("df", &args);

    if !out.success() {
        return Err(Error::ToolInvocationFailed {
            command,
            code: out.code.unwrap_or(-1),
            output: out.merged(),
        });
    }

    let device = parse_df_device(&out.stdout).ok_or_else(|| Error::UnparsableToolOutput {
        command,
        output: out.stdout.clone(),
    })?;

    let path = PathBuf::from(device);
    if !path.exists() {
        return Err(Error::DeviceNotFound {
            message: format!(
                "'{}' reported for '{}' is not an existing file",
                path.display(),
                dir.display()
            ),
        });
    }

    Ok(Device::Path(path))
}

/// Extracts the device from `df` output.
///
/// Correct output looks like:
///
/// ```text
/// Filesystem      1K-blocks  Used Available Use% Mounted on
/// /dev/pmem0     1019003852 77856 967093676   1% /mnt/pmem0
/// ```
///
/// The first line is a header; the device is the first whitespace-delimited
/// token of the second line.
fn parse_df_device(out: &str) -> Option<&str> {
    out.lines().nth(1)?.split_whitespace().next()
}

/// Resolves via PowerShell: queries the number of the physical disk
/// owning the directory's drive letter.
fn resolve_windows(runner: &dyn CommandRunner, dir: &Path) -> Result<Device> {
    let drive = drive_letter(dir)?;
    disk_number_for_drive(runner, drive)
}

/// Drive letter of an absolute Windows path.
fn drive_letter(dir: &Path) -> Result<char> {
    let prefix = match dir.components().next() {
        Some(Component::Prefix(prefix)) => prefix,
        _ => {
            return Err(Error::DeviceNotFound {
                message: format!("'{}' has no drive letter", dir.display()),
            });
        }
    };

    match prefix.kind() {
        Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => Ok(letter as char),
        _ => Err(Error::DeviceNotFound {
            message: format!("'{}' has no drive letter", dir.display()),
        }),
    }
}

fn disk_number_for_drive(runner: &dyn CommandRunner, drive: char) -> Result<Device> {
    let query = format!("(Get-Partition -DriveLetter (Get-Item {drive}:\\).PSDrive.Name).DiskNumber");
    let args = ["-NoProfile", "-Command", query.as_str()];
    let out = runner.run("powershell", &args)?;

    if !out.success() {
        return Err(Error::DeviceNotFound {
            message: format!("no disk number found for drive {drive}: {}", out.merged()),
        });
    }

    let number = out
        .stdout
        .trim()
        .parse::<u32>()
        .map_err(|_| Error::UnparsableToolOutput {
            command: display_command("powershell", &args),
            output: out.stdout.clone(),
        })?;

    Ok(Device::DiskNumber(number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::ScriptedRunner;

    const DF_OUTPUT: &str = "Filesystem      1K-blocks  Used Available Use% Mounted on\n\
                             /dev/pmem0     1019003852 77856 967093676   1% /mnt/pmem0\n";

    #[test]
    fn test_parse_df_device() {
        assert_eq!(parse_df_device(DF_OUTPUT), Some("/dev/pmem0"));
    }

    #[test]
    fn test_parse_df_device_header_only() {
        assert_eq!(
            parse_df_device("Filesystem      1K-blocks  Used Available Use% Mounted on\n"),
            None
        );
        assert_eq!(parse_df_device(""), None);
    }

    #[test]
    fn test_resolve_missing_directory_runs_no_commands() {
        let runner = ScriptedRunner::new();
        let err = resolve(&runner, Path::new("/no/such/directory")).unwrap_err();
        assert!(matches!(err, Error::PathNotFound { .. }));
        assert!(runner.calls().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_returns_existing_device() {
        let dir = tempfile::tempdir().unwrap();
        let out = format!(
            "Filesystem 1K-blocks Used Available Use% Mounted on\n/dev/null 100 1 99 1% {}\n",
            dir.path().display()
        );
        let runner = ScriptedRunner::new().expect_ok(&out);

        let device = resolve(&runner, dir.path()).unwrap();
        assert_eq!(device, Device::Path(PathBuf::from("/dev/null")));
        assert_eq!(runner.calls().len(), 1);
        assert!(runner.calls()[0].starts_with("df "));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_nonexistent_device() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().expect_ok(DF_OUTPUT);

        let err = resolve(&runner, dir.path()).unwrap_err();
        match err {
            Error::DeviceNotFound { message } => assert!(message.contains("/dev/pmem0")),
            other => panic!("expected DeviceNotFound, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_unparsable_mount_table() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().expect_ok("Filesystem only header\n");

        let err = resolve(&runner, dir.path()).unwrap_err();
        assert!(matches!(err, Error::UnparsableToolOutput { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_mount_query_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().expect_fail(1, "df: cannot stat");

        let err = resolve(&runner, dir.path()).unwrap_err();
        match err {
            Error::ToolInvocationFailed { code, output, .. } => {
                assert_eq!(code, 1);
                assert!(output.contains("cannot stat"));
            }
            other => panic!("expected ToolInvocationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_disk_number_for_drive() {
        let runner = ScriptedRunner::new().expect_ok("2\r\n");
        let device = disk_number_for_drive(&runner, 'D').unwrap();
        assert_eq!(device, Device::DiskNumber(2));

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("Get-Partition -DriveLetter (Get-Item D:\\)"));
    }

    #[test]
    fn test_disk_number_query_failure() {
        let runner = ScriptedRunner::new().expect_fail(1, "Get-Partition : not found");
        let err = disk_number_for_drive(&runner, 'C').unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound { .. }));
    }

    #[test]
    fn test_disk_number_not_an_integer() {
        let runner = ScriptedRunner::new().expect_ok("DiskNumber\n----------\n");
        let err = disk_number_for_drive(&runner, 'C').unwrap_err();
        assert!(matches!(err, Error::UnparsableToolOutput { .. }));
    }

    #[cfg(windows)]
    #[test]
    fn test_drive_letter() {
        assert_eq!(drive_letter(Path::new(r"C:\mnt\pmem")).unwrap(), 'C');
        assert!(drive_letter(Path::new(r"\\server\share")).is_err());
    }

    #[test]
    fn test_device_display() {
        assert_eq!(Device::Path(PathBuf::from("/dev/pmem0")).to_string(), "/dev/pmem0");
        assert_eq!(Device::DiskNumber(3).to_string(), "disk 3");
    }
}
