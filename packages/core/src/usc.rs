//! High-level unsafe shutdown workflow.
//!
//! [`UnsafeShutdown`] ties device resolution to a vendor tool: it resolves
//! the device backing a directory, asks the tool for the DIMMs behind it,
//! and reads or injects the unsafe shutdown counter on each of them. The
//! facade never inspects DIMM handles; they travel unmodified between the
//! tool's enumerate and read/inject operations.

use std::path::Path;

use crate::device::{self, Device};
use crate::error::Result;
use crate::executor::{CommandRunner, SystemRunner};
use crate::ipmctl::Ipmctl;
use crate::ndctl::NdctlUsc;
use crate::tool::{Dimm, UscTool};

/// Stateless facade over the unsafe shutdown tooling of the platform.
///
/// Every operation resolves its device and DIMM set from scratch; nothing
/// is cached between calls.
pub struct UnsafeShutdown {
    tool: Box<dyn UscTool>,
    runner: Box<dyn CommandRunner>,
}

impl UnsafeShutdown {
    /// Creates the facade with the platform-default tool: ipmctl on
    /// Windows, ndctl elsewhere.
    pub fn new() -> Result<Self> {
        let tool: Box<dyn UscTool> = if cfg!(target_os = "windows") {
            Box::new(Ipmctl::new()?)
        } else {
            Box::new(NdctlUsc::new()?)
        };
        Ok(Self::with_tool(tool))
    }

    /// Creates the facade around a caller-supplied tool.
    pub fn with_tool(tool: Box<dyn UscTool>) -> Self {
        Self {
            tool,
            runner: Box::new(SystemRunner),
        }
    }

    /// Replaces the command runner used for device resolution.
    pub fn with_runner(mut self, runner: Box<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Reads the unsafe shutdown count of the device backing `dir`.
    ///
    /// The result is the unweighted sum over all underlying DIMMs; a
    /// device with zero DIMMs sums to zero.
    pub fn read(&self, dir: &Path) -> Result<u64> {
        let dev = device::resolve(self.runner.as_ref(), dir)?;
        let dimms = self.dev_dimms(&dev)?;
        Ok(self.read_from_dimms(&dimms)?.into_iter().sum())
    }

    /// Injects an unsafe shutdown into every DIMM backing `dir`.
    pub fn inject(&self, dir: &Path) -> Result<()> {
        let dev = device::resolve(self.runner.as_ref(), dir)?;
        let dimms = self.dev_dimms(&dev)?;
        self.inject_to_dimms(&dimms)
    }

    /// DIMMs underlying a resolved device, in the tool's enumeration order.
    pub fn dev_dimms(&self, dev: &Device) -> Result<Vec<Dimm>> {
        self.tool.dev_dimms(dev)
    }

    /// Per-DIMM unsafe shutdown counts, in DIMM order.
    pub fn read_from_dimms(&self, dimms: &[Dimm]) -> Result<Vec<u64>> {
        dimms.iter().map(|dimm| self.tool.read_usc(dimm)).collect()
    }

    /// Injects into the given DIMMs in order, stopping at the first
    /// failure. The returned error identifies the failing DIMM; DIMMs
    /// injected before it stay injected, since the hardware operation
    /// cannot be rolled back.
    pub fn inject_to_dimms(&self, dimms: &[Dimm]) -> Result<()> {
        for dimm in dimms {
            self.tool.inject_usc(dimm)?;
        }
        Ok(())
    }
}
