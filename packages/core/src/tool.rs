//! Vendor tool abstraction for unsafe shutdown handling.
//!
//! A [`UscTool`] knows how to enumerate the DIMMs behind a device and how
//! to read or inject the unsafe shutdown counter on a single DIMM. Two
//! implementations exist: [`crate::ipmctl::Ipmctl`] (Windows) and
//! [`crate::ndctl::NdctlUsc`] (Linux).

use std::fmt;

use serde_json::Value;

use crate::device::Device;
use crate::error::Result;

/// Handle to one physical persistent-memory module.
///
/// The concrete shape is determined entirely by the tool that produced the
/// handle, and only that tool may interpret it: callers pass handles back
/// unmodified to the same tool's read/inject operations. A handle is valid
/// only within the lifetime of the tool instance that issued it.
#[derive(Debug, Clone, PartialEq)]
pub enum Dimm {
    /// Hex-prefixed DIMM id as understood by ipmctl, e.g. `0x0021`.
    Id(String),
    /// Region mapping record as emitted by `ndctl list`, kept verbatim.
    Mapping(Value),
}

impl fmt::Display for Dimm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimm::Id(id) => f.write_str(id),
            Dimm::Mapping(mapping) => write!(f, "{mapping}"),
        }
    }
}

/// Tool capable of reading and injecting the unsafe shutdown counter.
///
/// All three capabilities are required; the trait bound enforces the full
/// set at compile time, so a partial implementation can never reach
/// [`crate::usc::UnsafeShutdown`].
pub trait UscTool {
    /// Enumerates the DIMMs backing `dev`.
    ///
    /// Every returned handle is a valid argument to [`UscTool::read_usc`]
    /// and [`UscTool::inject_usc`] on the same tool instance — the
    /// returned set is exactly the set those operations will act on.
    fn dev_dimms(&self, dev: &Device) -> Result<Vec<Dimm>>;

    /// Reads the unsafe shutdown count of one DIMM.
    fn read_usc(&self, dimm: &Dimm) -> Result<u64>;

    /// Injects an unsafe shutdown event into one DIMM.
    ///
    /// This physically increments the module's recorded counter; counts
    /// only ever increase and there is no compensating action.
    fn inject_usc(&self, dimm: &Dimm) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dimm_display() {
        assert_eq!(Dimm::Id("0x0021".to_string()).to_string(), "0x0021");
        assert_eq!(
            Dimm::Mapping(json!({"dimm": "nmem0", "position": 0})).to_string(),
            r#"{"dimm":"nmem0","position":0}"#
        );
    }
}
