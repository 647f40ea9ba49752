//! Allocation outcome codes shared by every PDCCH/PDSCH/PUSCH allocator call.

use thiserror::Error;

/// Outcome of a single grant-allocation attempt.
///
/// This is a closed set: every allocator entry point in `sched` returns
/// `Result<(), AllocResult>` (or a richer success payload alongside it), and
/// callers are expected to roll back any peer state on a non-success code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocResult {
    #[error("no space left in PDCCH (CCE DFS exhausted)")]
    NoCchSpace,

    #[error("no space left in the SCH result list, or wrong slot direction")]
    NoSchSpace,

    #[error("PRB/RBG grant collides with a prior allocation")]
    SchCollision,

    #[error("grant TBS/PRB combination yields an unacceptable coderate")]
    InvalidCoderate,

    #[error("invalid or mismatched grant parameters")]
    InvalidGrantParams,

    #[error("RNTI not live on this BWP/cell yet")]
    NoRntiOpportunity,

    #[error("uplink control resource capacity exceeded")]
    NoGrantSpace,

    #[error("PHY collaborator rejected the grant")]
    OtherCause,
}

pub type AllocOutcome = Result<(), AllocResult>;

/// Errors surfaced by configuration-time entry points (`config`, `ue_cfg`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedConfigError {
    #[error("cell {cc} has no bandwidth parts configured")]
    NoBwpConfigured { cc: usize },

    #[error("bandwidth part has no RA search space configured")]
    MissingRaSearchSpace,

    #[error("user rnti=0x{rnti:x} configuration has no coreset configured")]
    NoCoresetConfigured { rnti: u16 },

    #[error("user rnti=0x{rnti:x} references unknown cell cc={cc}")]
    UnknownCell { rnti: u16, cc: usize },

    #[error("no time-domain resource allocation rows configured for PUSCH")]
    EmptyPuschTimeAllocTable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_result_display_is_stable() {
        assert_eq!(AllocResult::NoCchSpace.to_string(), "no space left in PDCCH (CCE DFS exhausted)");
    }

    #[test]
    fn alloc_result_is_copy() {
        let a = AllocResult::SchCollision;
        let b = a;
        assert_eq!(a, b);
    }
}
