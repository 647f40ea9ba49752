//! Small closed enumerations shared by the PDCCH/PDSCH/PUSCH allocators.

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

/// RNTI scoping of a DCI: which kind of user/procedure it addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum RntiType {
    /// Cell RNTI — a configured UE in its dedicated search space.
    C,
    /// Temporary C-RNTI — a UE between Msg3 and contention resolution.
    Tc,
    /// Random-access RNTI — addresses an RAR.
    Ra,
    /// System-information RNTI — addresses SIB1/SI messages.
    Si,
    /// MCS-C-RNTI (not modeled beyond acceptance in search-space checks).
    MscC,
    /// Semi-persistent CSI RNTI.
    SpCsi,
    /// Paging RNTI.
    P,
}

/// Search-space type, mirroring the common/UE-dedicated split of TS 38.213 §10.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchSpaceType {
    Common0,
    Common1,
    Common2,
    Common3,
    Ue,
}

impl SearchSpaceType {
    /// TS 38.213 §10.1 RNTI-type compatibility table.
    pub fn accepts(&self, rnti_type: RntiType) -> bool {
        use RntiType::*;
        match self {
            SearchSpaceType::Common0 => matches!(rnti_type, Si),
            SearchSpaceType::Common1 => matches!(rnti_type, Ra | Tc | C),
            SearchSpaceType::Common2 => matches!(rnti_type, P),
            SearchSpaceType::Common3 => matches!(rnti_type, C | MscC),
            SearchSpaceType::Ue => matches!(rnti_type, C | MscC | SpCsi),
        }
    }

    pub fn is_common(&self) -> bool {
        !matches!(self, SearchSpaceType::Ue)
    }
}

/// Downlink/uplink control information formats the core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DciFormat {
    Dl10,
    Dl11,
    Ul00,
    Ul01,
}

impl DciFormat {
    pub fn is_dl(&self) -> bool {
        matches!(self, DciFormat::Dl10 | DciFormat::Dl11)
    }
}

/// Valid PDCCH aggregation levels.
pub const AGGREGATION_LEVELS: [u32; 5] = [1, 2, 4, 8, 16];
pub const MAX_NOF_AGGR_LEVELS: usize = AGGREGATION_LEVELS.len();

/// Aggregation level fixed for RAR/SI DCI (spec §6, §9 supplement B.7/B.8).
pub const FIXED_SIGNALLING_AGGR_LEVEL: u32 = 2;
/// Aggregation level fixed for UE-dedicated data DCI (supplement B.8).
pub const FIXED_UE_DATA_AGGR_LEVEL: u32 = 2;

pub fn aggr_level_index(l: u32) -> Option<usize> {
    AGGREGATION_LEVELS.iter().position(|&x| x == l)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common1_accepts_ra_tc_c_only() {
        assert!(SearchSpaceType::Common1.accepts(RntiType::Ra));
        assert!(SearchSpaceType::Common1.accepts(RntiType::Tc));
        assert!(SearchSpaceType::Common1.accepts(RntiType::C));
        assert!(!SearchSpaceType::Common1.accepts(RntiType::Si));
    }

    #[test]
    fn common0_is_si_only() {
        assert!(SearchSpaceType::Common0.accepts(RntiType::Si));
        assert!(!SearchSpaceType::Common0.accepts(RntiType::C));
    }

    #[test]
    fn aggr_level_index_rejects_invalid() {
        assert_eq!(aggr_level_index(3), None);
        assert_eq!(aggr_level_index(8), Some(3));
    }
}
