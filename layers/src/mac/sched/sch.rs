//! PDSCH/PUSCH grant construction: PRB-width-to-TBS lookup (a simplified,
//! monotonic stand-in for the real MCS/TBS tables, sufficient for the
//! allocator's own invariants) and the grant validity checks shared by both
//! directions.

use super::error::AllocResult;
use super::rb::PrbInterval;

/// Minimum UL grant size enforced for any PUSCH transmission that isn't pure
/// Msg3 (TS 38.214 §6.1.4 does not hard-floor this, but an allocator handing
/// out sub-1-PRB grants wastes more control overhead than it saves).
pub const MIN_UL_GRANT_PRBS: u32 = 1;

/// crude TBS estimate: bits-per-PRB-per-symbol scaled by MCS index, 14
/// symbols, minus CRC/overhead approximated as a flat 10%. Not a
/// spec-accurate TBS table — the core's own tests only need TBS to be
/// monotonic in (mcs, nof_prb) and stable across repeated calls.
pub fn estimate_tbs(mcs: u8, nof_prb: u32) -> u32 {
    let se_x100 = 30 + (mcs as u32) * 45; // spectral efficiency proxy, hundredths of bit/RE
    let bits = se_x100 * nof_prb * 12 * 14 / 100;
    (bits * 9 / 10) / 8
}

/// Coderate check: reject grants whose PRB count can't plausibly carry the
/// MCS at the requested TBS (protects against the DCI signalling an
/// unachievable code rate).
pub fn coderate_is_acceptable(mcs: u8, nof_prb: u32, requested_tbs: u32) -> bool {
    if nof_prb == 0 {
        return requested_tbs == 0;
    }
    let max_tbs = estimate_tbs(mcs, nof_prb);
    requested_tbs <= max_tbs.saturating_add(max_tbs / 20)
}

/// A fully-specified PDSCH grant, prior to being placed into the slot's
/// result list.
#[derive(Debug, Clone, Copy)]
pub struct PdschGrant {
    pub prbs: PrbInterval,
    pub mcs: u8,
    pub tbs: u32,
}

/// A fully-specified PUSCH grant.
#[derive(Debug, Clone, Copy)]
pub struct PuschGrant {
    pub prbs: PrbInterval,
    pub mcs: u8,
    pub tbs: u32,
}

/// Build a PDSCH grant for `nof_prb` PRBs at `mcs`, validating the coderate.
pub fn make_pdsch_grant(prbs: PrbInterval, mcs: u8) -> Result<PdschGrant, AllocResult> {
    if prbs.is_empty() {
        return Err(AllocResult::InvalidGrantParams);
    }
    let tbs = estimate_tbs(mcs, prbs.length());
    if !coderate_is_acceptable(mcs, prbs.length(), tbs) {
        return Err(AllocResult::InvalidCoderate);
    }
    Ok(PdschGrant { prbs, mcs, tbs })
}

/// Build a PUSCH grant, enforcing the minimum UL grant width.
pub fn make_pusch_grant(prbs: PrbInterval, mcs: u8) -> Result<PuschGrant, AllocResult> {
    if prbs.length() < MIN_UL_GRANT_PRBS {
        return Err(AllocResult::InvalidGrantParams);
    }
    let tbs = estimate_tbs(mcs, prbs.length());
    if !coderate_is_acceptable(mcs, prbs.length(), tbs) {
        return Err(AllocResult::InvalidCoderate);
    }
    Ok(PuschGrant { prbs, mcs, tbs })
}

/// Fixed Msg3 grant shape (spec §9 supplement B.5): 3 PRBs, MCS 0, up to 4
/// retransmissions, independent of the cell's normal MCS selection policy.
pub const MSG3_NOF_PRB: u32 = 3;
pub const MSG3_MCS: u8 = 0;
pub const MSG3_MAX_RETX: u32 = 4;

pub fn make_msg3_grant(start_rb: u32) -> PuschGrant {
    let prbs = PrbInterval::new(start_rb, start_rb + MSG3_NOF_PRB);
    let tbs = estimate_tbs(MSG3_MCS, MSG3_NOF_PRB);
    PuschGrant { prbs, mcs: MSG3_MCS, tbs }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tbs_increases_with_mcs_and_prb() {
        let low = estimate_tbs(0, 10);
        let high = estimate_tbs(20, 10);
        assert!(high > low);
        let wide = estimate_tbs(0, 50);
        assert!(wide > low);
    }

    #[test]
    fn pdsch_grant_rejects_empty_interval() {
        let res = make_pdsch_grant(PrbInterval::new(5, 5), 10);
        assert_eq!(res.unwrap_err(), AllocResult::InvalidGrantParams);
    }

    #[test]
    fn pusch_grant_enforces_min_width() {
        let res = make_pusch_grant(PrbInterval::new(0, 0), 0);
        assert_eq!(res.unwrap_err(), AllocResult::InvalidGrantParams);
    }

    #[test]
    fn msg3_grant_has_fixed_shape() {
        let g = make_msg3_grant(10);
        assert_eq!(g.prbs.length(), MSG3_NOF_PRB);
        assert_eq!(g.mcs, MSG3_MCS);
    }

    #[test]
    fn coderate_rejects_absurd_tbs_for_narrow_grant() {
        assert!(!coderate_is_acceptable(0, 1, 1_000_000));
    }
}
