//! Cell-wide DL signalling reservations: SSB and NZP-CSI-RS PRB/symbol
//! regions that must be carved out of the DL grid before any PDSCH
//! allocation runs in a slot.

use super::bwp_cfg::BwpParams;
use super::grid::BwpResGrid;
use super::rb::PrbInterval;
use super::slot::SlotPoint;

/// Default SSB periodicity in slots at 15kHz SCS (5ms), mirroring the
/// `sched_ssb_basic` default used when no SSB periodicity is configured
/// elsewhere in the system.
const SSB_PERIODICITY_SLOTS: u32 = 5;
/// PRBs reserved for the SSB placement; the burst itself is an opaque PHY
/// concern, so the core only needs the width it must avoid for PDSCH.
const SSB_NOF_PRB: u32 = 20;
/// PRBs reserved for the periodic NZP-CSI-RS resource, placed immediately
/// after the SSB region.
const CSI_RS_NOF_PRB: u32 = 4;
const CSI_RS_PERIODICITY_SLOTS: u32 = 10;

/// Static, per-cell signalling configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignallingCfg {
    pub ssb_enabled: bool,
    pub nzp_csi_rs_enabled: bool,
}

/// Reserve SSB and NZP-CSI-RS PRBs for `slot` in `grid`, if either is due
/// this slot. Must run before any PDSCH candidate search so those
/// allocators see the reservation in the occupancy mask.
pub fn sched_dl_signalling(cfg: &SignallingCfg, params: &BwpParams, grid: &mut BwpResGrid, slot: SlotPoint) {
    if cfg.ssb_enabled && slot.to_uint() % SSB_PERIODICITY_SLOTS == 0 {
        let width = SSB_NOF_PRB.min(params.nof_prb);
        grid.reserve_dl_interval(slot, PrbInterval::new(0, width));
    }
    if cfg.nzp_csi_rs_enabled && slot.to_uint() % CSI_RS_PERIODICITY_SLOTS == 0 {
        let start = SSB_NOF_PRB.min(params.nof_prb.saturating_sub(CSI_RS_NOF_PRB));
        let stop = (start + CSI_RS_NOF_PRB).min(params.nof_prb);
        grid.reserve_dl_interval(slot, PrbInterval::new(start, stop));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::sched::bwp_cfg::{BwpCfg, BwpParams, CoresetCfg, PuschTimeAllocRow, SearchSpaceCfg};
    use crate::mac::sched::types::{DciFormat, SearchSpaceType};

    fn params() -> BwpParams {
        BwpParams::derive(BwpCfg {
            bwp_id: 0,
            start_rb: 0,
            rb_width: 100,
            numerology_idx: 0,
            rbg_size_cfg1: true,
            rar_window_size: 10,
            coresets: vec![CoresetCfg { id: 0, start_rb: 0, length_rb: 48, duration_symbols: 1 }],
            search_spaces: vec![SearchSpaceCfg {
                id: 0,
                coreset_id: 0,
                ss_type: SearchSpaceType::Common0,
                nof_candidates: [0, 4, 2, 1, 0],
                formats: vec![DciFormat::Dl10],
            }],
            ra_search_space_id: 0,
            pusch_time_alloc: vec![PuschTimeAllocRow { msg3_delay: 6, k: 4, s: 0, l: 14 }],
            nof_slots_per_frame_override: 1,
        })
    }

    #[test]
    fn ssb_is_reserved_on_periodic_slots_only() {
        let p = params();
        let mut grid = BwpResGrid::new(&p);
        let cfg = SignallingCfg { ssb_enabled: true, nzp_csi_rs_enabled: false };
        let ssb_slot = SlotPoint::new(0, 0, 0);
        sched_dl_signalling(&cfg, &p, &mut grid, ssb_slot);
        assert_ne!(grid.dl_used_mask(ssb_slot), 0);

        let other_slot = SlotPoint::new(0, 0, 1);
        sched_dl_signalling(&cfg, &p, &mut grid, other_slot);
        assert_eq!(grid.dl_used_mask(other_slot), 0);
    }

    #[test]
    fn csi_rs_region_follows_ssb_region() {
        let p = params();
        let mut grid = BwpResGrid::new(&p);
        let cfg = SignallingCfg { ssb_enabled: false, nzp_csi_rs_enabled: true };
        let slot = SlotPoint::new(0, 0, 0);
        sched_dl_signalling(&cfg, &p, &mut grid, slot);
        let mask = grid.dl_used_mask(slot);
        assert_ne!(mask & (1u128 << SSB_NOF_PRB), 0);
    }
}
