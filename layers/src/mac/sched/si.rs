//! SIB1 / SI-message scheduling: each message has its own periodic
//! broadcast window; the cell retransmits it opportunistically (subject to
//! PDSCH/PDCCH space) until either it is sent `MAX_SIB_TX` times or the
//! window closes.

use tracing::{debug, warn};

use super::bwp_cfg::BwpParams;
use super::grid::{find_optimal_dl_grant, BwpResGrid, SiGrant};
use super::pdcch::BwpPdcchAllocator;
use super::sch::make_pdsch_grant;
use super::slot::SlotPoint;
use super::types::{DciFormat, RntiType, FIXED_SIGNALLING_AGGR_LEVEL};

/// Maximum number of times a single SI-window occurrence is retransmitted
/// (spec §9 supplement B.7 / original `si_sched::MAX_SIB_TX`).
pub const MAX_SIB_TX: u32 = 8;
/// Initial PRB search width tried for an SI PDSCH grant before the greedy
/// widener takes over.
const SI_SEARCH_START_PRB: u32 = 8;
const SI_MCS: u8 = 2;
/// SIB1/SI broadcasts always use the common search space tied to CORESET#0.
const SI_SEARCH_SPACE_ID: u32 = 0;

/// Static configuration of one SI message's periodic broadcast window.
#[derive(Debug, Clone, Copy)]
pub struct SiMessageCfg {
    pub si_idx: u32,
    pub period_frames: u32,
    pub window_start_slot: u32,
    pub window_length_slots: u32,
    pub payload_bytes: u32,
}

struct SiWindowState {
    cfg: SiMessageCfg,
    last_window_sfn: Option<u32>,
    tx_count: u32,
}

/// Per-cell SI scheduler.
pub struct SiSched {
    messages: Vec<SiWindowState>,
}

impl SiSched {
    pub fn new(messages: Vec<SiMessageCfg>) -> Self {
        Self { messages: messages.into_iter().map(|cfg| SiWindowState { cfg, last_window_sfn: None, tx_count: 0 }).collect() }
    }

    /// SIB1 (`si_idx == 0`) always broadcasts on the fixed two-frame SFN
    /// cycle (`slot_idx()==0 ∧ sfn()%2==0`), independent of its configured
    /// `period_frames` — every other SI message uses that field directly.
    fn window_id(cfg: &SiMessageCfg, slot: SlotPoint) -> Option<u32> {
        let period_frames = if cfg.si_idx == 0 { 2 } else { cfg.period_frames };
        if period_frames == 0 {
            return None;
        }
        let window_sfn = (slot.sfn() / period_frames) * period_frames;
        let frame_offset = slot.sfn() % period_frames;
        let slots_per_frame = SlotPoint::slots_per_frame(slot.numerology());
        let abs_slot_in_cycle = frame_offset * slots_per_frame + slot.slot_idx();
        if abs_slot_in_cycle >= cfg.window_start_slot && abs_slot_in_cycle < cfg.window_start_slot + cfg.window_length_slots {
            Some(window_sfn)
        } else {
            None
        }
    }

    /// Try to schedule one PDSCH transmission per configured SI message that
    /// currently has an open window and remaining retransmission budget.
    pub fn run_slot(&mut self, params: &BwpParams, pdcch: &mut BwpPdcchAllocator, grid: &mut BwpResGrid, slot: SlotPoint) {
        let Some(locs) = params.common_cce_locs(SI_SEARCH_SPACE_ID) else {
            return;
        };
        let coreset_id = params.get_ss(SI_SEARCH_SPACE_ID).map(|s| s.coreset_id).unwrap_or(0);

        for state in self.messages.iter_mut() {
            let Some(window_sfn) = Self::window_id(&state.cfg, slot) else {
                if state.last_window_sfn.is_some() {
                    debug!(si_idx = state.cfg.si_idx, "SI window closed");
                    state.last_window_sfn = None;
                    state.tx_count = 0;
                }
                continue;
            };
            if state.last_window_sfn != Some(window_sfn) {
                state.last_window_sfn = Some(window_sfn);
                state.tx_count = 0;
            }
            if state.tx_count >= MAX_SIB_TX {
                continue;
            }

            let slot_idx = slot.slot_idx() as usize;
            let dci = match pdcch.alloc_dci_fixed_level(
                params,
                SI_SEARCH_SPACE_ID,
                coreset_id,
                RntiType::Si,
                DciFormat::Dl10,
                slot_idx,
                locs,
                FIXED_SIGNALLING_AGGR_LEVEL,
            ) {
                Ok(d) => d,
                Err(_) => continue,
            };

            let used = grid.dl_used_mask(slot);
            let prb_lims = params.dci_fmt_1_0_prb_lims(coreset_id);
            let interval = find_optimal_dl_grant(used, prb_lims.stop(), prb_lims.start(), SI_MCS, state.cfg.payload_bytes, SI_SEARCH_START_PRB.max(1));
            let Some(interval) = interval else {
                pdcch.free_dci(&dci);
                continue;
            };
            let Ok(grant) = make_pdsch_grant(interval, SI_MCS) else {
                pdcch.free_dci(&dci);
                continue;
            };

            let res = grid.alloc_si(slot, SiGrant { grant, dci, si_idx: state.cfg.si_idx });
            if res.is_ok() {
                state.tx_count += 1;
            } else {
                pdcch.free_dci(&dci);
                warn!(si_idx = state.cfg.si_idx, "SI grant collided with prior allocation this slot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::sched::bwp_cfg::{BwpCfg, BwpParams, CoresetCfg, PuschTimeAllocRow, SearchSpaceCfg};
    use crate::mac::sched::types::SearchSpaceType;

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
    fn sib1_is_scheduled_inside_its_window() {
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        // period_frames is deliberately a realistic 160 ms value: SIB1's
        // window must ignore it and still open on the two-frame cycle.
        let mut si = SiSched::new(vec![SiMessageCfg { si_idx: 0, period_frames: 160, window_start_slot: 0, window_length_slots: 5, payload_bytes: 200 }]);
        let slot = SlotPoint::new(0, 0, 1);
        si.run_slot(&p, &mut pdcch, &mut grid, slot);
        assert_eq!(grid.result(slot).si.len(), 1);
    }

    #[test]
    fn sib1_window_ignores_configured_period_frames() {
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        let mut si = SiSched::new(vec![SiMessageCfg { si_idx: 0, period_frames: 160, window_start_slot: 0, window_length_slots: 1, payload_bytes: 200 }]);
        // SFN=1 is odd: no window. SFN=2, slot 0 is the next SIB1 window —
        // under the old (buggy) generic-period formula the next window
        // would not have opened until SFN=160.
        let odd_sfn = SlotPoint::new(0, 1, 0);
        si.run_slot(&p, &mut pdcch, &mut grid, odd_sfn);
        assert!(grid.result(odd_sfn).si.is_empty());

        let next_even_sfn = SlotPoint::new(0, 2, 0);
        si.run_slot(&p, &mut pdcch, &mut grid, next_even_sfn);
        assert_eq!(grid.result(next_even_sfn).si.len(), 1);
    }

    #[test]
    fn outside_window_nothing_is_scheduled() {
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        let mut si = SiSched::new(vec![SiMessageCfg { si_idx: 0, period_frames: 2, window_start_slot: 0, window_length_slots: 2, payload_bytes: 200 }]);
        let slot = SlotPoint::new(0, 0, 5);
        si.run_slot(&p, &mut pdcch, &mut grid, slot);
        assert!(grid.result(slot).si.is_empty());
    }

    #[test]
    fn retransmission_budget_is_capped_per_window() {
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        let mut si = SiSched::new(vec![SiMessageCfg { si_idx: 0, period_frames: 1, window_start_slot: 0, window_length_slots: 10, payload_bytes: 200 }]);
        for s in 0..(MAX_SIB_TX + 2) {
            let slot = SlotPoint::new(0, 0, s);
            si.run_slot(&p, &mut pdcch, &mut grid, slot);
        }
        assert_eq!(si.messages[0].tx_count, MAX_SIB_TX);
    }
}
