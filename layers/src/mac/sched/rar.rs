//! Random-access response scheduling: a FIFO of pending preamble detections,
//! each given a response window in which the cell must carry an RAR (and its
//! accompanying Msg3 UL grant) or drop it.

use std::collections::VecDeque;
use tracing::warn;

use super::bwp_cfg::BwpParams;
use super::grid::{find_optimal_dl_grant, BwpResGrid, RarGrant, RarMsg3Grant};
use super::pdcch::BwpPdcchAllocator;
use super::rb::find_empty_interval_of_length;
use super::sch::{make_msg3_grant, make_pdsch_grant, MSG3_NOF_PRB};
use super::slot::SlotPoint;
use super::types::{DciFormat, RntiType, FIXED_SIGNALLING_AGGR_LEVEL};

/// Per-grant RAR payload contribution; the PDSCH carrying a RAR grows with
/// the number of Msg3 grants it multiplexes.
const RAR_PAYLOAD_BYTES_PER_GRANT: u32 = 8;
const RAR_MCS: u8 = 0;
/// Upper bound on how many preambles sharing one `{prach_slot, ra-rnti}` are
/// merged into a single pending RAR record (TS 38.321 RAR PDU grant list).
const MAX_RAR_GRANTS: usize = 8;

/// One detected preamble awaiting a response.
#[derive(Debug, Clone, Copy)]
pub struct RachIndication {
    pub preamble_idx: u32,
    pub ta: u32,
    pub temp_crnti: u16,
    pub slot_rx: SlotPoint,
    pub ofdm_symbol_idx: u32,
    pub freq_idx: u32,
}

/// TS 38.321 §5.1.3 RA-RNTI: `1 + ofdm_symbol_idx + 14·slot_idx + 14·80·freq_idx`.
pub fn compute_ra_rnti(ofdm_symbol_idx: u32, slot_idx: u32, freq_idx: u32) -> u16 {
    (1u32.wrapping_add(ofdm_symbol_idx).wrapping_add(14 * slot_idx).wrapping_add(14 * 80 * freq_idx)) as u16
}

/// Every preamble sharing the same `{prach_slot, ra-rnti}` is merged into one
/// pending record and answered with a single RAR PDSCH carrying one Msg3
/// grant per preamble (TS 38.321 §5.1.3).
struct PendingRarGroup {
    ra_rnti: u16,
    prach_slot: SlotPoint,
    preambles: Vec<RachIndication>,
    expiry_slot: SlotPoint,
}

impl PendingRarGroup {
    fn is_full(&self) -> bool {
        self.preambles.len() >= MAX_RAR_GRANTS
    }
}

/// Per-cell random-access scheduler.
pub struct RaSched {
    pending: VecDeque<PendingRarGroup>,
    window_size: u32,
}

impl RaSched {
    pub fn new(window_size: u32) -> Self {
        Self { pending: VecDeque::new(), window_size }
    }

    /// Register a newly detected preamble; it must be served before
    /// `slot_rx + window_size` or it is dropped. Preambles sharing the same
    /// `{prach_slot, ra-rnti}` as an already-pending record are merged into
    /// it (up to `MAX_RAR_GRANTS`) rather than queued separately.
    pub fn dl_rach_info(&mut self, rach: RachIndication) {
        let ra_rnti = compute_ra_rnti(rach.ofdm_symbol_idx, rach.slot_rx.slot_idx(), rach.freq_idx);
        if let Some(group) = self.pending.iter_mut().find(|g| g.ra_rnti == ra_rnti && g.prach_slot == rach.slot_rx) {
            if group.is_full() {
                warn!(ra_rnti, "RAR grant list full, dropping preamble");
                return;
            }
            group.preambles.push(rach);
            return;
        }
        let expiry_slot = rach.slot_rx + self.window_size;
        self.pending.push_back(PendingRarGroup { ra_rnti, prach_slot: rach.slot_rx, preambles: vec![rach], expiry_slot });
    }

    pub fn nof_pending(&self) -> usize {
        self.pending.len()
    }

    /// Drop any pending RARs whose window has closed, logging each one.
    fn expire_stale(&mut self, current_slot: SlotPoint) {
        while let Some(front) = self.pending.front() {
            if current_slot > front.expiry_slot {
                warn!(ra_rnti = front.ra_rnti, "RAR window closed without allocation, dropping");
                self.pending.pop_front();
            } else {
                break;
            }
        }
    }

    /// Attempt to allocate the oldest pending RAR group (and its Msg3 UL
    /// grants, one per merged preamble) in the current slot. Serves at most
    /// one group per slot, matching the head-of-line FIFO discipline of the
    /// original allocator. If fewer Msg3 grants fit than preambles in the
    /// group, the ones that fit are served and the rest stay queued.
    pub fn run_slot(
        &mut self,
        params: &BwpParams,
        pdcch: &mut BwpPdcchAllocator,
        grid: &mut BwpResGrid,
        current_slot: SlotPoint,
    ) {
        self.expire_stale(current_slot);

        let Some(front) = self.pending.front() else {
            return;
        };
        let front_ra_rnti = front.ra_rnti;
        let preambles = front.preambles.clone();
        let slot_idx = current_slot.slot_idx() as usize;
        let ss_id = params.ra_search_space_id();
        let coreset_id = params.ra_coreset_id();
        let Some(locs) = params.common_cce_locs(ss_id) else {
            return;
        };

        let dci = match pdcch.alloc_dci_fixed_level(
            params,
            ss_id,
            coreset_id,
            RntiType::Ra,
            DciFormat::Dl10,
            slot_idx,
            locs,
            FIXED_SIGNALLING_AGGR_LEVEL,
        ) {
            Ok(d) => d,
            Err(_) => return,
        };

        let used = grid.dl_used_mask(current_slot);
        let dl_coreset_limits = params.dci_fmt_1_0_prb_lims(coreset_id);
        let payload_bytes = RAR_PAYLOAD_BYTES_PER_GRANT * preambles.len() as u32;
        let Some(interval) = find_optimal_dl_grant(used, dl_coreset_limits.stop(), dl_coreset_limits.start(), RAR_MCS, payload_bytes, 8) else {
            pdcch.free_dci(&dci);
            return;
        };
        let Ok(pdsch) = make_pdsch_grant(interval, RAR_MCS) else {
            pdcch.free_dci(&dci);
            return;
        };

        let msg3_delay = params.pusch_ra_list.first().map(|r| r.msg3_delay).unwrap_or(6);
        let mut ul_used = grid.ul_used_mask(current_slot + msg3_delay);
        let mut msg3_grants = Vec::with_capacity(preambles.len());
        for preamble in &preambles {
            let free = find_empty_interval_of_length(ul_used, params.nof_prb, MSG3_NOF_PRB, 0);
            if free.is_empty() {
                break;
            }
            let msg3_grant = make_msg3_grant(free.start());
            for rb in msg3_grant.prbs.start()..msg3_grant.prbs.stop() {
                ul_used |= 1u128 << rb;
            }
            msg3_grants.push(RarMsg3Grant { temp_crnti: preamble.temp_crnti, msg3_grant });
        }
        if msg3_grants.is_empty() {
            pdcch.free_dci(&dci);
            return;
        }
        let nof_served = msg3_grants.len();

        let rar = RarGrant { ra_rnti: front_ra_rnti, grant: pdsch, dci, grants: msg3_grants };
        if grid.alloc_rar(current_slot, rar).is_ok() {
            let front = self.pending.front_mut().expect("front checked above");
            front.preambles.drain(..nof_served);
            if front.preambles.is_empty() {
                self.pending.pop_front();
            }
        } else {
            pdcch.free_dci(&dci);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::sched::bwp_cfg::{BwpCfg, BwpParams, CoresetCfg, PuschTimeAllocRow, SearchSpaceCfg};
    use crate::mac::sched::pdcch::BwpPdcchAllocator;
    use crate::mac::sched::types::{DciFormat as Fmt, SearchSpaceType};

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
                id: 1,
                coreset_id: 0,
                ss_type: SearchSpaceType::Common1,
                nof_candidates: [0, 4, 2, 1, 0],
                formats: vec![Fmt::Dl10],
            }],
            ra_search_space_id: 1,
            pusch_time_alloc: vec![PuschTimeAllocRow { msg3_delay: 6, k: 4, s: 0, l: 14 }],
            nof_slots_per_frame_override: 1,
        })
    }

    fn rach(preamble_idx: u32, temp_crnti: u16, slot_rx: SlotPoint) -> RachIndication {
        RachIndication { preamble_idx, ta: 0, temp_crnti, slot_rx, ofdm_symbol_idx: 0, freq_idx: 0 }
    }

    #[test]
    fn pending_rar_is_allocated_within_window() {
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        let mut ra = RaSched::new(10);
        let slot = SlotPoint::new(0, 0, 0);
        ra.dl_rach_info(rach(3, 0x4601, slot));
        assert_eq!(ra.nof_pending(), 1);
        ra.run_slot(&p, &mut pdcch, &mut grid, slot);
        assert_eq!(ra.nof_pending(), 0);
        assert_eq!(grid.result(slot).rar.len(), 1);
        assert_eq!(grid.result(slot).rar[0].grants[0].temp_crnti, 0x4601);
    }

    #[test]
    fn stale_rar_past_window_is_dropped() {
        let mut ra = RaSched::new(5);
        let slot = SlotPoint::new(0, 0, 0);
        ra.dl_rach_info(rach(1, 0x4601, slot));
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        let later = slot + 100;
        ra.run_slot(&p, &mut pdcch, &mut grid, later);
        assert_eq!(ra.nof_pending(), 0);
        assert!(grid.result(later).rar.is_empty());
    }

    #[test]
    fn preambles_sharing_prach_slot_and_ra_rnti_merge_into_one_group() {
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        let mut ra = RaSched::new(10);
        let slot = SlotPoint::new(0, 0, 0);
        ra.dl_rach_info(rach(3, 0x4601, slot));
        ra.dl_rach_info(rach(7, 0x4602, slot));
        // Same {prach_slot, ra-rnti} (both depend only on slot/symbol/freq,
        // which are identical here), so this is one pending group, not two.
        assert_eq!(ra.nof_pending(), 1);
        ra.run_slot(&p, &mut pdcch, &mut grid, slot);
        assert_eq!(ra.nof_pending(), 0);
        let rar = &grid.result(slot).rar[0];
        assert_eq!(rar.grants.len(), 2);
        assert_eq!(rar.grants[0].temp_crnti, 0x4601);
        assert_eq!(rar.grants[1].temp_crnti, 0x4602);
    }
}
