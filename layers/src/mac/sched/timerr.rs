//! Round-robin DL/UL data scheduler: a retransmission pass (same grant
//! shape as the original transmission) followed by a new-transmission pass
//! that starts from `pdcch_slot.to_uint() mod N_ues` each slot so no single
//! user monopolizes the head of the round-robin order, without the
//! scheduler needing to remember where it left off.

use tracing::trace;

use super::bwp_cfg::{derive_cce_locations, BwpParams, SchedArgs};
use super::grid::BwpResGrid;
use super::harq::DciSnapshot;
use super::pdcch::{fixed_level_candidates, BatchDciRequest, BwpPdcchAllocator};
use super::rb::PrbInterval;
use super::sch::{make_pdsch_grant, make_pusch_grant};
use super::slot::SlotPoint;
use super::types::{SearchSpaceType, FIXED_UE_DATA_AGGR_LEVEL};
use super::ue::Ue;

const MAX_NEWTX_PRB: u32 = 20;
/// HARQ retransmission delay in slots (ack feedback round-trip).
const DEFAULT_ACK_DELAY: u32 = 4;
const DEFAULT_MAX_RETX: u32 = 4;
/// MCS floor enforced whenever CCCH is pending, so Msg4/RRC setup signalling
/// always gets a robust enough grant regardless of the reported CQI.
const CCCH_MIN_MCS: u8 = 4;
const MAX_MCS: u8 = 27;

fn ue_search_space(params: &BwpParams) -> Option<(u32, u32)> {
    params.cfg.search_spaces.iter().find(|s| matches!(s.ss_type, SearchSpaceType::Ue)).map(|s| (s.id, s.coreset_id))
}

/// 15-entry CQI table (TS 38.214 Table 5.2.2.1-2) collapsed to a monotonic
/// MCS pick; CQI 0 (no report yet) maps to the most robust MCS.
fn cqi_to_mcs(cqi: u8) -> u8 {
    ((cqi as u32 * MAX_MCS as u32) / 15).min(MAX_MCS as u32) as u8
}

/// `fixed_mcs` (if configured, `>= 0`) always wins; otherwise map the
/// reported CQI, then floor to [`CCCH_MIN_MCS`] whenever CCCH is pending so
/// Msg4/RRC signalling doesn't get starved by a UE with a poor CQI.
fn select_mcs(fixed_mcs: i32, cqi: u8, ccch_pending: bool) -> u8 {
    let mcs = if fixed_mcs >= 0 { fixed_mcs as u8 } else { cqi_to_mcs(cqi) };
    if ccch_pending {
        mcs.max(CCCH_MIN_MCS)
    } else {
        mcs
    }
}

/// Round-robin data scheduler. Holds no per-slot cursor: the starting UE is
/// derived fresh from the slot index each call.
#[derive(Default)]
pub struct TimeRrSched;

impl TimeRrSched {
    pub fn new() -> Self {
        Self::default()
    }

    /// DL retransmissions, then new transmissions, round-robin across `ues`.
    /// Every DCI this call needs — retx first, then new-tx in round-robin
    /// order — is requested through one [`BwpPdcchAllocator::alloc_dci_batch`]
    /// call so a later UE's exhausted candidate list can backtrack an
    /// earlier UE's placement instead of losing out to it permanently.
    pub fn sched_dl_users(&mut self, ues: &mut [Ue], params: &BwpParams, pdcch: &mut BwpPdcchAllocator, grid: &mut BwpResGrid, cc: usize, slot: SlotPoint, args: &SchedArgs) {
        let Some((ss_id, coreset_id)) = ue_search_space(params) else {
            return;
        };
        let ss = params.get_ss(ss_id).expect("ss_id resolved from params.cfg must exist");
        let coreset = params.coresets.iter().find(|c| c.cfg.id == coreset_id);
        let Some(coreset) = coreset else {
            return;
        };
        let nof_slots = SlotPoint::slots_per_frame(params.cfg.numerology_idx);
        let slot_idx = slot.slot_idx() as usize;
        let n = ues.len();

        let mut retx_idxs = Vec::new();
        let mut newtx_idxs = Vec::new();
        let mut reqs = Vec::new();

        for (i, ue) in ues.iter().enumerate() {
            let Some(carrier) = ue.carrier(cc) else { continue };
            if !carrier.active {
                continue;
            }
            if carrier.harq.find_pending_dl_retx(slot).is_some() {
                let locs = derive_cce_locations(coreset, ss, ue.rnti as u32, nof_slots);
                reqs.push(BatchDciRequest { coreset_id, ss_id, candidates: fixed_level_candidates(&locs, slot_idx, FIXED_UE_DATA_AGGR_LEVEL) });
                retx_idxs.push(i);
            }
        }
        if n > 0 && args.pdsch_enabled {
            let start = (slot.to_uint() as usize) % n;
            for offset in 0..n {
                let idx = (start + offset) % n;
                let Some(slot_ue) = ues[idx].make_slot_ue(cc, slot) else { continue };
                if !slot_ue.has_dl_newtx_data() {
                    continue;
                }
                let locs = derive_cce_locations(coreset, ss, ues[idx].rnti as u32, nof_slots);
                reqs.push(BatchDciRequest { coreset_id, ss_id, candidates: fixed_level_candidates(&locs, slot_idx, FIXED_UE_DATA_AGGR_LEVEL) });
                newtx_idxs.push(idx);
            }
        }
        let dcis = pdcch.alloc_dci_batch(&reqs);
        let mut dcis = dcis.into_iter();

        for idx in retx_idxs {
            let Some(Some(dci)) = dcis.next() else { continue };
            let rnti = ues[idx].rnti;
            let carrier = ues[idx].carrier_mut(cc).expect("checked active above");
            let pid = carrier.harq.find_pending_dl_retx(slot).expect("checked above");
            let process = carrier.harq.dl_harq(pid);
            let Some(prev_grant) = process.grant() else {
                pdcch.free_dci(&dci);
                continue;
            };
            let mcs = process.mcs();
            let interval = prev_grant.prbs();
            if grid.alloc_pdsch(params, slot, rnti, interval, mcs, dci, pid as u32, true).is_err() {
                pdcch.free_dci(&dci);
                continue;
            }
            let ack_slot = slot + DEFAULT_ACK_DELAY;
            let process = carrier.harq.dl_harq_mut(pid);
            process.new_retx(slot, ack_slot, prev_grant, DciSnapshot { mcs, rv: process.rv() });
            trace!(rnti, pid, "DL HARQ retx scheduled");
        }

        for idx in newtx_idxs {
            let Some(Some(dci)) = dcis.next() else { continue };
            let rnti = ues[idx].rnti;
            let Some(slot_ue) = ues[idx].make_slot_ue(cc, slot) else {
                pdcch.free_dci(&dci);
                continue;
            };
            let ccch_pending = ues[idx].buffers.has_pending_ccch();
            let carrier = ues[idx].carrier_mut(cc).expect("checked active above");
            let Some(pid) = carrier.harq.find_empty_dl_harq() else {
                pdcch.free_dci(&dci);
                continue;
            };

            let used = grid.dl_used_mask(slot);
            let start_mcs = select_mcs(args.fixed_dl_mcs, carrier.dl_cqi, ccch_pending);
            let mut placed = None;
            let mut mcs = start_mcs;
            loop {
                let interval = super::grid::find_optimal_dl_grant(used, params.nof_prb, 0, mcs, slot_ue.dl_pending_bytes, MAX_NEWTX_PRB);
                let Some(interval) = interval else { break };
                match make_pdsch_grant(interval, mcs) {
                    Ok(grant) => {
                        placed = Some((interval, grant));
                        break;
                    }
                    Err(_) if mcs > 0 => mcs -= 1,
                    Err(_) => break,
                }
            }
            let Some((interval, grant)) = placed else {
                pdcch.free_dci(&dci);
                continue;
            };
            if grid.alloc_pdsch(params, slot, rnti, interval, mcs, dci, pid as u32, false).is_err() {
                pdcch.free_dci(&dci);
                continue;
            }
            let ack_slot = slot + DEFAULT_ACK_DELAY;
            let softbuffer = carrier.harq.new_softbuffer();
            carrier.harq.dl_harq_mut(pid).new_tx(slot, ack_slot, interval_to_grant(interval), mcs, grant.tbs, DEFAULT_MAX_RETX, softbuffer, DciSnapshot { mcs, rv: 0 });
        }
    }

    /// UL retransmissions, then new transmissions, round-robin across `ues`.
    /// Unlike DL, a new UL transmission always spans the full BWP width as a
    /// starting point (matching the original round-robin allocator, which
    /// leaves PRB-count optimization for a later scheduling pass).
    pub fn sched_ul_users(&mut self, ues: &mut [Ue], params: &BwpParams, pdcch: &mut BwpPdcchAllocator, grid: &mut BwpResGrid, cc: usize, slot: SlotPoint, args: &SchedArgs) {
        let Some((ss_id, coreset_id)) = ue_search_space(params) else {
            return;
        };
        let ss = params.get_ss(ss_id).expect("ss_id resolved from params.cfg must exist");
        let Some(coreset) = params.coresets.iter().find(|c| c.cfg.id == coreset_id) else {
            return;
        };
        let nof_slots = SlotPoint::slots_per_frame(params.cfg.numerology_idx);
        let slot_idx = slot.slot_idx() as usize;
        let n = ues.len();

        let mut retx_idxs = Vec::new();
        let mut newtx_idxs = Vec::new();
        let mut reqs = Vec::new();

        for (i, ue) in ues.iter().enumerate() {
            let Some(carrier) = ue.carrier(cc) else { continue };
            if !carrier.active {
                continue;
            }
            if carrier.harq.find_pending_ul_retx(slot).is_some() {
                let locs = derive_cce_locations(coreset, ss, ue.rnti as u32, nof_slots);
                reqs.push(BatchDciRequest { coreset_id, ss_id, candidates: fixed_level_candidates(&locs, slot_idx, FIXED_UE_DATA_AGGR_LEVEL) });
                retx_idxs.push(i);
            }
        }
        if n > 0 && args.pusch_enabled {
            let start = (slot.to_uint() as usize) % n;
            for offset in 0..n {
                let idx = (start + offset) % n;
                let Some(slot_ue) = ues[idx].make_slot_ue(cc, slot) else { continue };
                if !slot_ue.has_ul_newtx_data() {
                    continue;
                }
                let locs = derive_cce_locations(coreset, ss, ues[idx].rnti as u32, nof_slots);
                reqs.push(BatchDciRequest { coreset_id, ss_id, candidates: fixed_level_candidates(&locs, slot_idx, FIXED_UE_DATA_AGGR_LEVEL) });
                newtx_idxs.push(idx);
            }
        }
        let dcis = pdcch.alloc_dci_batch(&reqs);
        let mut dcis = dcis.into_iter();

        for idx in retx_idxs {
            let Some(Some(dci)) = dcis.next() else { continue };
            let rnti = ues[idx].rnti;
            let carrier = ues[idx].carrier_mut(cc).expect("checked active above");
            let pid = carrier.harq.find_pending_ul_retx(slot).expect("checked above");
            let process = carrier.harq.ul_harq(pid);
            let Some(prev_grant) = process.grant() else {
                pdcch.free_dci(&dci);
                continue;
            };
            let mcs = process.mcs();
            let interval = prev_grant.prbs();
            if grid.alloc_pusch(slot, rnti, interval, mcs, dci, pid as u32, true).is_err() {
                pdcch.free_dci(&dci);
                continue;
            }
            let ack_slot = slot + DEFAULT_ACK_DELAY;
            let process = carrier.harq.ul_harq_mut(pid);
            process.new_retx(slot, ack_slot, prev_grant, DciSnapshot { mcs, rv: process.rv() });
        }

        for idx in newtx_idxs {
            let Some(Some(dci)) = dcis.next() else { continue };
            let rnti = ues[idx].rnti;
            if ues[idx].make_slot_ue(cc, slot).is_none() {
                pdcch.free_dci(&dci);
                continue;
            }
            let ccch_pending = ues[idx].buffers.has_pending_ccch();
            let carrier = ues[idx].carrier_mut(cc).expect("checked active above");
            let Some(pid) = carrier.harq.find_empty_ul_harq() else {
                pdcch.free_dci(&dci);
                continue;
            };

            let interval = PrbInterval::new(0, params.nof_prb);
            let start_mcs = select_mcs(args.fixed_ul_mcs, carrier.ul_cqi, ccch_pending);
            let mut placed = None;
            let mut mcs = start_mcs;
            loop {
                match make_pusch_grant(interval, mcs) {
                    Ok(grant) => {
                        placed = Some(grant);
                        break;
                    }
                    Err(_) if mcs > 0 => mcs -= 1,
                    Err(_) => break,
                }
            }
            let Some(grant) = placed else {
                pdcch.free_dci(&dci);
                continue;
            };
            if grid.alloc_pusch(slot, rnti, interval, mcs, dci, pid as u32, false).is_err() {
                pdcch.free_dci(&dci);
                continue;
            }
            let ack_slot = slot + DEFAULT_ACK_DELAY;
            let softbuffer = carrier.harq.new_softbuffer();
            carrier.harq.ul_harq_mut(pid).new_tx(slot, ack_slot, interval_to_grant(interval), mcs, grant.tbs, DEFAULT_MAX_RETX, softbuffer, DciSnapshot { mcs, rv: 0 });
        }
    }
}

fn interval_to_grant(interval: PrbInterval) -> super::rb::PrbGrant {
    super::rb::PrbGrant::from_interval(interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::sched::bwp_cfg::{BwpCfg, BwpParams, CoresetCfg, PuschTimeAllocRow, SearchSpaceCfg};
    use crate::mac::sched::softbuffer::SoftbufferPool;
    use crate::mac::sched::types::DciFormat as Fmt;

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
                id: 2,
                coreset_id: 0,
                ss_type: SearchSpaceType::Ue,
                nof_candidates: [0, 6, 2, 1, 0],
                formats: vec![Fmt::Dl11, Fmt::Ul00],
            }],
            ra_search_space_id: 2,
            pusch_time_alloc: vec![PuschTimeAllocRow { msg3_delay: 6, k: 4, s: 0, l: 14 }],
            nof_slots_per_frame_override: 1,
        })
    }

    #[test]
    fn dl_newtx_is_scheduled_for_ue_with_pending_bytes() {
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        let mut sched = TimeRrSched::new();
        let slot = SlotPoint::new(0, 0, 0);

        let mut ue = Ue::new(0x4601, 0);
        ue.add_carrier(0, 8, SoftbufferPool::new(100), slot);
        ue.buffers.config_lcid(4, 0);
        ue.buffers.dl_buffer_state(4, 500, 0);
        let mut ues = vec![ue];

        sched.sched_dl_users(&mut ues, &p, &mut pdcch, &mut grid, 0, slot, &SchedArgs::default());
        assert_eq!(grid.result(slot).dl.len(), 1);
        assert!(!grid.result(slot).dl[0].is_retx);
    }

    #[test]
    fn ul_newtx_is_scheduled_for_ue_with_bsr() {
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        let mut sched = TimeRrSched::new();
        let slot = SlotPoint::new(0, 0, 0);

        let mut ue = Ue::new(0x4601, 0);
        ue.add_carrier(0, 8, SoftbufferPool::new(100), slot);
        ue.buffers.ul_bsr(0, 500);
        let mut ues = vec![ue];

        sched.sched_ul_users(&mut ues, &p, &mut pdcch, &mut grid, 0, slot, &SchedArgs::default());
        assert_eq!(grid.result(slot).ul.len(), 1);
    }

    fn two_ue_slot(slot: SlotPoint) -> Vec<Ue> {
        [0x4601u16, 0x4602].into_iter().fold(Vec::new(), |mut ues, rnti| {
            let mut ue = Ue::new(rnti, 0);
            ue.add_carrier(0, 8, SoftbufferPool::new(100), slot);
            ue.buffers.config_lcid(4, 0);
            ue.buffers.dl_buffer_state(4, 500, 0);
            ues.push(ue);
            ues
        })
    }

    /// With no stored cursor, the UE the round-robin starts from for a given
    /// slot is `slot.to_uint() mod n`: slot count 0 starts at index 0 (rnti
    /// 0x4601 granted first), slot count 1 starts at index 1 (0x4602 first).
    #[test]
    fn round_robin_start_follows_slot_index_not_stored_state() {
        let p = params();

        let slot0 = SlotPoint::new(0, 0, 0);
        let mut pdcch0 = BwpPdcchAllocator::new(&[0]);
        let mut grid0 = BwpResGrid::new(&p);
        let mut ues0 = two_ue_slot(slot0);
        TimeRrSched::new().sched_dl_users(&mut ues0, &p, &mut pdcch0, &mut grid0, 0, slot0, &SchedArgs::default());
        let order0: Vec<u16> = grid0.result(slot0).dl.iter().map(|g| g.rnti).collect();
        assert_eq!(order0, vec![0x4601, 0x4602]);

        let slot1 = SlotPoint::new(0, 0, 1);
        let mut pdcch1 = BwpPdcchAllocator::new(&[0]);
        let mut grid1 = BwpResGrid::new(&p);
        let mut ues1 = two_ue_slot(slot1);
        TimeRrSched::new().sched_dl_users(&mut ues1, &p, &mut pdcch1, &mut grid1, 0, slot1, &SchedArgs::default());
        let order1: Vec<u16> = grid1.result(slot1).dl.iter().map(|g| g.rnti).collect();
        assert_eq!(order1, vec![0x4602, 0x4601]);
    }

    #[test]
    fn fixed_dl_mcs_override_is_used_over_cqi() {
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        let mut sched = TimeRrSched::new();
        let slot = SlotPoint::new(0, 0, 0);

        let mut ue = Ue::new(0x4601, 0);
        ue.add_carrier(0, 8, SoftbufferPool::new(100), slot);
        ue.carrier_mut(0).unwrap().dl_cqi = 15;
        ue.buffers.config_lcid(4, 0);
        ue.buffers.dl_buffer_state(4, 500, 0);
        let mut ues = vec![ue];

        let args = SchedArgs { fixed_dl_mcs: 7, ..SchedArgs::default() };
        sched.sched_dl_users(&mut ues, &p, &mut pdcch, &mut grid, 0, slot, &args);
        assert_eq!(grid.result(slot).dl[0].grant.mcs, 7);
    }

    #[test]
    fn ccch_pending_floors_mcs_regardless_of_poor_cqi() {
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        let mut sched = TimeRrSched::new();
        let slot = SlotPoint::new(0, 0, 0);

        let mut ue = Ue::new(0x4601, 0);
        ue.add_carrier(0, 8, SoftbufferPool::new(100), slot);
        ue.carrier_mut(0).unwrap().dl_cqi = 1; // would otherwise map to a very low MCS
        ue.buffers.config_lcid(super::super::buffers::CCCH_LCID, 0);
        ue.buffers.dl_buffer_state(super::super::buffers::CCCH_LCID, 200, 0);
        let mut ues = vec![ue];

        sched.sched_dl_users(&mut ues, &p, &mut pdcch, &mut grid, 0, slot, &SchedArgs::default());
        assert!(grid.result(slot).dl[0].grant.mcs >= CCCH_MIN_MCS);
    }

    #[test]
    fn pdsch_disabled_skips_dl_scheduling() {
        let p = params();
        let mut pdcch = BwpPdcchAllocator::new(&[0]);
        let mut grid = BwpResGrid::new(&p);
        let mut sched = TimeRrSched::new();
        let slot = SlotPoint::new(0, 0, 0);

        let mut ue = Ue::new(0x4601, 0);
        ue.add_carrier(0, 8, SoftbufferPool::new(100), slot);
        ue.buffers.config_lcid(4, 0);
        ue.buffers.dl_buffer_state(4, 500, 0);
        let mut ues = vec![ue];

        let args = SchedArgs { pdsch_enabled: false, ..SchedArgs::default() };
        sched.sched_dl_users(&mut ues, &p, &mut pdcch, &mut grid, 0, slot, &args);
        assert!(grid.result(slot).dl.is_empty());
    }
}
