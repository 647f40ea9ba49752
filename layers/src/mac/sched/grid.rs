//! Per-slot resource grid: RB occupancy, PDCCH allocator state, and the
//! accumulated sched result, kept in a ring buffer sized [`TTIMOD_SZ`] so
//! every allocator with a k0/k1/k2 lookahead can address slots by absolute
//! value without the caller tracking wraparound itself.

use super::bwp_cfg::BwpParams;
use super::error::AllocResult;
use super::pdcch::{BwpPdcchAllocator, DciLocation};
use super::rb::{find_empty_interval_of_length, BwpRbBitmap, PrbInterval};
use super::sch::{estimate_tbs, make_pdsch_grant, make_pusch_grant, PdschGrant, PuschGrant};
use super::slot::{SlotPoint, TTIMOD_SZ};

/// Upper bound on simultaneous UCI-bearing PUCCH transmissions in a slot;
/// exceeding it forces callers to multiplex UCI onto PUSCH instead (§4.12).
pub const MAX_UCI_PER_SLOT: u32 = 36;

#[derive(Debug, Clone, Copy)]
pub struct DlGrant {
    pub rnti: u16,
    pub grant: PdschGrant,
    pub dci: DciLocation,
    pub harq_pid: u32,
    pub is_retx: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct UlGrant {
    pub rnti: u16,
    pub grant: PuschGrant,
    pub dci: DciLocation,
    pub harq_pid: u32,
    pub is_retx: bool,
}

/// One Msg3 UL grant multiplexed into an RAR's grant list.
#[derive(Debug, Clone, Copy)]
pub struct RarMsg3Grant {
    pub temp_crnti: u16,
    pub msg3_grant: PuschGrant,
}

#[derive(Debug, Clone)]
pub struct RarGrant {
    pub ra_rnti: u16,
    pub grant: PdschGrant,
    pub dci: DciLocation,
    pub grants: Vec<RarMsg3Grant>,
}

#[derive(Debug, Clone, Copy)]
pub struct SiGrant {
    pub grant: PdschGrant,
    pub dci: DciLocation,
    pub si_idx: u32,
}

/// Everything the worker emits for one BWP in one slot.
#[derive(Debug, Clone, Default)]
pub struct SlotResult {
    pub dl: Vec<DlGrant>,
    pub ul: Vec<UlGrant>,
    pub rar: Vec<RarGrant>,
    pub si: Vec<SiGrant>,
}

/// One ring-buffer entry: the RB/PDCCH state and accumulated result for a
/// single absolute slot count.
struct GridEntry {
    tag: Option<u32>,
    dl_mask: BwpRbBitmap,
    ul_mask: BwpRbBitmap,
    pdcch: BwpPdcchAllocator,
    uci_count: u32,
    result: SlotResult,
}

impl GridEntry {
    fn new(params: &BwpParams) -> Self {
        let coreset_ids: Vec<u32> = params.coresets.iter().map(|c| c.cfg.id).collect();
        Self {
            tag: None,
            dl_mask: BwpRbBitmap::new(params.nof_prb, params.cfg.start_rb, params.p),
            ul_mask: BwpRbBitmap::new(params.nof_prb, params.cfg.start_rb, params.p),
            pdcch: BwpPdcchAllocator::new(&coreset_ids),
            uci_count: 0,
            result: SlotResult::default(),
        }
    }

    fn reset_for(&mut self, count: u32) {
        self.tag = Some(count);
        self.dl_mask.clear();
        self.ul_mask.clear();
        self.pdcch.reset();
        self.uci_count = 0;
        self.result = SlotResult::default();
    }
}

/// Fixed-size ring of [`GridEntry`]s, one per BWP, addressed by absolute
/// slot count modulo [`TTIMOD_SZ`].
pub struct BwpResGrid {
    entries: Vec<GridEntry>,
}

impl BwpResGrid {
    pub fn new(params: &BwpParams) -> Self {
        Self { entries: (0..TTIMOD_SZ).map(|_| GridEntry::new(params)).collect() }
    }

    fn slot_mut(&mut self, slot: SlotPoint) -> &mut GridEntry {
        let idx = slot.to_uint() as usize % TTIMOD_SZ;
        let entry = &mut self.entries[idx];
        if entry.tag != Some(slot.to_uint()) {
            entry.reset_for(slot.to_uint());
        }
        entry
    }

    pub fn result(&mut self, slot: SlotPoint) -> &SlotResult {
        &self.slot_mut(slot).result
    }

    pub fn take_result(&mut self, slot: SlotPoint) -> SlotResult {
        std::mem::take(&mut self.slot_mut(slot).result)
    }

    pub fn reserve_dl_interval(&mut self, slot: SlotPoint, interval: PrbInterval) {
        self.slot_mut(slot).dl_mask.add_interval(interval);
    }

    pub fn dl_used_mask(&mut self, slot: SlotPoint) -> u128 {
        self.slot_mut(slot).dl_mask.prb_mask()
    }

    pub fn ul_used_mask(&mut self, slot: SlotPoint) -> u128 {
        self.slot_mut(slot).ul_mask.prb_mask()
    }

    pub fn verify_uci_space(&mut self, slot: SlotPoint) -> bool {
        let entry = self.slot_mut(slot);
        if entry.uci_count >= MAX_UCI_PER_SLOT {
            return false;
        }
        entry.uci_count += 1;
        true
    }

    pub fn alloc_pdsch(
        &mut self,
        params: &BwpParams,
        slot: SlotPoint,
        rnti: u16,
        interval: PrbInterval,
        mcs: u8,
        dci: DciLocation,
        harq_pid: u32,
        is_retx: bool,
    ) -> Result<(), AllocResult> {
        let entry = self.slot_mut(slot);
        let grant = make_pdsch_grant(interval, mcs)?;
        let prb_grant = super::rb::PrbGrant::from_interval(interval);
        if entry.dl_mask.collides(&prb_grant) {
            return Err(AllocResult::SchCollision);
        }
        let _ = params;
        entry.dl_mask.add(&prb_grant);
        entry.result.dl.push(DlGrant { rnti, grant, dci, harq_pid, is_retx });
        Ok(())
    }

    pub fn alloc_pusch(
        &mut self,
        slot: SlotPoint,
        rnti: u16,
        interval: PrbInterval,
        mcs: u8,
        dci: DciLocation,
        harq_pid: u32,
        is_retx: bool,
    ) -> Result<(), AllocResult> {
        let entry = self.slot_mut(slot);
        let grant = make_pusch_grant(interval, mcs)?;
        let prb_grant = super::rb::PrbGrant::from_interval(interval);
        if entry.ul_mask.collides(&prb_grant) {
            return Err(AllocResult::SchCollision);
        }
        entry.ul_mask.add(&prb_grant);
        entry.result.ul.push(UlGrant { rnti, grant, dci, harq_pid, is_retx });
        Ok(())
    }

    pub fn alloc_rar(&mut self, slot: SlotPoint, rar: RarGrant) -> Result<(), AllocResult> {
        let entry = self.slot_mut(slot);
        let prb_grant = super::rb::PrbGrant::from_interval(rar.grant.prbs);
        if entry.dl_mask.collides(&prb_grant) {
            return Err(AllocResult::SchCollision);
        }
        entry.dl_mask.add(&prb_grant);
        entry.result.rar.push(rar);
        Ok(())
    }

    pub fn alloc_si(&mut self, slot: SlotPoint, si: SiGrant) -> Result<(), AllocResult> {
        let entry = self.slot_mut(slot);
        let prb_grant = super::rb::PrbGrant::from_interval(si.grant.prbs);
        if entry.dl_mask.collides(&prb_grant) {
            return Err(AllocResult::SchCollision);
        }
        entry.dl_mask.add(&prb_grant);
        entry.result.si.push(si);
        Ok(())
    }
}

/// Greedy widest-interval DL grant search (supplement B.9): find the widest
/// contiguous free run, then pick the smallest prefix of it that meets
/// `pending_bytes` at `mcs`, capped at `max_prb`. Favors leaving the
/// remaining PRBs free for other users over always taking the full run.
pub fn find_optimal_dl_grant(used_mask: u128, width: u32, search_start: u32, mcs: u8, pending_bytes: u32, max_prb: u32) -> Option<PrbInterval> {
    let free = find_empty_interval_of_length(used_mask, width, 1, search_start);
    if free.is_empty() {
        return None;
    }
    let cap = free.length().min(max_prb).max(1);
    let mut chosen = 1u32;
    for n in 1..=cap {
        chosen = n;
        if estimate_tbs(mcs, n) >= pending_bytes {
            break;
        }
    }
    Some(PrbInterval::new(free.start(), free.start() + chosen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::sched::bwp_cfg::{BwpCfg, BwpParams, CoresetCfg, PuschTimeAllocRow, SearchSpaceCfg};
    use crate::mac::sched::pdcch::DciLocation;
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
                id: 1,
                coreset_id: 0,
                ss_type: SearchSpaceType::Common1,
                nof_candidates: [0, 4, 2, 1, 0],
                formats: vec![],
            }],
            ra_search_space_id: 1,
            pusch_time_alloc: vec![PuschTimeAllocRow { msg3_delay: 6, k: 4, s: 0, l: 14 }],
            nof_slots_per_frame_override: 1,
        })
    }

    fn dummy_dci() -> DciLocation {
        DciLocation { coreset_id: 0, ss_id: 1, l_crb_start: 0, aggr_level: 2 }
    }

    #[test]
    fn pdsch_alloc_then_collision_on_overlap() {
        let p = params();
        let mut grid = BwpResGrid::new(&p);
        let slot = SlotPoint::new(0, 0, 0);
        grid.alloc_pdsch(&p, slot, 10, PrbInterval::new(0, 10), 5, dummy_dci(), 0, false).unwrap();
        let err = grid.alloc_pusch(slot, 10, PrbInterval::new(5, 15), 5, dummy_dci(), 0, false);
        // different masks (DL vs UL) so this does NOT collide.
        assert!(err.is_ok());
        let err2 = grid.alloc_pdsch(&p, slot, 11, PrbInterval::new(5, 15), 5, dummy_dci(), 1, false);
        assert!(err2.is_err());
    }

    #[test]
    fn ring_buffer_resets_on_slot_reuse() {
        let p = params();
        let mut grid = BwpResGrid::new(&p);
        let slot_a = SlotPoint::new(0, 0, 0);
        grid.reserve_dl_interval(slot_a, PrbInterval::new(0, 10));
        assert_ne!(grid.dl_used_mask(slot_a), 0);
        let slot_b = SlotPoint::new(0, 0, TTIMOD_SZ as u32);
        assert_eq!(grid.dl_used_mask(slot_b), 0);
    }

    #[test]
    fn find_optimal_dl_grant_caps_at_pending_bytes() {
        let iv = find_optimal_dl_grant(0, 100, 0, 10, 100, 50).unwrap();
        assert!(iv.length() <= 50);
        assert!(iv.length() >= 1);
    }

    #[test]
    fn verify_uci_space_saturates_at_limit() {
        let p = params();
        let mut grid = BwpResGrid::new(&p);
        let slot = SlotPoint::new(0, 0, 0);
        for _ in 0..MAX_UCI_PER_SLOT {
            assert!(grid.verify_uci_space(slot));
        }
        assert!(!grid.verify_uci_space(slot));
    }
}
