//! PDCCH candidate allocator: a per-coreset CCE occupancy bitmap plus a
//! backtracking search over aggregation levels and candidate positions,
//! with rollback on downstream (PDSCH/PUSCH) allocation failure.

use super::bwp_cfg::{BwpParams, CceLocTable};
use super::error::AllocResult;
use super::types::{aggr_level_index, DciFormat, RntiType, AGGREGATION_LEVELS};

/// A granted PDCCH candidate: which CCEs it occupies and at what
/// aggregation level, kept so the caller can build the DCI payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DciLocation {
    pub coreset_id: u32,
    pub ss_id: u32,
    pub l_crb_start: u32,
    pub aggr_level: u32,
}

/// Per-slot, per-coreset CCE occupancy bitmap. Coresets rarely exceed a few
/// dozen CCEs, so a `u64` bitmap comfortably covers any realistic size.
#[derive(Debug, Clone)]
struct CoresetRegion {
    coreset_id: u32,
    occupied: u64,
}

impl CoresetRegion {
    fn new(coreset_id: u32) -> Self {
        Self { coreset_id, occupied: 0 }
    }

    fn collides(&self, start: u32, l: u32) -> bool {
        let mask = cce_mask(start, l);
        self.occupied & mask != 0
    }

    fn reserve(&mut self, start: u32, l: u32) {
        self.occupied |= cce_mask(start, l);
    }

    fn release(&mut self, start: u32, l: u32) {
        self.occupied &= !cce_mask(start, l);
    }
}

fn cce_mask(start: u32, l: u32) -> u64 {
    if l >= 64 {
        return !0u64;
    }
    ((1u64 << l) - 1) << start
}

/// A snapshot of every coreset's occupancy, used for the DFS rollback
/// described in the allocator's design notes: the allocator speculatively
/// reserves a PDCCH candidate, proceeds to the downstream PDSCH/PUSCH grant,
/// and restores this snapshot if the downstream step fails.
#[derive(Debug, Clone)]
pub struct PdcchSnapshot(Vec<(u32, u64)>);

/// Per-BWP, per-slot PDCCH allocator.
pub struct BwpPdcchAllocator {
    regions: Vec<CoresetRegion>,
}

impl BwpPdcchAllocator {
    pub fn new(coreset_ids: &[u32]) -> Self {
        Self { regions: coreset_ids.iter().map(|&id| CoresetRegion::new(id)).collect() }
    }

    pub fn reset(&mut self) {
        for r in self.regions.iter_mut() {
            r.occupied = 0;
        }
    }

    pub fn snapshot(&self) -> PdcchSnapshot {
        PdcchSnapshot(self.regions.iter().map(|r| (r.coreset_id, r.occupied)).collect())
    }

    pub fn restore(&mut self, snap: &PdcchSnapshot) {
        for (id, occ) in &snap.0 {
            if let Some(r) = self.regions.iter_mut().find(|r| r.coreset_id == *id) {
                r.occupied = *occ;
            }
        }
    }

    fn region_mut(&mut self, coreset_id: u32) -> Option<&mut CoresetRegion> {
        self.regions.iter_mut().find(|r| r.coreset_id == coreset_id)
    }

    /// Try every candidate of `locs[slot_idx]` from the lowest aggregation
    /// level able to carry `dci_fmt` upward, returning the first free one.
    /// Mirrors the DFS-with-fallback strategy in the original allocator:
    /// cheaper (lower-aggregation) candidates are tried first to conserve
    /// CCE budget for other users in the same slot.
    pub fn alloc_dci(
        &mut self,
        params: &BwpParams,
        ss_id: u32,
        coreset_id: u32,
        rnti_type: RntiType,
        _dci_fmt: DciFormat,
        slot_idx: usize,
        locs: &CceLocTable,
    ) -> Result<DciLocation, AllocResult> {
        let ss = params.get_ss(ss_id).ok_or(AllocResult::InvalidGrantParams)?;
        if !ss.ss_type.accepts(rnti_type) {
            return Err(AllocResult::InvalidGrantParams);
        }
        let per_level = locs.get(slot_idx).ok_or(AllocResult::NoCchSpace)?;

        for (idx, &l) in AGGREGATION_LEVELS.iter().enumerate() {
            for &start in per_level[idx].iter() {
                let region = self.region_mut(coreset_id).ok_or(AllocResult::NoCchSpace)?;
                if !region.collides(start, l) {
                    region.reserve(start, l);
                    return Ok(DciLocation { coreset_id, ss_id, l_crb_start: start, aggr_level: l });
                }
            }
        }
        Err(AllocResult::NoCchSpace)
    }

    /// Convenience wrapper for the fixed aggregation level used by
    /// signalling (RAR/SI) and UE-dedicated data DCI alike (see the
    /// `FIXED_*_AGGR_LEVEL` constants): only candidates at that one level
    /// are tried.
    pub fn alloc_dci_fixed_level(
        &mut self,
        params: &BwpParams,
        ss_id: u32,
        coreset_id: u32,
        rnti_type: RntiType,
        dci_fmt: DciFormat,
        slot_idx: usize,
        locs: &CceLocTable,
        aggr_level: u32,
    ) -> Result<DciLocation, AllocResult> {
        let ss = params.get_ss(ss_id).ok_or(AllocResult::InvalidGrantParams)?;
        if !ss.ss_type.accepts(rnti_type) {
            return Err(AllocResult::InvalidGrantParams);
        }
        let _ = dci_fmt;
        let idx = aggr_level_index(aggr_level).ok_or(AllocResult::InvalidGrantParams)?;
        let per_level = locs.get(slot_idx).ok_or(AllocResult::NoCchSpace)?;
        for &start in per_level[idx].iter() {
            let region = self.region_mut(coreset_id).ok_or(AllocResult::NoCchSpace)?;
            if !region.collides(start, aggr_level) {
                region.reserve(start, aggr_level);
                return Ok(DciLocation { coreset_id, ss_id, l_crb_start: start, aggr_level });
            }
        }
        Err(AllocResult::NoCchSpace)
    }

    pub fn free_dci(&mut self, loc: &DciLocation) {
        if let Some(region) = self.region_mut(loc.coreset_id) {
            region.release(loc.l_crb_start, loc.aggr_level);
        }
    }

    /// Allocate every request in `reqs` against this slot's coreset state,
    /// backtracking to an earlier request's next candidate whenever a later
    /// one exhausts its own list — the multi-DCI case `alloc_dci`/
    /// `alloc_dci_fixed_level` don't cover, since a single greedy call can't
    /// undo an earlier user's placement to make room for a later one in the
    /// same slot. Requests are tried in order; any left unsatisfiable once
    /// the search floor passes them stay `None` and reserve nothing.
    pub fn alloc_dci_batch(&mut self, reqs: &[BatchDciRequest]) -> Vec<Option<DciLocation>> {
        let n = reqs.len();
        let mut chosen: Vec<Option<DciLocation>> = vec![None; n];
        let mut next_candidate = vec![0usize; n];
        let mut floor = 0usize;
        let mut i = 0usize;
        while i < n {
            let req = &reqs[i];
            let mut placed = false;
            while next_candidate[i] < req.candidates.len() {
                let (start, level) = req.candidates[next_candidate[i]];
                next_candidate[i] += 1;
                match self.region_mut(req.coreset_id) {
                    Some(region) if !region.collides(start, level) => {
                        region.reserve(start, level);
                        chosen[i] = Some(DciLocation { coreset_id: req.coreset_id, ss_id: req.ss_id, l_crb_start: start, aggr_level: level });
                        placed = true;
                        break;
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
            if placed {
                i += 1;
                continue;
            }
            if i == floor {
                // No earlier request left to vary on this request's behalf:
                // it is unsatisfiable regardless of backtracking, so it is
                // dropped permanently and never revisited.
                floor += 1;
                i += 1;
                continue;
            }
            i -= 1;
            if let Some(loc) = chosen[i].take() {
                self.free_dci(&loc);
            }
        }
        chosen
    }
}

/// One request batched into [`BwpPdcchAllocator::alloc_dci_batch`]:
/// `candidates` must already be in preference order (cheapest/lowest
/// aggregation level first).
#[derive(Debug, Clone)]
pub struct BatchDciRequest {
    pub coreset_id: u32,
    pub ss_id: u32,
    pub candidates: Vec<(u32, u32)>,
}

/// Build the ordered `(start, aggr_level)` candidate list for a single fixed
/// aggregation level, as consumed by [`BwpPdcchAllocator::alloc_dci_batch`].
pub fn fixed_level_candidates(locs: &CceLocTable, slot_idx: usize, aggr_level: u32) -> Vec<(u32, u32)> {
    let Some(idx) = aggr_level_index(aggr_level) else {
        return Vec::new();
    };
    locs.get(slot_idx).map(|per_level| per_level[idx].iter().map(|&start| (start, aggr_level)).collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::sched::bwp_cfg::{derive_cce_locations, BwpCfg, BwpParams, CoresetCfg, PuschTimeAllocRow, SearchSpaceCfg};
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
                formats: vec![DciFormat::Dl10],
            }],
            ra_search_space_id: 1,
            pusch_time_alloc: vec![PuschTimeAllocRow { msg3_delay: 6, k: 4, s: 0, l: 14 }],
            nof_slots_per_frame_override: 1,
        })
    }

    #[test]
    fn first_candidate_is_granted_then_collides_on_reuse() {
        let p = params();
        let mut alloc = BwpPdcchAllocator::new(&[0]);
        let locs = p.common_cce_locs(1).unwrap();
        let first = alloc.alloc_dci(&p, 1, 0, RntiType::Ra, DciFormat::Dl10, 0, locs);
        assert!(first.is_ok());
    }

    #[test]
    fn snapshot_restore_undoes_reservation() {
        let p = params();
        let mut alloc = BwpPdcchAllocator::new(&[0]);
        let locs = p.common_cce_locs(1).unwrap();
        let snap = alloc.snapshot();
        let loc = alloc.alloc_dci(&p, 1, 0, RntiType::Ra, DciFormat::Dl10, 0, locs).unwrap();
        alloc.restore(&snap);
        // Same candidate should be available again after rollback.
        let region = alloc.region_mut(loc.coreset_id).unwrap();
        assert!(!region.collides(loc.l_crb_start, loc.aggr_level));
    }

    #[test]
    fn wrong_rnti_type_for_search_space_is_rejected() {
        let p = params();
        let mut alloc = BwpPdcchAllocator::new(&[0]);
        let locs = p.common_cce_locs(1).unwrap();
        let res = alloc.alloc_dci(&p, 1, 0, RntiType::Si, DciFormat::Dl10, 0, locs);
        assert_eq!(res, Err(AllocResult::InvalidGrantParams));
    }

    #[test]
    fn fixed_level_alloc_respects_requested_aggregation() {
        let p = params();
        let mut alloc = BwpPdcchAllocator::new(&[0]);
        let locs = p.common_cce_locs(1).unwrap();
        let loc = alloc
            .alloc_dci_fixed_level(&p, 1, 0, RntiType::Ra, DciFormat::Dl10, 0, locs, 2)
            .unwrap();
        assert_eq!(loc.aggr_level, 2);
    }

    #[test]
    fn batch_alloc_backtracks_earlier_request_to_satisfy_a_later_one() {
        let mut alloc = BwpPdcchAllocator::new(&[0]);
        // Two candidates share their only common CCE start; the first
        // request has a second candidate free, the second has only the one.
        // A pure greedy allocator (first-fit on request order) takes the
        // shared start for request 0 and starves request 1; backtracking
        // must retry request 0 on its other candidate instead.
        let reqs = vec![
            BatchDciRequest { coreset_id: 0, ss_id: 2, candidates: vec![(0, 2), (4, 2)] },
            BatchDciRequest { coreset_id: 0, ss_id: 2, candidates: vec![(0, 2)] },
        ];
        let results = alloc.alloc_dci_batch(&reqs);
        assert!(results[0].is_some());
        assert!(results[1].is_some());
        assert_eq!(results[1].unwrap().l_crb_start, 0);
        assert_eq!(results[0].unwrap().l_crb_start, 4);
    }

    #[test]
    fn batch_alloc_leaves_unsatisfiable_request_none_without_looping() {
        let mut alloc = BwpPdcchAllocator::new(&[0]);
        let reqs = vec![
            BatchDciRequest { coreset_id: 0, ss_id: 2, candidates: vec![(0, 2)] },
            BatchDciRequest { coreset_id: 0, ss_id: 2, candidates: vec![(0, 2)] },
        ];
        let results = alloc.alloc_dci_batch(&reqs);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
    }
}
