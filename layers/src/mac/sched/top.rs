//! Top-level scheduler: owns every cell's [`CellWorker`] and the UE table,
//! and exposes the single-threaded, synchronous event-queue API the stack
//! submits PHY/MAC feedback through before each slot is run.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use super::bwp_cfg::SchedArgs;
use super::error::SchedConfigError;
use super::grid::SlotResult;
use super::rar::RachIndication;
use super::slot::SlotPoint;
use super::ue::Ue;
use super::worker::{CellWorker, PendingUci};

/// One queued stack-originated event. Kept as a flat enum rather than a
/// trait object so the queue stays allocation-light and events can be
/// matched on exhaustively when drained.
#[derive(Debug, Clone)]
pub enum SchedEvent {
    UeCreate { rnti: u16, cfg: UeCfg },
    UeRemove { rnti: u16 },
    DlRachInfo { cc: usize, rach: RachIndication },
    UlBsr { rnti: u16, lcg: u8, bytes: u32 },
    DlBufferState { rnti: u16, lcid: u8, newtx: u32, prio: u32 },
    DlMacCe { rnti: u16, cc: usize, lcid: u8 },
    AckInfo { rnti: u16, cc: usize, dl: bool, pid: usize, ack: bool },
    UciReport { rnti: u16, uci: PendingUci },
    DlCqiInfo { rnti: u16, cc: usize, cqi: u8 },
    UlSrInfo { rnti: u16 },
}

/// Per-UE configuration supplied at creation time.
#[derive(Debug, Clone, Copy)]
pub struct UeCfg {
    pub pcell: usize,
    pub nof_harq: usize,
}

impl Default for UeCfg {
    fn default() -> Self {
        Self { pcell: 0, nof_harq: 8 }
    }
}

/// Synchronous event sink: a common (cell-independent) queue plus per-UE and
/// per-(UE, cell) queues, mirroring the layering of `event_manager` in the
/// original design. Everything is drained (applied in FIFO order) once per
/// slot, before the slot's scheduling pipeline runs — there is no
/// cross-thread handoff to reason about.
#[derive(Default)]
pub struct EventManager {
    common: VecDeque<SchedEvent>,
    per_ue: HashMap<u16, VecDeque<SchedEvent>>,
    per_ue_cc: HashMap<(u16, usize), VecDeque<SchedEvent>>,
}

impl EventManager {
    pub fn enqueue_event(&mut self, ev: SchedEvent) {
        self.common.push_back(ev);
    }

    pub fn enqueue_ue_event(&mut self, rnti: u16, ev: SchedEvent) {
        self.per_ue.entry(rnti).or_default().push_back(ev);
    }

    pub fn enqueue_ue_cc_feedback(&mut self, rnti: u16, cc: usize, ev: SchedEvent) {
        self.per_ue_cc.entry((rnti, cc)).or_default().push_back(ev);
    }

    fn drain_all(&mut self) -> Vec<SchedEvent> {
        let mut out: Vec<SchedEvent> = self.common.drain(..).collect();
        for (_, q) in self.per_ue.iter_mut() {
            out.extend(q.drain(..));
        }
        for (_, q) in self.per_ue_cc.iter_mut() {
            out.extend(q.drain(..));
        }
        out
    }
}

/// Accumulated per-cell scheduling counters since the last [`SchedNr::get_metrics`] call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellMetrics {
    pub nof_dl_grants: u64,
    pub nof_ul_grants: u64,
    pub nof_rar_grants: u64,
}

/// Metrics snapshot returned through an out-parameter, mirroring the original
/// allocator's `get_metrics(out)` rendezvous: the caller owns the buffer and
/// the scheduler only ever writes into it.
#[derive(Debug, Clone, Default)]
pub struct SchedMetrics {
    pub cells: Vec<CellMetrics>,
}

/// Top-level scheduler state for one gNB.
pub struct SchedNr {
    pub args: SchedArgs,
    pub cells: Vec<CellWorker>,
    pub ues: Vec<Ue>,
    pub events: EventManager,
    pending_uci: Vec<(u16, PendingUci)>,
    metrics: Vec<CellMetrics>,
    stopped: bool,
}

impl SchedNr {
    pub fn new(args: SchedArgs, cells: Vec<CellWorker>) -> Self {
        let metrics = vec![CellMetrics::default(); cells.len()];
        Self { args, cells, ues: Vec::new(), events: EventManager::default(), pending_uci: Vec::new(), metrics, stopped: false }
    }

    pub fn nof_harq_per_ue(&self) -> usize {
        8
    }

    fn find_ue_mut(&mut self, rnti: u16) -> Option<&mut Ue> {
        self.ues.iter_mut().find(|u| u.rnti == rnti)
    }

    /// (Re)configure the scheduler's global arguments and cell set. Replaces
    /// `cells` wholesale, so any in-flight per-cell state (pending RAR/SI,
    /// PDCCH occupancy) from before the call is discarded.
    pub fn config(&mut self, args: SchedArgs, cells: Vec<CellWorker>) -> Result<(), SchedConfigError> {
        if cells.is_empty() {
            return Err(SchedConfigError::NoBwpConfigured { cc: 0 });
        }
        for (cc, cell) in cells.iter().enumerate() {
            if cell.params.cfg.pusch_time_alloc.is_empty() {
                return Err(SchedConfigError::EmptyPuschTimeAllocTable);
            }
            if cell.params.get_ss(cell.params.cfg.ra_search_space_id).is_none() {
                warn!(cc, "cell configured without a resolvable RA search space");
                return Err(SchedConfigError::MissingRaSearchSpace);
            }
        }
        self.metrics = vec![CellMetrics::default(); cells.len()];
        self.args = args;
        self.cells = cells;
        Ok(())
    }

    /// Create or reconfigure a UE. Validates `cfg.pcell` resolves to a
    /// configured cell with at least one coreset before creating the HARQ
    /// entity, so a caller supplying a bogus pcell gets a config error back
    /// rather than a UE that can never be scheduled.
    pub fn ue_cfg(&mut self, rnti: u16, cfg: UeCfg) -> Result<(), SchedConfigError> {
        let Some(cell) = self.cells.get(cfg.pcell) else {
            return Err(SchedConfigError::UnknownCell { rnti, cc: cfg.pcell });
        };
        if cell.params.coresets.is_empty() {
            return Err(SchedConfigError::NoCoresetConfigured { rnti });
        }
        let softbuffers = cell.softbuffers.clone();
        if let Some(ue) = self.find_ue_mut(rnti) {
            ue.pcell = cfg.pcell;
        } else {
            let mut ue = Ue::new(rnti, cfg.pcell);
            // initial_slot only seeds HARQ process bookkeeping before the
            // first real slot runs; SlotPoint::new(0,0,0) is a safe default.
            ue.add_carrier(cfg.pcell, cfg.nof_harq, softbuffers, SlotPoint::new(0, 0, 0));
            self.ues.push(ue);
        }
        Ok(())
    }

    /// Copy the current per-cell metrics into `out`, matching the original
    /// scheduler's out-parameter accessor rather than returning an owned
    /// snapshot the caller must remember to poll.
    pub fn get_metrics(&self, out: &mut SchedMetrics) {
        out.cells.clear();
        out.cells.extend_from_slice(&self.metrics);
    }

    /// Stop scheduling: subsequent `run_slot` calls drain events (so UE
    /// teardown still completes) but return empty per-cell results.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    fn apply_event(&mut self, ev: SchedEvent) {
        match ev {
            SchedEvent::UeCreate { rnti, cfg } => {
                if let Err(e) = self.ue_cfg(rnti, cfg) {
                    warn!(rnti, error = %e, "UE creation rejected");
                }
            }
            SchedEvent::UeRemove { rnti } => {
                self.ues.retain(|u| u.rnti != rnti);
            }
            SchedEvent::DlRachInfo { cc, rach } => {
                if let Some(cell) = self.cells.get_mut(cc) {
                    cell.ra_sched.dl_rach_info(rach);
                } else {
                    warn!(cc, "RACH indication for unknown cell");
                }
            }
            SchedEvent::UlBsr { rnti, lcg, bytes } => {
                if let Some(ue) = self.find_ue_mut(rnti) {
                    ue.buffers.ul_bsr(lcg, bytes);
                    ue.sr_pending = false;
                }
            }
            SchedEvent::DlBufferState { rnti, lcid, newtx, prio } => {
                if let Some(ue) = self.find_ue_mut(rnti) {
                    ue.buffers.dl_buffer_state(lcid, newtx, prio);
                }
            }
            SchedEvent::DlMacCe { rnti, cc, lcid } => {
                if let Some(ue) = self.find_ue_mut(rnti) {
                    ue.buffers.add_dl_mac_ce(lcid, cc, 1);
                }
            }
            SchedEvent::AckInfo { rnti, cc, dl, pid, ack } => {
                if let Some(ue) = self.find_ue_mut(rnti) {
                    if let Some(carrier) = ue.carrier_mut(cc) {
                        if dl {
                            carrier.harq.dl_harq_mut(pid).ack_info(ack);
                        } else {
                            carrier.harq.ul_harq_mut(pid).ack_info(ack);
                        }
                    }
                }
            }
            SchedEvent::UciReport { rnti, uci } => {
                self.pending_uci.push((rnti, uci));
            }
            SchedEvent::DlCqiInfo { rnti, cc, cqi } => {
                if let Some(ue) = self.find_ue_mut(rnti) {
                    if let Some(carrier) = ue.carrier_mut(cc) {
                        carrier.dl_cqi = cqi;
                    }
                }
            }
            SchedEvent::UlSrInfo { rnti } => {
                if let Some(ue) = self.find_ue_mut(rnti) {
                    ue.sr_pending = true;
                }
            }
        }
    }

    /// Drain all queued events, advance every cell's HARQ entities for
    /// `slot`, run each cell's worker, and return the per-cell results.
    pub fn run_slot(&mut self, slot: SlotPoint) -> Vec<SlotResult> {
        let drained = self.events.drain_all();
        for ev in drained {
            self.apply_event(ev);
        }

        if self.stopped {
            return Vec::new();
        }

        for ue in self.ues.iter_mut() {
            for (_, carrier) in ue.carriers.iter_mut() {
                carrier.harq.new_slot(slot);
            }
        }

        let uci = std::mem::take(&mut self.pending_uci);
        let mut results = Vec::with_capacity(self.cells.len());
        for cell in self.cells.iter_mut() {
            let per_cell_uci: Vec<(u16, PendingUci)> = uci.iter().filter(|(rnti, _)| self.ues.iter().any(|u| u.pcell == cell.cc && u.rnti == *rnti)).copied().collect();
            let result = cell.run_slot(&mut self.ues, slot, &per_cell_uci, &self.args);
            if let Some(m) = self.metrics.get_mut(cell.cc) {
                m.nof_dl_grants += result.dl.len() as u64;
                m.nof_ul_grants += result.ul.len() as u64;
                m.nof_rar_grants += result.rar.len() as u64;
            }
            results.push(result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::sched::bwp_cfg::{BwpCfg, BwpParams, CoresetCfg, PuschTimeAllocRow, SearchSpaceCfg};
    use crate::mac::sched::si::SiSched;
    use crate::mac::sched::signalling::SignallingCfg;
    use crate::mac::sched::types::{DciFormat, SearchSpaceType};

    fn bwp_cfg() -> BwpCfg {
        BwpCfg {
            bwp_id: 0,
            start_rb: 0,
            rb_width: 100,
            numerology_idx: 0,
            rbg_size_cfg1: true,
            rar_window_size: 10,
            coresets: vec![CoresetCfg { id: 0, start_rb: 0, length_rb: 48, duration_symbols: 1 }],
            search_spaces: vec![
                SearchSpaceCfg { id: 0, coreset_id: 0, ss_type: SearchSpaceType::Common0, nof_candidates: [0, 4, 2, 1, 0], formats: vec![DciFormat::Dl10] },
                SearchSpaceCfg { id: 1, coreset_id: 0, ss_type: SearchSpaceType::Common1, nof_candidates: [0, 4, 2, 1, 0], formats: vec![DciFormat::Dl10] },
                SearchSpaceCfg { id: 2, coreset_id: 0, ss_type: SearchSpaceType::Ue, nof_candidates: [0, 6, 2, 1, 0], formats: vec![DciFormat::Dl11, DciFormat::Ul00] },
            ],
            ra_search_space_id: 1,
            pusch_time_alloc: vec![PuschTimeAllocRow { msg3_delay: 6, k: 4, s: 0, l: 14 }],
            nof_slots_per_frame_override: 1,
        }
    }

    fn make_cell() -> CellWorker {
        let params = BwpParams::derive(bwp_cfg());
        CellWorker::new(0, params, SignallingCfg::default(), SiSched::new(vec![]), 10)
    }

    #[test]
    fn ue_create_event_adds_ue_before_slot_runs() {
        let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell()]);
        sched.events.enqueue_event(SchedEvent::UeCreate { rnti: 0x4601, cfg: UeCfg::default() });
        let _ = sched.run_slot(SlotPoint::new(0, 0, 0));
        assert_eq!(sched.ues.len(), 1);
    }

    #[test]
    fn buffer_state_event_feeds_the_newtx_scheduler() {
        let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell()]);
        sched.events.enqueue_event(SchedEvent::UeCreate { rnti: 0x4601, cfg: UeCfg::default() });
        let slot0 = SlotPoint::new(0, 0, 0);
        sched.run_slot(slot0);
        sched.ues[0].buffers.config_lcid(4, 0);

        sched.events.enqueue_ue_event(0x4601, SchedEvent::DlBufferState { rnti: 0x4601, lcid: 4, newtx: 500, prio: 0 });
        let slot1 = SlotPoint::new(0, 0, 1);
        let results = sched.run_slot(slot1);
        assert_eq!(results[0].dl.len(), 1);
    }

    #[test]
    fn ue_remove_drops_user_from_table() {
        let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell()]);
        sched.events.enqueue_event(SchedEvent::UeCreate { rnti: 0x4601, cfg: UeCfg::default() });
        sched.run_slot(SlotPoint::new(0, 0, 0));
        sched.events.enqueue_event(SchedEvent::UeRemove { rnti: 0x4601 });
        sched.run_slot(SlotPoint::new(0, 0, 1));
        assert!(sched.ues.is_empty());
    }

    #[test]
    fn ue_cfg_rejects_unknown_pcell() {
        let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell()]);
        let err = sched.ue_cfg(0x4601, UeCfg { pcell: 5, nof_harq: 8 });
        assert_eq!(err, Err(SchedConfigError::UnknownCell { rnti: 0x4601, cc: 5 }));
    }

    #[test]
    fn config_rejects_empty_cell_list() {
        let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell()]);
        let err = sched.config(SchedArgs::default(), vec![]);
        assert_eq!(err, Err(SchedConfigError::NoBwpConfigured { cc: 0 }));
    }

    #[test]
    fn get_metrics_accumulates_grants_across_slots() {
        let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell()]);
        sched.events.enqueue_event(SchedEvent::UeCreate { rnti: 0x4601, cfg: UeCfg::default() });
        let slot0 = SlotPoint::new(0, 0, 0);
        sched.run_slot(slot0);
        sched.ues[0].buffers.config_lcid(4, 0);
        sched.ues[0].buffers.dl_buffer_state(4, 500, 0);
        sched.run_slot(SlotPoint::new(0, 0, 1));

        let mut metrics = SchedMetrics::default();
        sched.get_metrics(&mut metrics);
        assert_eq!(metrics.cells[0].nof_dl_grants, 1);
    }

    #[test]
    fn stop_suppresses_further_scheduling() {
        let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell()]);
        sched.events.enqueue_event(SchedEvent::UeCreate { rnti: 0x4601, cfg: UeCfg::default() });
        sched.run_slot(SlotPoint::new(0, 0, 0));
        sched.stop();
        let results = sched.run_slot(SlotPoint::new(0, 0, 1));
        assert!(results.is_empty());
    }
}
