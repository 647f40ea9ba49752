//! Per-cell slot worker: runs the fixed pipeline of signalling, SI, RAR, and
//! data scheduling for one slot, then postprocesses the result to multiplex
//! UCI (SR/HARQ-ACK/CSI) onto PUCCH or a piggybacked PUSCH grant.

use tracing::{debug, warn};

use super::bwp_cfg::{BwpParams, SchedArgs};
use super::grid::{BwpResGrid, SlotResult};
use super::pdcch::BwpPdcchAllocator;
use super::rar::RaSched;
use super::si::SiSched;
use super::signalling::{sched_dl_signalling, SignallingCfg};
use super::slot::SlotPoint;
use super::softbuffer::SoftbufferPool;
use super::timerr::TimeRrSched;
use super::ue::Ue;

/// A pending uplink control report (SR and/or HARQ-ACK and/or CSI) that must
/// be carried on PUCCH unless it can ride a scheduled PUSCH instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingUci {
    pub sr_positive: bool,
    pub harq_acks: u8,
    pub csi_present: bool,
}

/// Everything needed to run one cell's slot pipeline.
pub struct CellWorker {
    pub cc: usize,
    pub params: BwpParams,
    pub grid: BwpResGrid,
    pub pdcch: BwpPdcchAllocator,
    pub signalling_cfg: SignallingCfg,
    pub ra_sched: RaSched,
    pub si_sched: SiSched,
    pub time_rr: TimeRrSched,
    /// One softbuffer pool shared by every UE's HARQ entity on this cell
    /// (every UE on the same cell contends for the same PHY buffer budget).
    pub softbuffers: SoftbufferPool,
}

impl CellWorker {
    pub fn new(cc: usize, params: BwpParams, signalling_cfg: SignallingCfg, si_sched: SiSched, rar_window: u32) -> Self {
        let grid = BwpResGrid::new(&params);
        let coreset_ids: Vec<u32> = params.coresets.iter().map(|c| c.cfg.id).collect();
        let softbuffers = SoftbufferPool::new(params.nof_prb);
        Self {
            cc,
            params,
            grid,
            pdcch: BwpPdcchAllocator::new(&coreset_ids),
            signalling_cfg,
            ra_sched: RaSched::new(rar_window),
            si_sched,
            time_rr: TimeRrSched::new(),
            softbuffers,
        }
    }

    /// Drive one slot through the fixed pipeline and return the slot's
    /// accumulated DL/UL/RAR/SI result, with UCI multiplexing applied.
    pub fn run_slot(&mut self, ues: &mut [Ue], slot: SlotPoint, uci: &[(u16, PendingUci)], args: &SchedArgs) -> SlotResult {
        sched_dl_signalling(&self.signalling_cfg, &self.params, &mut self.grid, slot);
        self.si_sched.run_slot(&self.params, &mut self.pdcch, &mut self.grid, slot);
        self.ra_sched.run_slot(&self.params, &mut self.pdcch, &mut self.grid, slot);
        if args.pdsch_enabled {
            self.time_rr.sched_dl_users(ues, &self.params, &mut self.pdcch, &mut self.grid, self.cc, slot, args);
        }
        if args.pusch_enabled {
            self.time_rr.sched_ul_users(ues, &self.params, &mut self.pdcch, &mut self.grid, self.cc, slot, args);
        }

        let mut result = self.grid.take_result(slot);
        self.postprocess_uci(&mut result, uci, slot);
        result
    }

    /// For every pending UCI report, either confirm it rides a scheduled
    /// PUSCH grant from this slot (piggyback) or reserve PUCCH capacity via
    /// `verify_uci_space`. A positive SR with no PUCCH capacity left and no
    /// PUSCH to ride falls back to being dropped with a warning rather than
    /// silently scheduled (matches the original worker's SR-negative
    /// fallback path).
    fn postprocess_uci(&mut self, result: &mut SlotResult, uci: &[(u16, PendingUci)], slot: SlotPoint) {
        for (rnti, pending) in uci {
            let rides_pusch = result.ul.iter().any(|g| g.rnti == *rnti);
            if rides_pusch {
                debug!(rnti, "UCI piggybacked on scheduled PUSCH");
                continue;
            }
            if !self.grid.verify_uci_space(slot) {
                if pending.sr_positive {
                    warn!(rnti, "no PUCCH capacity left for positive SR, dropping this slot");
                }
                continue;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::sched::bwp_cfg::{BwpCfg, CoresetCfg, PuschTimeAllocRow, SearchSpaceCfg};
    use crate::mac::sched::si::SiMessageCfg;
    use crate::mac::sched::softbuffer::SoftbufferPool;
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

    #[test]
    fn run_slot_schedules_data_for_active_ue() {
        let params = super::super::bwp_cfg::BwpParams::derive(bwp_cfg());
        let si = SiSched::new(vec![SiMessageCfg { si_idx: 0, period_frames: 8, window_start_slot: 0, window_length_slots: 5, payload_bytes: 100 }]);
        let mut worker = CellWorker::new(0, params, SignallingCfg { ssb_enabled: false, nzp_csi_rs_enabled: false }, si, 10);

        let slot = SlotPoint::new(0, 0, 2);
        let mut ue = Ue::new(0x4601, 0);
        ue.add_carrier(0, 8, SoftbufferPool::new(100), slot);
        ue.buffers.config_lcid(4, 0);
        ue.buffers.dl_buffer_state(4, 300, 0);
        let mut ues = vec![ue];

        let result = worker.run_slot(&mut ues, slot, &[], &super::super::bwp_cfg::SchedArgs::default());
        assert_eq!(result.dl.len(), 1);
    }

    #[test]
    fn uci_riding_pusch_does_not_consume_pucch_capacity() {
        let params = super::super::bwp_cfg::BwpParams::derive(bwp_cfg());
        let si = SiSched::new(vec![]);
        let mut worker = CellWorker::new(0, params, SignallingCfg::default(), si, 10);
        let slot = SlotPoint::new(0, 0, 2);

        let mut ue = Ue::new(0x4601, 0);
        ue.add_carrier(0, 8, SoftbufferPool::new(100), slot);
        ue.buffers.ul_bsr(0, 200);
        let mut ues = vec![ue];

        let result = worker.run_slot(&mut ues, slot, &[(0x4601, PendingUci { sr_positive: false, harq_acks: 1, csi_present: false })], &super::super::bwp_cfg::SchedArgs::default());
        assert_eq!(result.ul.len(), 1);
    }
}
