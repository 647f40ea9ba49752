//! End-to-end coverage of the full per-slot pipeline, exercising the
//! interactions between modules that each module's own unit tests can't
//! reach in isolation: RACH through Msg3 grant, HARQ retx after a NACK,
//! SIB1 periodic broadcast, and PDCCH exhaustion under contention.

use super::bwp_cfg::{BwpCfg, BwpParams, CoresetCfg, PuschTimeAllocRow, SchedArgs, SearchSpaceCfg};
use super::rar::RachIndication;
use super::si::SiMessageCfg;
use super::si::SiSched;
use super::signalling::SignallingCfg;
use super::slot::SlotPoint;
use super::softbuffer::SoftbufferPool;
use super::top::{SchedEvent, SchedNr, UeCfg};
use super::types::{DciFormat, SearchSpaceType};
use super::worker::CellWorker;

fn full_bwp_cfg() -> BwpCfg {
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

fn make_cell(si: Vec<SiMessageCfg>) -> CellWorker {
    let params = BwpParams::derive(full_bwp_cfg());
    CellWorker::new(0, params, SignallingCfg { ssb_enabled: true, nzp_csi_rs_enabled: true }, SiSched::new(si), 10)
}

#[test]
fn rach_indication_produces_rar_and_msg3_grant_within_window() {
    let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell(vec![])]);
    let slot = SlotPoint::new(0, 0, 1);
    sched.events.enqueue_event(SchedEvent::DlRachInfo {
        cc: 0,
        rach: RachIndication { preamble_idx: 5, ta: 2, temp_crnti: 0x4601, slot_rx: slot, ofdm_symbol_idx: 0, freq_idx: 0 },
    });
    let results = sched.run_slot(slot);
    assert_eq!(results[0].rar.len(), 1);
    assert_eq!(results[0].rar[0].grants[0].temp_crnti, 0x4601);
}

#[test]
fn nacked_dl_harq_is_retransmitted_with_rotated_rv() {
    let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell(vec![])]);
    sched.events.enqueue_event(SchedEvent::UeCreate { rnti: 0x4601, cfg: UeCfg::default() });
    let slot0 = SlotPoint::new(0, 0, 0);
    sched.run_slot(slot0);

    sched.ues[0].add_carrier(0, 8, SoftbufferPool::new(100), slot0);
    sched.ues[0].buffers.config_lcid(4, 0);
    sched.ues[0].buffers.dl_buffer_state(4, 600, 0);

    let slot1 = SlotPoint::new(0, 0, 1);
    let first = sched.run_slot(slot1);
    assert_eq!(first[0].dl.len(), 1);
    let pid = first[0].dl[0].harq_pid as usize;

    // NACK it.
    sched.events.enqueue_event(SchedEvent::AckInfo { rnti: 0x4601, cc: 0, dl: true, pid, ack: false });
    sched.ues[0].buffers.dl_buffer_state(4, 0, 0); // no new data pending, so only the retx should fire
    let slot2 = SlotPoint::new(0, 0, 2);
    let second = sched.run_slot(slot2);
    assert_eq!(second[0].dl.len(), 1);
    assert!(second[0].dl[0].is_retx);
    assert_eq!(second[0].dl[0].harq_pid as usize, pid);
}

#[test]
fn sib1_is_broadcast_on_its_periodic_window() {
    let si_cfg = vec![SiMessageCfg { si_idx: 0, period_frames: 160, window_start_slot: 0, window_length_slots: 4, payload_bytes: 150 }];
    let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell(si_cfg)]);
    let slot = SlotPoint::new(0, 0, 0);
    let results = sched.run_slot(slot);
    assert_eq!(results[0].si.len(), 1);
}

#[test]
fn ul_bsr_triggers_pusch_grant_for_the_reporting_ue() {
    let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell(vec![])]);
    sched.events.enqueue_event(SchedEvent::UeCreate { rnti: 0x4601, cfg: UeCfg::default() });
    let slot0 = SlotPoint::new(0, 0, 0);
    sched.run_slot(slot0);
    sched.ues[0].add_carrier(0, 8, SoftbufferPool::new(100), slot0);

    sched.events.enqueue_ue_event(0x4601, SchedEvent::UlBsr { rnti: 0x4601, lcg: 0, bytes: 400 });
    let slot1 = SlotPoint::new(0, 0, 1);
    let results = sched.run_slot(slot1);
    assert_eq!(results[0].ul.len(), 1);
    assert_eq!(results[0].ul[0].rnti, 0x4601);
}

#[test]
fn pdcch_exhaustion_caps_newtx_grants_per_slot() {
    let mut sched = SchedNr::new(SchedArgs::default(), vec![make_cell(vec![])]);

    // Many more UEs with pending data than the UE search space has
    // candidates for at the fixed aggregation level (6 candidates at L=2).
    for i in 0..20u16 {
        let rnti = 0x4601 + i;
        sched.events.enqueue_event(SchedEvent::UeCreate { rnti, cfg: UeCfg::default() });
    }
    let slot0 = SlotPoint::new(0, 0, 0);
    sched.run_slot(slot0);
    for ue in sched.ues.iter_mut() {
        ue.add_carrier(0, 8, SoftbufferPool::new(100), slot0);
        ue.buffers.config_lcid(4, 0);
        ue.buffers.dl_buffer_state(4, 500, 0);
    }
    let slot1 = SlotPoint::new(0, 0, 1);
    let results = sched.run_slot(slot1);
    // At most 6 UE-dedicated DL candidates exist at the fixed aggregation
    // level configured for this search space, so no more than 6 UEs can be
    // granted a new DL transmission in one slot.
    assert!(results[0].dl.len() <= 6);
    assert!(!results[0].dl.is_empty());
}
