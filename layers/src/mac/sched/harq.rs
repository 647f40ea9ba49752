//! HARQ process state machine and per-user-per-cell HARQ entity.

use super::rb::PrbGrant;
use super::slot::SlotPoint;
use super::softbuffer::SoftBufferHandle;

/// Redundancy-version sequence used for DL/UL retransmissions (NR default).
pub const RV_SEQUENCE: [u8; 4] = [0, 2, 3, 1];

/// Opaque snapshot of the DCI used for the last (re)transmission on a
/// process, kept so retransmissions can be logged/compared without pulling
/// in the full DCI type here.
#[derive(Debug, Clone, Copy, Default)]
pub struct DciSnapshot {
    pub mcs: u8,
    pub rv: u8,
}

/// A single HARQ process: empty, or active/nacked awaiting retransmission or
/// ack, tracked per TS 38.321 stop-and-wait semantics.
#[derive(Debug)]
pub struct HarqProcess {
    pid: u32,
    empty: bool,
    slot_tx: SlotPoint,
    slot_ack: SlotPoint,
    grant: Option<PrbGrant>,
    mcs: u8,
    tbs: u32,
    rv_idx: u8,
    nof_retx: u32,
    max_retx: u32,
    softbuffer: Option<SoftBufferHandle>,
    last_dci: DciSnapshot,
}

impl HarqProcess {
    pub fn new(pid: u32, initial_slot: SlotPoint) -> Self {
        Self {
            pid,
            empty: true,
            slot_tx: initial_slot,
            slot_ack: initial_slot,
            grant: None,
            mcs: 0,
            tbs: 0,
            rv_idx: 0,
            nof_retx: 0,
            max_retx: 0,
            softbuffer: None,
            last_dci: DciSnapshot::default(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn empty(&self) -> bool {
        self.empty
    }

    pub fn grant(&self) -> Option<PrbGrant> {
        self.grant
    }

    pub fn mcs(&self) -> u8 {
        self.mcs
    }

    pub fn tbs(&self) -> u32 {
        self.tbs
    }

    pub fn rv(&self) -> u8 {
        self.rv_idx
    }

    pub fn nof_retx(&self) -> u32 {
        self.nof_retx
    }

    pub fn harq_slot_tx(&self) -> SlotPoint {
        self.slot_tx
    }

    /// True once `current_slot` has reached the expected ack slot without a
    /// positive ack and the process still has retransmission budget left.
    pub fn has_pending_retx(&self, current_slot: SlotPoint) -> bool {
        !self.empty && self.nof_retx < self.max_retx && current_slot >= self.slot_ack
    }

    /// Start a brand-new transmission. Fails (returns `false`, no mutation)
    /// if the process is not currently empty.
    pub fn new_tx(
        &mut self,
        slot_tx: SlotPoint,
        slot_ack: SlotPoint,
        grant: PrbGrant,
        mcs: u8,
        tbs: u32,
        max_retx: u32,
        softbuffer: SoftBufferHandle,
        dci: DciSnapshot,
    ) -> bool {
        if !self.empty {
            return false;
        }
        self.empty = false;
        self.slot_tx = slot_tx;
        self.slot_ack = slot_ack;
        self.grant = Some(grant);
        self.mcs = mcs;
        self.tbs = tbs;
        self.rv_idx = RV_SEQUENCE[0];
        self.nof_retx = 0;
        self.max_retx = max_retx;
        self.softbuffer = Some(softbuffer);
        self.last_dci = dci;
        true
    }

    /// Retransmit with the same TBS (sanity-checked by the caller), a new
    /// grant/slot, and the next RV in sequence. Fails if the process is
    /// empty or not eligible for retransmission.
    pub fn new_retx(&mut self, slot_tx: SlotPoint, slot_ack: SlotPoint, grant: PrbGrant, dci: DciSnapshot) -> bool {
        if self.empty {
            return false;
        }
        self.slot_tx = slot_tx;
        self.slot_ack = slot_ack;
        self.grant = Some(grant);
        self.nof_retx += 1;
        self.rv_idx = RV_SEQUENCE[(self.nof_retx as usize) % RV_SEQUENCE.len()];
        self.last_dci = dci;
        true
    }

    /// Report ack/nack for this process. Returns the TBS on success
    /// (negative-equivalent `None` if the process was already empty).
    pub fn ack_info(&mut self, ack: bool) -> Option<u32> {
        if self.empty {
            return None;
        }
        let tbs = self.tbs;
        if ack {
            self.release();
        } else if self.nof_retx >= self.max_retx {
            self.release();
        }
        Some(tbs)
    }

    fn release(&mut self) {
        self.empty = true;
        self.grant = None;
        self.softbuffer = None;
        self.nof_retx = 0;
    }

    /// Pure per-slot bookkeeping: processes whose ack window has passed
    /// without an ack remain `nack`/pending-retx (no state change needed
    /// here beyond what `has_pending_retx` already derives), except that a
    /// process exceeding `max_retx` without ever being retransmitted again
    /// is discarded (stuck process, matching spec §4.2).
    pub fn new_slot(&mut self, current_slot: SlotPoint) {
        if !self.empty && current_slot >= self.slot_ack && self.nof_retx >= self.max_retx {
            self.release();
        }
    }
}

/// Fixed-size per-user-per-cell array of DL and UL HARQ processes.
pub struct HarqEntity {
    dl: Vec<HarqProcess>,
    ul: Vec<HarqProcess>,
    softbuffers: super::softbuffer::SoftbufferPool,
}

impl HarqEntity {
    pub fn new(nof_harq: usize, softbuffers: super::softbuffer::SoftbufferPool, initial_slot: SlotPoint) -> Self {
        Self {
            dl: (0..nof_harq).map(|pid| HarqProcess::new(pid as u32, initial_slot)).collect(),
            ul: (0..nof_harq).map(|pid| HarqProcess::new(pid as u32, initial_slot)).collect(),
            softbuffers,
        }
    }

    pub fn nof_dl_harqs(&self) -> usize {
        self.dl.len()
    }

    pub fn nof_ul_harqs(&self) -> usize {
        self.ul.len()
    }

    pub fn dl_harq(&self, pid: usize) -> &HarqProcess {
        &self.dl[pid]
    }

    pub fn ul_harq(&self, pid: usize) -> &HarqProcess {
        &self.ul[pid]
    }

    pub fn dl_harq_mut(&mut self, pid: usize) -> &mut HarqProcess {
        &mut self.dl[pid]
    }

    pub fn ul_harq_mut(&mut self, pid: usize) -> &mut HarqProcess {
        &mut self.ul[pid]
    }

    pub fn find_empty_dl_harq(&mut self) -> Option<usize> {
        self.dl.iter().position(|h| h.empty())
    }

    pub fn find_empty_ul_harq(&mut self) -> Option<usize> {
        self.ul.iter().position(|h| h.empty())
    }

    pub fn find_pending_dl_retx(&self, current_slot: SlotPoint) -> Option<usize> {
        self.dl.iter().position(|h| h.has_pending_retx(current_slot))
    }

    pub fn find_pending_ul_retx(&self, current_slot: SlotPoint) -> Option<usize> {
        self.ul.iter().position(|h| h.has_pending_retx(current_slot))
    }

    pub fn new_softbuffer(&self) -> SoftBufferHandle {
        self.softbuffers.get_tx()
    }

    /// Total TBS currently in flight across non-empty UL processes, i.e.
    /// bytes the UE has already been granted but whose BSR hasn't caught up
    /// with yet. Subtracted from the BSR-reported pending bytes so a UE
    /// isn't re-granted for data it's already transmitting.
    pub fn ul_bytes_in_flight(&self) -> u32 {
        self.ul.iter().filter(|h| !h.empty()).map(|h| h.tbs()).sum()
    }

    pub fn new_slot(&mut self, current_slot: SlotPoint) {
        for h in self.dl.iter_mut().chain(self.ul.iter_mut()) {
            h.new_slot(current_slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::sched::rb::PrbInterval;

    fn grant() -> PrbGrant {
        PrbGrant::from_interval(PrbInterval::new(0, 10))
    }

    fn pool() -> super::super::softbuffer::SoftbufferPool {
        super::super::softbuffer::SoftbufferPool::new(100)
    }

    #[test]
    fn new_tx_then_ack_empties_process() {
        let p = pool();
        let mut h = HarqProcess::new(0, SlotPoint::new(0, 0, 0));
        let ok = h.new_tx(
            SlotPoint::new(0, 0, 0),
            SlotPoint::new(0, 0, 4),
            grant(),
            10,
            1000,
            4,
            p.get_tx(),
            DciSnapshot::default(),
        );
        assert!(ok);
        assert!(!h.empty());
        let tbs = h.ack_info(true);
        assert_eq!(tbs, Some(1000));
        assert!(h.empty());
    }

    #[test]
    fn rv_sequence_follows_0231() {
        let p = pool();
        let mut h = HarqProcess::new(0, SlotPoint::new(0, 0, 0));
        h.new_tx(SlotPoint::new(0, 0, 0), SlotPoint::new(0, 0, 1), grant(), 10, 1000, 4, p.get_tx(), DciSnapshot::default());
        assert_eq!(h.rv(), 0);
        h.new_retx(SlotPoint::new(0, 0, 2), SlotPoint::new(0, 0, 3), grant(), DciSnapshot::default());
        assert_eq!(h.rv(), 2);
        h.new_retx(SlotPoint::new(0, 0, 4), SlotPoint::new(0, 0, 5), grant(), DciSnapshot::default());
        assert_eq!(h.rv(), 3);
        h.new_retx(SlotPoint::new(0, 0, 6), SlotPoint::new(0, 0, 7), grant(), DciSnapshot::default());
        assert_eq!(h.rv(), 1);
    }

    #[test]
    fn nack_without_exhausting_retx_stays_active_and_pending() {
        let p = pool();
        let mut h = HarqProcess::new(0, SlotPoint::new(0, 0, 0));
        h.new_tx(SlotPoint::new(0, 0, 0), SlotPoint::new(0, 0, 1), grant(), 10, 1000, 4, p.get_tx(), DciSnapshot::default());
        h.ack_info(false);
        assert!(!h.empty());
        assert!(h.has_pending_retx(SlotPoint::new(0, 0, 1)));
    }

    #[test]
    fn stuck_process_is_released_after_max_retx() {
        let p = pool();
        let mut h = HarqProcess::new(0, SlotPoint::new(0, 0, 0));
        h.new_tx(SlotPoint::new(0, 0, 0), SlotPoint::new(0, 0, 1), grant(), 10, 1000, 1, p.get_tx(), DciSnapshot::default());
        h.ack_info(false);
        h.new_retx(SlotPoint::new(0, 0, 2), SlotPoint::new(0, 0, 3), grant(), DciSnapshot::default());
        h.ack_info(false);
        assert!(h.empty());
    }

    #[test]
    fn duplicate_ack_on_empty_process_is_noop() {
        let mut h = HarqProcess::new(0, SlotPoint::new(0, 0, 0));
        assert_eq!(h.ack_info(true), None);
    }

    #[test]
    fn ul_bytes_in_flight_sums_active_processes_only() {
        let p = pool();
        let mut entity = HarqEntity::new(2, p.clone(), SlotPoint::new(0, 0, 0));
        assert_eq!(entity.ul_bytes_in_flight(), 0);
        entity.ul_harq_mut(0).new_tx(SlotPoint::new(0, 0, 0), SlotPoint::new(0, 0, 4), grant(), 10, 800, 4, p.get_tx(), DciSnapshot::default());
        assert_eq!(entity.ul_bytes_in_flight(), 800);
        entity.ul_harq_mut(0).ack_info(true);
        assert_eq!(entity.ul_bytes_in_flight(), 0);
    }

    #[test]
    fn new_tx_fails_when_not_empty() {
        let p = pool();
        let mut h = HarqProcess::new(0, SlotPoint::new(0, 0, 0));
        assert!(h.new_tx(SlotPoint::new(0, 0, 0), SlotPoint::new(0, 0, 1), grant(), 10, 1000, 4, p.get_tx(), DciSnapshot::default()));
        assert!(!h.new_tx(SlotPoint::new(0, 0, 2), SlotPoint::new(0, 0, 3), grant(), 10, 1000, 4, p.get_tx(), DciSnapshot::default()));
    }
}
