//! Per-user state: one [`Ue`] per RNTI, holding its buffer manager and a
//! [`UeCarrier`] (HARQ entity plus activity flag) for each serving cell it
//! is configured on. [`SlotUe`] is the read-mostly snapshot handed to the
//! allocators for a single (user, cell, slot) triple.

use std::collections::HashMap;

use super::buffers::{UeBufferManager, SR_PENDING_BYTE_FLOOR};
use super::harq::HarqEntity;
use super::slot::SlotPoint;
use super::softbuffer::SoftbufferPool;

/// No CQI report received yet; callers fall back to a conservative fixed MCS.
pub const CQI_UNSET: u8 = 0;

/// Per-UE, per-cell state: its own HARQ entity (processes are never shared
/// across cells), the last reported CQI in each direction, and whether the
/// UE currently has valid UL timing/PDCCH opportunity on this cell.
pub struct UeCarrier {
    pub cc: usize,
    pub harq: HarqEntity,
    pub active: bool,
    pub dl_cqi: u8,
    pub ul_cqi: u8,
}

impl UeCarrier {
    pub fn new(cc: usize, nof_harq: usize, softbuffers: SoftbufferPool, initial_slot: SlotPoint) -> Self {
        Self { cc, harq: HarqEntity::new(nof_harq, softbuffers, initial_slot), active: true, dl_cqi: CQI_UNSET, ul_cqi: CQI_UNSET }
    }
}

/// A configured user: buffers plus one [`UeCarrier`] per serving cell.
pub struct Ue {
    pub rnti: u16,
    pub buffers: UeBufferManager,
    pub carriers: HashMap<usize, UeCarrier>,
    pub ta: i32,
    pub pcell: usize,
    /// Set by a positive SR report, cleared once a BSR arrives.
    pub sr_pending: bool,
}

impl Ue {
    pub fn new(rnti: u16, pcell: usize) -> Self {
        Self { rnti, buffers: UeBufferManager::new(), carriers: HashMap::new(), ta: 0, pcell, sr_pending: false }
    }

    pub fn add_carrier(&mut self, cc: usize, nof_harq: usize, softbuffers: SoftbufferPool, initial_slot: SlotPoint) {
        self.carriers.insert(cc, UeCarrier::new(cc, nof_harq, softbuffers, initial_slot));
    }

    pub fn carrier(&self, cc: usize) -> Option<&UeCarrier> {
        self.carriers.get(&cc)
    }

    pub fn carrier_mut(&mut self, cc: usize) -> Option<&mut UeCarrier> {
        self.carriers.get_mut(&cc)
    }

    pub fn is_active_on(&self, cc: usize) -> bool {
        self.carriers.get(&cc).map(|c| c.active).unwrap_or(false)
    }

    /// Build the per-slot view the data schedulers consume: pending byte
    /// counts snapshotted at the moment the slot is built, plus whether a
    /// DL/UL HARQ retransmission is due.
    pub fn make_slot_ue(&self, cc: usize, slot: SlotPoint) -> Option<SlotUe> {
        let carrier = self.carriers.get(&cc)?;
        if !carrier.active {
            return None;
        }
        // BSR-reported bytes minus what's already in flight on an active UL
        // HARQ process; a standalone positive SR with no BSR data yet is
        // floored so the UE still gets a grant large enough to carry one.
        let discounted_bsr = self.buffers.get_bsr().saturating_sub(carrier.harq.ul_bytes_in_flight());
        let ul_pending_bytes = if discounted_bsr == 0 && self.sr_pending { SR_PENDING_BYTE_FLOOR } else { discounted_bsr };

        Some(SlotUe {
            rnti: self.rnti,
            cc,
            dl_pending_bytes: self.buffers.get_dl_tx_total(),
            ul_pending_bytes,
            dl_retx_harq: carrier.harq.find_pending_dl_retx(slot),
            ul_retx_harq: carrier.harq.find_pending_ul_retx(slot),
            dl_newtx_harq: None,
            ul_newtx_harq: None,
        })
    }
}

/// Per-(user, cell, slot) scheduling handle. Cheap to build and discard once
/// per slot per active UE; owns no allocator state itself.
#[derive(Debug, Clone, Copy)]
pub struct SlotUe {
    pub rnti: u16,
    pub cc: usize,
    pub dl_pending_bytes: u32,
    pub ul_pending_bytes: u32,
    pub dl_retx_harq: Option<usize>,
    pub ul_retx_harq: Option<usize>,
    pub dl_newtx_harq: Option<usize>,
    pub ul_newtx_harq: Option<usize>,
}

impl SlotUe {
    pub fn has_dl_retx(&self) -> bool {
        self.dl_retx_harq.is_some()
    }

    pub fn has_ul_retx(&self) -> bool {
        self.ul_retx_harq.is_some()
    }

    pub fn has_dl_newtx_data(&self) -> bool {
        self.dl_pending_bytes > 0
    }

    pub fn has_ul_newtx_data(&self) -> bool {
        self.ul_pending_bytes > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> SoftbufferPool {
        SoftbufferPool::new(100)
    }

    #[test]
    fn slot_ue_reflects_pending_bytes() {
        let mut ue = Ue::new(0x4601, 0);
        ue.add_carrier(0, 8, pool(), SlotPoint::new(0, 0, 0));
        ue.buffers.config_lcid(4, 0);
        ue.buffers.dl_buffer_state(4, 500, 0);
        ue.buffers.ul_bsr(0, 200);
        let slot_ue = ue.make_slot_ue(0, SlotPoint::new(0, 0, 0)).unwrap();
        assert_eq!(slot_ue.dl_pending_bytes, 500);
        assert_eq!(slot_ue.ul_pending_bytes, 200);
        assert!(slot_ue.has_dl_newtx_data());
    }

    #[test]
    fn inactive_carrier_yields_no_slot_ue() {
        let mut ue = Ue::new(0x4601, 0);
        ue.add_carrier(0, 8, pool(), SlotPoint::new(0, 0, 0));
        ue.carrier_mut(0).unwrap().active = false;
        assert!(ue.make_slot_ue(0, SlotPoint::new(0, 0, 0)).is_none());
    }

    #[test]
    fn unconfigured_cell_yields_no_slot_ue() {
        let ue = Ue::new(0x4601, 0);
        assert!(ue.make_slot_ue(1, SlotPoint::new(0, 0, 0)).is_none());
    }

    #[test]
    fn standalone_positive_sr_floors_ul_pending_bytes() {
        let mut ue = Ue::new(0x4601, 0);
        ue.add_carrier(0, 8, pool(), SlotPoint::new(0, 0, 0));
        ue.sr_pending = true;
        let slot_ue = ue.make_slot_ue(0, SlotPoint::new(0, 0, 0)).unwrap();
        assert_eq!(slot_ue.ul_pending_bytes, super::super::buffers::SR_PENDING_BYTE_FLOOR);
    }

    #[test]
    fn ul_pending_bytes_discounts_harq_bytes_in_flight() {
        use super::super::harq::DciSnapshot;
        use super::super::rb::{PrbGrant, PrbInterval};

        let mut ue = Ue::new(0x4601, 0);
        ue.add_carrier(0, 8, pool(), SlotPoint::new(0, 0, 0));
        ue.buffers.ul_bsr(0, 1000);
        let carrier = ue.carrier_mut(0).unwrap();
        let softbuffer = carrier.harq.new_softbuffer();
        carrier.harq.ul_harq_mut(0).new_tx(
            SlotPoint::new(0, 0, 0),
            SlotPoint::new(0, 0, 4),
            PrbGrant::from_interval(PrbInterval::new(0, 10)),
            10,
            400,
            4,
            softbuffer,
            DciSnapshot::default(),
        );
        let slot_ue = ue.make_slot_ue(0, SlotPoint::new(0, 0, 0)).unwrap();
        assert_eq!(slot_ue.ul_pending_bytes, 600);
    }
}
