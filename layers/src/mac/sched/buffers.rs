//! Per-user logical-channel pending-bytes bookkeeping and MAC PDU subpdu
//! building within a byte budget.

use std::collections::VecDeque;

/// CCCH is always logical channel id 0 in the MAC subheader LCID space.
pub const CCCH_LCID: u8 = 0;
pub const MAX_LCID: u8 = 32;

/// A positive SR with no BSR yet received is floored to this many bytes so
/// the UE still gets a UL grant large enough to carry the BSR itself.
pub const SR_PENDING_BYTE_FLOOR: u32 = 512;

/// Rough per-CE size table; real sizes depend on the CE payload, but the
/// budgeting logic here only needs a conservative estimate.
fn sizeof_ce(lcid: u8) -> u32 {
    match lcid {
        // Timing Advance / short BSR-like single-octet CEs.
        0..=3 => 1,
        _ => 6,
    }
}

#[derive(Debug, Clone, Copy)]
struct LcChannelState {
    newtx_bytes: u32,
    prio_bytes: u32,
}

impl Default for LcChannelState {
    fn default() -> Self {
        Self { newtx_bytes: 0, prio_bytes: 0 }
    }
}

/// A queued MAC control element, tagged with the carrier (cell) it must be
/// sent on.
#[derive(Debug, Clone, Copy)]
pub struct PendingCe {
    pub lcid: u8,
    pub cc: usize,
}

/// Built-up list of subpdus (CE lcids and data lcids, in transmission
/// order) for one PDSCH grant.
#[derive(Debug, Clone, Default)]
pub struct DlPdu {
    pub subpdus: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct BearerCfg {
    configured: bool,
    lcg: u8,
}

impl Default for BearerCfg {
    fn default() -> Self {
        Self { configured: false, lcg: 0 }
    }
}

/// Per-user buffer state: per-LCID DL pending bytes, per-LCG UL BSR, and the
/// FIFO of pending MAC CEs.
pub struct UeBufferManager {
    channels: [LcChannelState; MAX_LCID as usize],
    bearers: [BearerCfg; MAX_LCID as usize],
    lcg_bsr: [u32; 8],
    pub pending_ces: VecDeque<PendingCe>,
}

impl UeBufferManager {
    pub fn new() -> Self {
        Self {
            channels: [LcChannelState::default(); MAX_LCID as usize],
            bearers: [BearerCfg::default(); MAX_LCID as usize],
            lcg_bsr: [0; 8],
            pending_ces: VecDeque::new(),
        }
    }

    pub fn config_lcid(&mut self, lcid: u8, lcg: u8) {
        self.bearers[lcid as usize] = BearerCfg { configured: true, lcg };
    }

    fn is_lcid_valid(&self, lcid: u8) -> bool {
        (lcid as usize) < MAX_LCID as usize && (lcid == CCCH_LCID || self.bearers[lcid as usize].configured)
    }

    pub fn dl_buffer_state(&mut self, lcid: u8, newtx: u32, prio: u32) {
        self.channels[lcid as usize] = LcChannelState { newtx_bytes: newtx, prio_bytes: prio };
    }

    pub fn ul_bsr(&mut self, lcg: u8, bytes: u32) {
        self.lcg_bsr[lcg as usize] = bytes;
    }

    pub fn add_dl_mac_ce(&mut self, lcid: u8, cc: usize, n: u32) {
        for _ in 0..n {
            self.pending_ces.push_back(PendingCe { lcid, cc });
        }
    }

    fn pending_lcid_bytes(&self, lcid: u8) -> u32 {
        let c = self.channels[lcid as usize];
        c.newtx_bytes + c.prio_bytes
    }

    /// `Σ pending bytes + Σ CE sizes` — the invariant from spec §3.
    pub fn get_dl_tx_total(&self) -> u32 {
        let lcid_total: u32 = (0..MAX_LCID).map(|l| self.pending_lcid_bytes(l)).sum();
        let ce_total: u32 = self.pending_ces.iter().map(|ce| sizeof_ce(ce.lcid)).sum();
        lcid_total + ce_total
    }

    pub fn get_bsr(&self) -> u32 {
        self.lcg_bsr.iter().sum()
    }

    /// Whether CCCH currently has pending bytes (Msg4/RRC setup signalling),
    /// used to floor the MCS selected for this UE's grant.
    pub fn has_pending_ccch(&self) -> bool {
        self.pending_lcid_bytes(CCCH_LCID) > 0
    }

    /// Greedily fill `pdu` from the pending CE queue then from pending LCIDs
    /// ascending, draining `rem_bytes`. Returns `false` iff the CCCH LCID
    /// had more pending bytes than fit in the remaining budget (signals
    /// segmentation to the caller; the allocation proceeds regardless).
    pub fn alloc_subpdus(&mut self, mut rem_bytes: u32, cc: usize, pdu: &mut DlPdu) -> bool {
        while let Some(ce) = self.pending_ces.front() {
            if ce.cc != cc {
                break;
            }
            let size = sizeof_ce(ce.lcid);
            if size > rem_bytes {
                break;
            }
            rem_bytes -= size;
            pdu.subpdus.push(ce.lcid);
            self.pending_ces.pop_front();
        }

        for lcid in 0..MAX_LCID {
            if rem_bytes == 0 {
                break;
            }
            if lcid != CCCH_LCID && !self.is_lcid_valid(lcid) {
                continue;
            }
            let pending = self.pending_lcid_bytes(lcid);
            if lcid == CCCH_LCID && pending > rem_bytes {
                pdu.subpdus.push(lcid);
                return false;
            }
            if pending > 0 {
                let take = rem_bytes.min(pending);
                rem_bytes -= take;
                pdu.subpdus.push(lcid);
            }
        }
        true
    }
}

impl Default for UeBufferManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dl_tx_total_sums_channels_and_ces() {
        let mut b = UeBufferManager::new();
        b.config_lcid(4, 0);
        b.dl_buffer_state(4, 100, 0);
        b.add_dl_mac_ce(2, 0, 1);
        assert_eq!(b.get_dl_tx_total(), 100 + sizeof_ce(2));
    }

    #[test]
    fn alloc_subpdus_drains_ces_before_lcids() {
        let mut b = UeBufferManager::new();
        b.config_lcid(4, 0);
        b.dl_buffer_state(4, 50, 0);
        b.add_dl_mac_ce(2, 0, 1);
        let mut pdu = DlPdu::default();
        let ok = b.alloc_subpdus(1000, 0, &mut pdu);
        assert!(ok);
        assert_eq!(pdu.subpdus[0], 2);
        assert!(pdu.subpdus.contains(&4));
    }

    #[test]
    fn ccch_segmentation_returns_false_but_still_schedules() {
        let mut b = UeBufferManager::new();
        b.dl_buffer_state(CCCH_LCID, 400, 0);
        let mut pdu = DlPdu::default();
        let ok = b.alloc_subpdus(300, 0, &mut pdu);
        assert!(!ok);
        assert_eq!(pdu.subpdus, vec![CCCH_LCID]);
    }

    #[test]
    fn ce_for_other_carrier_is_not_drained() {
        let mut b = UeBufferManager::new();
        b.add_dl_mac_ce(2, 1, 1);
        let mut pdu = DlPdu::default();
        let ok = b.alloc_subpdus(1000, 0, &mut pdu);
        assert!(ok);
        assert!(pdu.subpdus.is_empty());
        assert_eq!(b.pending_ces.len(), 1);
    }

    #[test]
    fn bsr_sums_all_lcgs() {
        let mut b = UeBufferManager::new();
        b.ul_bsr(0, 10);
        b.ul_bsr(3, 20);
        assert_eq!(b.get_bsr(), 30);
    }

    #[test]
    fn has_pending_ccch_reflects_ccch_buffer_state() {
        let mut b = UeBufferManager::new();
        assert!(!b.has_pending_ccch());
        b.dl_buffer_state(CCCH_LCID, 100, 0);
        assert!(b.has_pending_ccch());
    }
}
