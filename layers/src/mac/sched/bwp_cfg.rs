//! BWP configuration and its derived parameters: RBG sizing, per-coreset
//! usable-PRB masks, per-search-space CCE candidate tables, PUSCH
//! time-domain allocation rows, and the slot DL/UL direction table.

use serde::{Deserialize, Serialize};

use super::rb::{nof_rbgs, rbg_size, PrbInterval};
use super::slot::SlotPoint;
use super::types::{DciFormat, RntiType, SearchSpaceType, AGGREGATION_LEVELS, MAX_NOF_AGGR_LEVELS};

fn default_true() -> bool {
    true
}
fn default_one() -> u32 {
    1
}
fn default_logger_name() -> String {
    "MAC-NR".to_string()
}
fn default_fixed_mcs() -> i32 {
    -1
}
fn default_nof_candidates() -> [u32; MAX_NOF_AGGR_LEVELS] {
    [0, 4, 2, 1, 0]
}

/// Global scheduler arguments, mirroring `sched_args_t`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedArgs {
    #[serde(default = "default_true")]
    pub pdsch_enabled: bool,
    #[serde(default = "default_true")]
    pub pusch_enabled: bool,
    #[serde(default)]
    pub auto_refill_buffer: bool,
    #[serde(default = "default_fixed_mcs")]
    pub fixed_dl_mcs: i32,
    #[serde(default = "default_fixed_mcs")]
    pub fixed_ul_mcs: i32,
    #[serde(default = "default_logger_name")]
    pub logger_name: String,
}

impl Default for SchedArgs {
    fn default() -> Self {
        Self {
            pdsch_enabled: true,
            pusch_enabled: true,
            auto_refill_buffer: false,
            fixed_dl_mcs: -1,
            fixed_ul_mcs: -1,
            logger_name: default_logger_name(),
        }
    }
}

/// Static coreset configuration (time/frequency extent within the BWP).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoresetCfg {
    pub id: u32,
    pub start_rb: u32,
    pub length_rb: u32,
    pub duration_symbols: u32,
}

/// Static search-space configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpaceCfg {
    pub id: u32,
    pub coreset_id: u32,
    pub ss_type: SearchSpaceType,
    #[serde(default = "default_nof_candidates")]
    pub nof_candidates: [u32; MAX_NOF_AGGR_LEVELS],
    pub formats: Vec<DciFormat>,
}

impl SearchSpaceCfg {
    pub fn nof_candidates_at(&self, aggr_idx: usize) -> u32 {
        self.nof_candidates[aggr_idx]
    }
}

/// One row of the PUSCH common time-domain resource allocation table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PuschTimeAllocRow {
    pub msg3_delay: u32,
    pub k: u32,
    pub s: u32,
    pub l: u32,
}

/// User-facing BWP configuration (what upper layers / config files supply).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BwpCfg {
    pub bwp_id: u32,
    pub start_rb: u32,
    pub rb_width: u32,
    #[serde(default)]
    pub numerology_idx: u8,
    #[serde(default = "default_true")]
    pub rbg_size_cfg1: bool,
    #[serde(default = "default_ten")]
    pub rar_window_size: u32,
    pub coresets: Vec<CoresetCfg>,
    pub search_spaces: Vec<SearchSpaceCfg>,
    pub ra_search_space_id: u32,
    pub pusch_time_alloc: Vec<PuschTimeAllocRow>,
    #[serde(default = "default_one")]
    pub nof_slots_per_frame_override: u32,
}

fn default_ten() -> u32 {
    10
}

/// Per-coreset cached derived parameters (TS 38.214 §5.1.2.2).
#[derive(Debug, Clone)]
pub struct CoresetDerived {
    pub cfg: CoresetCfg,
    pub prb_limits: PrbInterval,
    pub dci_1_0_prb_limits: PrbInterval,
    /// PRBs *outside* the usable region for DCI-1_0 + common SS.
    pub usable_common_ss_excluded_mask: u128,
    pub nof_cces: u32,
}

/// `C[slot_idx][aggr_idx] -> candidate CCE start positions`.
pub type CceLocTable = Vec<[Vec<u32>; MAX_NOF_AGGR_LEVELS]>;

/// Derive the candidate CCE start positions for one coreset/search-space
/// pair across every slot index and aggregation level, following the
/// structure of the TS 38.213 §10.1 `Y_p,ns,f` hashing sequence (not
/// bit-exact — the core owns no wire format — but deterministic and
/// collision-testable, which is all the allocator needs).
pub fn derive_cce_locations(coreset: &CoresetDerived, ss: &SearchSpaceCfg, rnti_hash: u32, nof_slots: u32) -> CceLocTable {
    const A_P: u64 = 39827;
    const D: u64 = 65537;
    let mut y = rnti_hash as u64 % D;
    let mut table = Vec::with_capacity(nof_slots as usize);
    for _slot in 0..nof_slots {
        y = (A_P * y) % D;
        let mut per_level: [Vec<u32>; MAX_NOF_AGGR_LEVELS] = Default::default();
        for (idx, &l) in AGGREGATION_LEVELS.iter().enumerate() {
            let n_cce_l = coreset.nof_cces / l;
            let m_max = ss.nof_candidates_at(idx);
            if n_cce_l == 0 || m_max == 0 {
                continue;
            }
            let mut starts = Vec::with_capacity(m_max as usize);
            for m in 0..m_max {
                let n_cce_idx = (y as u32 + (m * n_cce_l) / m_max.max(1)) % n_cce_l;
                starts.push(l * n_cce_idx);
            }
            per_level[idx] = starts;
        }
        table.push(per_level);
    }
    table
}

/// Fully derived, per-(re)configuration BWP parameters.
pub struct BwpParams {
    pub cfg: BwpCfg,
    pub p: u32,
    pub n_rbg: u32,
    pub nof_prb: u32,
    pub slots: Vec<SlotDirection>,
    pub pusch_ra_list: Vec<PuschTimeAllocRow>,
    pub coresets: Vec<CoresetDerived>,
    pub rar_cce_list: CceLocTable,
    pub common_cce_list: Vec<(u32, CceLocTable)>,
}

#[derive(Debug, Clone, Copy)]
pub struct SlotDirection {
    pub is_dl: bool,
    pub is_ul: bool,
}

/// RA-RNTI-equivalent seed used to derive the RAR search space's CCE table
/// (the RAR search space has no single RNTI; srsRAN uses 0).
const RAR_HASH_SEED: u32 = 0;
/// SI-RNTI (TS 38.321 Table 7.1-1: 0xFFFF) used to seed the SI CCE table.
const SI_RNTI_HASH_SEED: u32 = 0xFFFF;

impl BwpParams {
    pub fn derive(cfg: BwpCfg) -> Self {
        let p = rbg_size(cfg.rb_width, cfg.rbg_size_cfg1);
        let n_rbg = nof_rbgs(cfg.rb_width, cfg.start_rb, p);
        let nof_prb = cfg.rb_width;

        let nof_slots = SlotPoint::slots_per_frame(cfg.numerology_idx);

        let mut slots = Vec::with_capacity(nof_slots as usize);
        for _ in 0..nof_slots {
            // Without an explicit TDD pattern configured, default FDD: every
            // slot is both DL and UL capable at the BWP-config level (actual
            // half-duplex exclusivity is a PHY concern out of scope here).
            slots.push(SlotDirection { is_dl: true, is_ul: true });
        }

        let coresets: Vec<CoresetDerived> = cfg
            .coresets
            .iter()
            .map(|cs| {
                let prb_limits = PrbInterval::new(cs.start_rb, cs.start_rb + cs.length_rb);
                let mut dci_1_0_prb_limits = PrbInterval::new(cs.start_rb, cfg.rb_width);
                let mut excluded = 0u128;
                for rb in 0..cs.start_rb {
                    excluded |= 1u128 << rb;
                }
                if cfg.coresets.iter().any(|c| c.id == 0) {
                    // TS 38.214 §5.1.2.2.2: when CORESET#0 is configured,
                    // DCI-1_0 + common-SS RA type-1 allocations must stay
                    // within CORESET#0's own PRB range.
                    dci_1_0_prb_limits = prb_limits;
                    for rb in prb_limits.stop()..cfg.rb_width {
                        excluded |= 1u128 << rb;
                    }
                }
                let nof_cces = nof_freq_resources(cs) * cs.duration_symbols;
                CoresetDerived {
                    cfg: cs.clone(),
                    prb_limits,
                    dci_1_0_prb_limits,
                    usable_common_ss_excluded_mask: excluded,
                    nof_cces,
                }
            })
            .collect();

        let ra_ss = cfg
            .search_spaces
            .iter()
            .find(|ss| ss.id == cfg.ra_search_space_id)
            .expect("BWPs without a RA search space are not supported");
        let ra_coreset = coresets
            .iter()
            .find(|c| c.cfg.id == ra_ss.coreset_id)
            .expect("RA search space references unknown coreset");
        let rar_cce_list = derive_cce_locations(ra_coreset, ra_ss, RAR_HASH_SEED, nof_slots);

        let mut common_cce_list = Vec::new();
        for ss in cfg.search_spaces.iter().filter(|s| s.ss_type.is_common()) {
            if let Some(coreset) = coresets.iter().find(|c| c.cfg.id == ss.coreset_id) {
                let seed = if matches!(ss.ss_type, SearchSpaceType::Common0) { SI_RNTI_HASH_SEED } else { RAR_HASH_SEED };
                common_cce_list.push((ss.id, derive_cce_locations(coreset, ss, seed, nof_slots)));
            }
        }

        let pusch_ra_list = cfg.pusch_time_alloc.clone();

        Self { cfg, p, n_rbg, nof_prb, slots, pusch_ra_list, coresets, rar_cce_list, common_cce_list }
    }

    pub fn get_ss(&self, ss_id: u32) -> Option<&SearchSpaceCfg> {
        self.cfg.search_spaces.iter().find(|s| s.id == ss_id)
    }

    pub fn coreset_prb_range(&self, cs_id: u32) -> PrbInterval {
        self.coresets.iter().find(|c| c.cfg.id == cs_id).map(|c| c.prb_limits).unwrap_or_default()
    }

    pub fn dci_fmt_1_0_prb_lims(&self, cs_id: u32) -> PrbInterval {
        self.coresets.iter().find(|c| c.cfg.id == cs_id).map(|c| c.dci_1_0_prb_limits).unwrap_or_default()
    }

    pub fn dci_fmt_1_0_excluded_prbs(&self, cs_id: u32) -> u128 {
        self.coresets.iter().find(|c| c.cfg.id == cs_id).map(|c| c.usable_common_ss_excluded_mask).unwrap_or(0)
    }

    pub fn common_cce_locs(&self, ss_id: u32) -> Option<&CceLocTable> {
        self.common_cce_list.iter().find(|(id, _)| *id == ss_id).map(|(_, t)| t)
    }

    pub fn ra_coreset_id(&self) -> u32 {
        self.cfg.search_spaces.iter().find(|s| s.id == self.cfg.ra_search_space_id).map(|s| s.coreset_id).unwrap_or(0)
    }

    pub fn ra_search_space_id(&self) -> u32 {
        self.cfg.ra_search_space_id
    }
}

fn nof_freq_resources(cs: &CoresetCfg) -> u32 {
    (cs.length_rb / 6).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bwp() -> BwpCfg {
        BwpCfg {
            bwp_id: 0,
            start_rb: 0,
            rb_width: 100,
            numerology_idx: 0,
            rbg_size_cfg1: true,
            rar_window_size: 10,
            coresets: vec![CoresetCfg { id: 0, start_rb: 0, length_rb: 48, duration_symbols: 1 }],
            search_spaces: vec![
                SearchSpaceCfg {
                    id: 0,
                    coreset_id: 0,
                    ss_type: SearchSpaceType::Common0,
                    nof_candidates: default_nof_candidates(),
                    formats: vec![DciFormat::Dl10],
                },
                SearchSpaceCfg {
                    id: 1,
                    coreset_id: 0,
                    ss_type: SearchSpaceType::Common1,
                    nof_candidates: default_nof_candidates(),
                    formats: vec![DciFormat::Dl10],
                },
            ],
            ra_search_space_id: 1,
            pusch_time_alloc: vec![PuschTimeAllocRow { msg3_delay: 6, k: 4, s: 0, l: 14 }],
            nof_slots_per_frame_override: 1,
        }
    }

    #[test]
    fn derive_computes_rbg_params() {
        let params = BwpParams::derive(sample_bwp());
        assert_eq!(params.p, 16);
        assert_eq!(params.n_rbg, 7);
    }

    #[test]
    fn coreset0_forces_dci10_limits_to_coreset_range() {
        let params = BwpParams::derive(sample_bwp());
        let lims = params.dci_fmt_1_0_prb_lims(0);
        assert_eq!(lims, PrbInterval::new(0, 48));
    }

    #[test]
    fn rar_cce_table_has_entries_for_configured_levels() {
        let params = BwpParams::derive(sample_bwp());
        assert_eq!(params.rar_cce_list.len() as u32, SlotPoint::slots_per_frame(0));
        let agg2_idx = super::super::types::aggr_level_index(2).unwrap();
        assert!(!params.rar_cce_list[0][agg2_idx].is_empty());
    }
}
