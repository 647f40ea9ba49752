//! NR downlink/uplink MAC scheduler core: PDCCH/PDSCH/PUSCH allocation,
//! HARQ bookkeeping, and the random-access/system-information/data
//! scheduling passes run once per slot per cell.
//!
//! The module layout mirrors the scheduler's own dependency order: resource
//! primitives and bookkeeping (`rb`, `slot`, `softbuffer`, `harq`,
//! `buffers`, `types`) come first, then per-BWP configuration (`bwp_cfg`),
//! then the allocators that consume it (`pdcch`, `sch`, `grid`), then the
//! scheduling passes built on the allocators (`rar`, `si`, `signalling`,
//! `timerr`, `ue`), and finally the per-cell and top-level drivers
//! (`worker`, `top`).

pub mod bwp_cfg;
pub mod buffers;
pub mod error;
pub mod grid;
pub mod harq;
pub mod pdcch;
pub mod rar;
pub mod rb;
pub mod sch;
pub mod si;
pub mod signalling;
pub mod slot;
pub mod softbuffer;
pub mod timerr;
pub mod top;
pub mod types;
pub mod ue;
pub mod worker;

#[cfg(test)]
mod tests;

pub use bwp_cfg::{BwpCfg, BwpParams, SchedArgs};
pub use error::{AllocResult, SchedConfigError};
pub use slot::SlotPoint;
pub use top::{EventManager, SchedEvent, SchedNr};
pub use ue::Ue;
pub use worker::CellWorker;
