//! # `wifi-txrx`
//! This is the TX completion and peer id bookkeeping core of a Wi-Fi driver, where the MAC runs
//! on a separate target (firmware) and the host talks to it over a message based transport.
//! ## Overview
//! This chapter will give a short overview of how the host and the target interact, and which
//! parts of that are handled here.
//!
//! ### Transmit (TX)
//! Every frame handed to the target is first placed in the [PendingTxTable], which assigns it an
//! MSDU id. The target later reports the fate of the frame, referring to it only by that id.
//! These reports arrive in batches, in an order unrelated to submission, and sometimes more than
//! once. Once a completion is processed, the DMA mapping and the TX header buffer of the frame
//! are released through the [TxHost] and the frame is handed back to the requester, together
//! with its final [TxStatus] and the [TxRate] it was sent at. When the last pending frame
//! completes, tasks waiting for the table to drain are woken.
//!
//! ### Off-channel TX
//! Frames sent on a channel other than the operating one (e.g. probe requests during a scan)
//! are awaited individually. Since the waiting side may give up before the target reports the
//! frame, the completion is only honoured, if it's for the frame currently awaited. All other
//! off-channel completions are considered stale.
//!
//! ### Peers
//! The target refers to remote stations by numeric peer ids, which it assigns and withdraws with
//! map and unmap events. A station can hold multiple ids at once, for example during handover.
//! The host side creates the [Peer] entry before asking the target to create the station and
//! then waits for it to become mapped. The same goes for deletion in reverse.
//!
//! ### Concurrency
//! All state lives in one [TxRx] context behind a blocking mutex. The event router runs in
//! whatever context the transport delivers events in and never suspends, while the waiting
//! functions are `async` and suspend the calling task. Waiting tasks are registered under the same
//! lock as the state they wait on, so a change can't slip by between checking and registering.

#![no_std]
pub(crate) mod fmt;

mod bitmap;
mod config;
mod dma;
mod htt;
mod peer;
mod pending;
mod rate;
mod sync;
mod txrx;

pub use bitmap::IdBitmap;
pub use config::TxRxConfig;
pub use dma::{DmaMapping, TxBuf};
pub use htt::{HttEvent, PeerMapEvent, PeerUnmapEvent, TxDone, TxDoneStatus};
pub use peer::{MacAddress, Peer, PeerId, PeerIdSet, PeerTable, VdevId, MAX_NUM_PEER_IDS};
pub use pending::{FrameId, PendingTx, PendingTxTable, SlotId, TxFrame};
pub use rate::{
    decode_tx_rate, PackedRateDecoder, Preamble, RateControlFlags, RateDecoder, TxRate,
    TxRateCode,
};
pub use sync::TxDoneSignal;
pub use txrx::*;

cfg_if::cfg_if! {
    if #[cfg(feature = "critical_section")] {
        type DefaultRawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    } else {
        type DefaultRawMutex = embassy_sync::blocking_mutex::raw::NoopRawMutex;
    }
}
