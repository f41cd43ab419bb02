use core::{
    cell::RefCell,
    future::poll_fn,
    mem,
    task::{Context, Poll},
};

use embassy_sync::{blocking_mutex, waitqueue::MultiWakerRegistration};
use embassy_time::{with_timeout, Duration};

use crate::{
    config::TxRxConfig,
    dma::{DmaMapping, TxBuf},
    htt::{HttEvent, PeerMapEvent, PeerUnmapEvent, TxDone, TxDoneStatus},
    peer::{MacAddress, Peer, PeerId, PeerTable, VdevId},
    pending::{FrameId, PendingTx, PendingTxTable, SlotId, TxFrame},
    rate::{decode_tx_rate, PackedRateDecoder, RateDecoder, TxRate},
    sync::TxDoneSignal,
    DefaultRawMutex,
};

/// The maximum number of tasks, which can wait on one condition at once.
///
/// If more tasks wait, all of them are woken early and re-register.
pub const MAX_WAITERS: usize = 4;

/// The final status of a transmission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxStatus {
    /// The frame was acknowledged by the receiver.
    Acked,
    /// The frame was transmitted, but not acknowledged.
    NoAck,
    /// The frame was dropped by the target.
    Discarded,
}
impl TxStatus {
    /// Derive the status of a completed transmission.
    pub const fn from_tx_done(tx_done: &TxDone, no_ack_requested: bool) -> Self {
        if tx_done.discard {
            Self::Discarded
        } else if no_ack_requested || tx_done.no_ack {
            Self::NoAck
        } else {
            Self::Acked
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxRxError {
    /// All TX slots are in use.
    PoolExhausted,
    /// The slot is out of range or not occupied.
    InvalidSlot,
    /// No peer with that address exists on the link.
    UnknownPeer,
    /// The peer id isn't assigned to any peer.
    UnknownId,
    TimedOut,
    /// An off-channel completion was for a frame, that is no longer awaited.
    StaleCompletion,
    PeerExists,
    PeerTableFull,
    PeerIdOutOfRange,
}

pub type TxRxResult<T> = Result<T, TxRxError>;

/// The lower layers of the driver, which the core hands resources back to.
///
/// None of these are called, while the state of the core is locked.
pub trait TxHost {
    type Frame: TxFrame;

    /// Release the DMA mapping of a frame.
    fn dma_unmap(&self, mapping: DmaMapping);
    /// Return a TX header buffer to its pool.
    fn txbuf_free(&self, txbuf: TxBuf);
    /// Report the fate of a frame to the requester.
    ///
    /// Ownership of the frame is passed back with this.
    fn tx_completed(&self, frame: Self::Frame, status: TxStatus, rate: Option<TxRate>);
}

/// The state protected by the lock of [TxRx].
pub struct TxRxState<F, const SLOTS: usize, const PEERS: usize> {
    pub pending_tx: PendingTxTable<F, SLOTS>,
    pub peers: PeerTable<PEERS>,
    offchan_tx_frame: Option<FrameId>,
    tx_empty_waiters: MultiWakerRegistration<MAX_WAITERS>,
    peer_mapping_waiters: MultiWakerRegistration<MAX_WAITERS>,
}
impl<F, const SLOTS: usize, const PEERS: usize> TxRxState<F, SLOTS, PEERS> {
    pub fn new(max_num_pending_tx: usize) -> Self {
        Self {
            pending_tx: PendingTxTable::new(max_num_pending_tx),
            peers: PeerTable::new(),
            offchan_tx_frame: None,
            tx_empty_waiters: MultiWakerRegistration::new(),
            peer_mapping_waiters: MultiWakerRegistration::new(),
        }
    }
    /// The off-channel frame currently awaited, if any.
    pub const fn offchan_tx_active(&self) -> Option<FrameId> {
        self.offchan_tx_frame
    }
    /// Check the completed off-channel frame against the one currently awaited.
    ///
    /// On a match, the frame is no longer awaited. Otherwise nothing changes.
    pub fn report_offchan_tx(&mut self, frame_id: FrameId) -> TxRxResult<()> {
        if self.offchan_tx_frame != Some(frame_id) {
            return Err(TxRxError::StaleCompletion);
        }
        self.offchan_tx_frame = None;
        Ok(())
    }
    fn take_tx_empty_waiters(&mut self) -> MultiWakerRegistration<MAX_WAITERS> {
        mem::replace(&mut self.tx_empty_waiters, MultiWakerRegistration::new())
    }
    fn take_peer_mapping_waiters(&mut self) -> MultiWakerRegistration<MAX_WAITERS> {
        mem::replace(&mut self.peer_mapping_waiters, MultiWakerRegistration::new())
    }
}

/// A transmission taken out of the table, which still has to be released.
struct CompletedTx<F> {
    tx: PendingTx<F>,
    status: TxStatus,
    rate: Option<TxRate>,
}

/// The shared TX/RX completion context.
///
/// The router functions (`on_*` and [TxRx::handle_event]) never suspend and can be called from
/// interrupt context, as long as the `critical_section` feature is enabled. The `wait_*`
/// functions suspend the calling task, until the condition is met or they time out.
pub struct TxRx<H: TxHost, const SLOTS: usize, const PEERS: usize, D = PackedRateDecoder> {
    host: H,
    rate_decoder: D,
    config: TxRxConfig,
    state: blocking_mutex::Mutex<DefaultRawMutex, RefCell<TxRxState<H::Frame, SLOTS, PEERS>>>,
    offchan_tx_completed: TxDoneSignal,
}
impl<H: TxHost, const SLOTS: usize, const PEERS: usize> TxRx<H, SLOTS, PEERS> {
    /// Create a new context, which uses the [PackedRateDecoder].
    pub fn new(host: H, config: TxRxConfig) -> Self {
        Self::with_rate_decoder(host, PackedRateDecoder, config)
    }
}
impl<H: TxHost, const SLOTS: usize, const PEERS: usize, D: RateDecoder>
    TxRx<H, SLOTS, PEERS, D>
{
    pub fn with_rate_decoder(host: H, rate_decoder: D, config: TxRxConfig) -> Self {
        Self {
            host,
            rate_decoder,
            config,
            state: blocking_mutex::Mutex::new(RefCell::new(TxRxState::new(
                config.max_num_pending_tx,
            ))),
            offchan_tx_completed: TxDoneSignal::new(),
        }
    }
    pub const fn config(&self) -> &TxRxConfig {
        &self.config
    }
    pub const fn host(&self) -> &H {
        &self.host
    }
    /// Run the closure with the state locked.
    fn with_state<R>(&self, f: impl FnOnce(&mut TxRxState<H::Frame, SLOTS, PEERS>) -> R) -> R {
        self.state.lock(|state| f(&mut *state.borrow_mut()))
    }

    // TX

    /// The maximum number of transmissions, that can be pending at once.
    pub fn max_num_pending_tx(&self) -> usize {
        self.with_state(|state| state.pending_tx.capacity())
    }
    /// The number of transmissions currently pending.
    pub fn tx_pending(&self) -> usize {
        self.with_state(|state| state.pending_tx.num_pending())
    }
    pub fn tx_is_empty(&self) -> bool {
        self.with_state(|state| state.pending_tx.is_empty())
    }
    /// Hand a transmission to the core, before passing it to the target.
    ///
    /// Returns the id, which the target will use to report the completion. If all slots are in
    /// use, the transmission is returned alongside [TxRxError::PoolExhausted].
    pub fn tx_submit(
        &self,
        tx: PendingTx<H::Frame>,
    ) -> Result<SlotId, (TxRxError, PendingTx<H::Frame>)> {
        let frame_id = tx.frame.frame_id();
        let slot_id = self.with_state(|state| state.pending_tx.alloc(tx))?;
        trace!("Submitted frame {} with MSDU id {}.", frame_id, slot_id);
        Ok(slot_id)
    }
    /// Release all resources of a completed transmission and report it to the requester.
    fn release_tx(&self, completed: CompletedTx<H::Frame>) {
        let CompletedTx { tx, status, rate } = completed;
        self.host.dma_unmap(tx.paddr);
        if let Some(txbuf) = tx.txbuf {
            self.host.txbuf_free(txbuf);
        }
        self.host.tx_completed(tx.frame, status, rate);
    }
    /// Check the off-channel frame and fire the signal on a match.
    fn complete_offchan_tx(
        state: &mut TxRxState<H::Frame, SLOTS, PEERS>,
        signal: &TxDoneSignal,
        frame_id: FrameId,
    ) {
        match state.report_offchan_tx(frame_id) {
            Ok(()) => {
                debug!("Completed off-channel frame {}.", frame_id);
                // This happens under the lock, so a following offchan_tx_begin can't be
                // overtaken by the signal.
                signal.signal();
            }
            Err(_) => warn!("Completed stale off-channel frame {}.", frame_id),
        }
    }
    /// Process the completion of a single transmission.
    ///
    /// Fails with [TxRxError::InvalidSlot], if no transmission is pending on the MSDU id. This
    /// happens for duplicated completions and is otherwise harmless.
    pub fn on_tx_completion(&self, tx_done: &TxDone) -> TxRxResult<()> {
        debug!(
            "TX completion MSDU id {} discard {} no_ack {}.",
            tx_done.msdu_id,
            tx_done.discard,
            tx_done.no_ack
        );
        let (completed, mut tx_empty_waiters) = self
            .with_state(|state| {
                let tx = state.pending_tx.take(tx_done.msdu_id)?;
                if tx.is_offchan {
                    Self::complete_offchan_tx(
                        state,
                        &self.offchan_tx_completed,
                        tx.frame.frame_id(),
                    );
                }
                let tx_empty_waiters = state
                    .pending_tx
                    .is_empty()
                    .then(|| state.take_tx_empty_waiters());
                Ok::<_, TxRxError>((tx, tx_empty_waiters))
            })
            .inspect_err(|_| {
                warn!("No TX pending on MSDU id {}, ignoring.", tx_done.msdu_id);
            })
            .map(|(tx, waiters)| {
                let status = TxStatus::from_tx_done(tx_done, tx.no_ack_requested);
                let rate = if status == TxStatus::Discarded {
                    None
                } else {
                    decode_tx_rate(&self.rate_decoder, tx_done.rate_code, tx_done.rate_flags)
                };
                (CompletedTx { tx, status, rate }, waiters)
            })?;
        self.release_tx(completed);
        if let Some(waiters) = tx_empty_waiters.as_mut() {
            waiters.wake();
        }
        Ok(())
    }
    /// Process a batch of completions, which share one status.
    ///
    /// Returns the number of transmissions, that were completed.
    pub fn on_tx_completion_batch(&self, status: TxDoneStatus, msdu_ids: &[SlotId]) -> usize {
        msdu_ids
            .iter()
            .filter(|msdu_id| {
                self.on_tx_completion(&TxDone::from_status(**msdu_id, status))
                    .is_ok()
            })
            .count()
    }
    /// Discard all pending transmissions.
    ///
    /// This is used on shutdown, when the target will never report the remaining completions.
    /// Returns the number of transmissions discarded.
    pub fn tx_cleanup_pending(&self) -> usize {
        let (pending, mut tx_empty_waiters) = self.with_state(|state| {
            let pending = state.pending_tx.take_all();
            for (_, tx) in pending.iter().filter(|(_, tx)| tx.is_offchan) {
                Self::complete_offchan_tx(
                    state,
                    &self.offchan_tx_completed,
                    tx.frame.frame_id(),
                );
            }
            (pending, state.take_tx_empty_waiters())
        });
        let discarded = pending.len();
        for (slot_id, tx) in pending {
            debug!("Discarding pending TX with MSDU id {}.", slot_id);
            self.release_tx(CompletedTx {
                tx,
                status: TxStatus::Discarded,
                rate: None,
            });
        }
        if discarded != 0 {
            info!("Discarded {} pending transmissions.", discarded);
        }
        tx_empty_waiters.wake();
        discarded
    }
    /// Wait for all pending transmissions to complete.
    pub async fn wait_tx_empty(&self, timeout: Duration) -> TxRxResult<()> {
        with_timeout(
            timeout,
            poll_fn(|cx| {
                self.with_state(|state| {
                    if state.pending_tx.is_empty() {
                        Poll::Ready(())
                    } else {
                        state.tx_empty_waiters.register(cx.waker());
                        Poll::Pending
                    }
                })
            }),
        )
        .await
        .map_err(|_| TxRxError::TimedOut)
    }
    /// Wait for all pending transmissions to complete, using the configured flush timeout.
    pub async fn tx_flush(&self) -> TxRxResult<()> {
        self.wait_tx_empty(self.config.tx_flush_timeout)
            .await
            .inspect_err(|_| {
                warn!(
                    "Timed out flushing TX, {} transmissions still pending.",
                    self.tx_pending()
                )
            })
    }

    // Off-channel TX

    /// Mark the frame as the off-channel frame to wait for.
    ///
    /// This must be called before the frame is submitted.
    pub fn offchan_tx_begin(&self, frame_id: FrameId) {
        self.with_state(|state| {
            if let Some(previous) = state.offchan_tx_frame.replace(frame_id) {
                warn!(
                    "Off-channel frame {} is still active, replacing it with {}.",
                    previous,
                    frame_id
                );
            }
            self.offchan_tx_completed.reset();
        });
    }
    /// Wait for the off-channel frame to complete.
    ///
    /// On timeout the frame stays active. Call [TxRx::offchan_tx_abort] to stop waiting for it.
    pub async fn wait_offchan_tx_completed(&self, timeout: Duration) -> TxRxResult<()> {
        with_timeout(timeout, self.offchan_tx_completed.wait())
            .await
            .map_err(|_| TxRxError::TimedOut)
    }
    /// [TxRx::wait_offchan_tx_completed] with the configured timeout.
    pub async fn wait_offchan_tx(&self) -> TxRxResult<()> {
        self.wait_offchan_tx_completed(self.config.offchan_tx_timeout)
            .await
    }
    /// Stop waiting for the off-channel frame.
    ///
    /// A completion arriving later is treated as stale. Returns the frame, that was active.
    pub fn offchan_tx_abort(&self) -> Option<FrameId> {
        let aborted = self.with_state(|state| state.offchan_tx_frame.take());
        if let Some(frame_id) = aborted {
            debug!("Aborted off-channel frame {}.", frame_id);
        }
        aborted
    }
    /// The off-channel frame currently awaited, if any.
    pub fn offchan_tx_active(&self) -> Option<FrameId> {
        self.with_state(|state| state.offchan_tx_active())
    }

    // Peers

    /// Run the closure with the peer, while the state is locked.
    ///
    /// The closure must not call back into this context.
    pub fn with_peer<R>(
        &self,
        vdev_id: VdevId,
        addr: &MacAddress,
        f: impl FnOnce(Option<&Peer>) -> R,
    ) -> R {
        self.with_state(|state| f(state.peers.find(vdev_id, addr)))
    }
    /// Run the closure with the peer table, while the state is locked.
    pub fn with_peers<R>(&self, f: impl FnOnce(&PeerTable<PEERS>) -> R) -> R {
        self.with_state(|state| f(&state.peers))
    }
    /// Find the peer, that currently owns the id.
    pub fn peer_find_by_id(&self, peer_id: PeerId) -> Option<Peer> {
        self.with_state(|state| state.peers.find_by_id(peer_id).cloned())
    }
    pub fn peer_count(&self) -> usize {
        self.with_state(|state| state.peers.len())
    }
    /// Add a peer, which the target is about to create.
    pub fn peer_insert(&self, vdev_id: VdevId, addr: MacAddress) -> TxRxResult<()> {
        self.with_state(|state| state.peers.insert(vdev_id, addr))?;
        debug!("Added peer {:?} on vdev {}.", addr, vdev_id);
        Ok(())
    }
    /// Remove a peer.
    ///
    /// Tasks waiting for the mapping state of the peer are woken.
    pub fn peer_remove(&self, vdev_id: VdevId, addr: &MacAddress) -> TxRxResult<Peer> {
        let (peer, mut waiters) = self.with_state(|state| {
            let peer = state.peers.remove(vdev_id, addr)?;
            Ok::<_, TxRxError>((peer, state.take_peer_mapping_waiters()))
        })?;
        if peer.is_mapped() {
            warn!(
                "Removed peer {:?} on vdev {}, which still had {} ids mapped.",
                addr,
                vdev_id,
                peer.peer_ids().len()
            );
        } else {
            debug!("Removed peer {:?} on vdev {}.", addr, vdev_id);
        }
        waiters.wake();
        Ok(peer)
    }
    /// Remove all peers of a link.
    ///
    /// Returns the number of peers removed.
    pub fn peer_cleanup(&self, vdev_id: VdevId) -> usize {
        let (removed, waiters) = self.with_state(|state| {
            let removed = state.peers.cleanup(vdev_id, |peer| {
                if peer.is_mapped() {
                    warn!(
                        "Removing peer {:?} on vdev {}, which is still mapped.",
                        peer.addr(),
                        vdev_id
                    );
                }
            });
            (removed, (removed != 0).then(|| state.take_peer_mapping_waiters()))
        });
        if let Some(mut waiters) = waiters {
            debug!("Removed {} peers on vdev {}.", removed, vdev_id);
            waiters.wake();
        }
        removed
    }
    /// The target assigned an id to a peer.
    pub fn on_peer_map(&self, event: &PeerMapEvent) -> TxRxResult<()> {
        let mut waiters = self
            .with_state(|state| {
                state
                    .peers
                    .map_id(event.vdev_id, &event.addr, event.peer_id)?;
                Ok::<_, TxRxError>(state.take_peer_mapping_waiters())
            })
            .inspect_err(|err| {
                warn!(
                    "Failed to map peer {:?} on vdev {} to id {}: {:?}",
                    event.addr,
                    event.vdev_id,
                    event.peer_id,
                    err
                );
            })?;
        debug!(
            "Mapped peer {:?} on vdev {} to id {}.",
            event.addr,
            event.vdev_id,
            event.peer_id
        );
        waiters.wake();
        Ok(())
    }
    /// The target withdrew a peer id.
    pub fn on_peer_unmap(&self, event: &PeerUnmapEvent) -> TxRxResult<()> {
        let waiters = self
            .with_state(|state| {
                let unmapped = state.peers.unmap_id(event.peer_id)?;
                Ok::<_, TxRxError>(unmapped.then(|| state.take_peer_mapping_waiters()))
            })
            .inspect_err(|_| {
                warn!("Unmap event for unknown peer id {}.", event.peer_id);
            })?;
        debug!("Unmapped peer id {}.", event.peer_id);
        if let Some(mut waiters) = waiters {
            waiters.wake();
        }
        Ok(())
    }
    fn poll_peer_mapping(
        &self,
        cx: &mut Context<'_>,
        vdev_id: VdevId,
        addr: &MacAddress,
        expect_mapped: bool,
    ) -> Poll<()> {
        self.with_state(|state| {
            let mapped = state
                .peers
                .find(vdev_id, addr)
                .is_some_and(Peer::is_mapped);
            if mapped == expect_mapped {
                Poll::Ready(())
            } else {
                state.peer_mapping_waiters.register(cx.waker());
                Poll::Pending
            }
        })
    }
    /// Wait for the peer to reach the mapping state.
    ///
    /// A peer, that doesn't exist, counts as unmapped.
    pub async fn wait_for_peer_common(
        &self,
        vdev_id: VdevId,
        addr: &MacAddress,
        expect_mapped: bool,
        timeout: Duration,
    ) -> TxRxResult<()> {
        with_timeout(
            timeout,
            poll_fn(|cx| self.poll_peer_mapping(cx, vdev_id, addr, expect_mapped)),
        )
        .await
        .map_err(|_| TxRxError::TimedOut)
    }
    /// Wait for the target to assign an id to the peer.
    pub async fn wait_for_peer_created(
        &self,
        vdev_id: VdevId,
        addr: &MacAddress,
    ) -> TxRxResult<()> {
        self.wait_for_peer_common(vdev_id, addr, true, self.config.peer_wait_timeout)
            .await
    }
    /// Wait for the target to withdraw all ids of the peer.
    pub async fn wait_for_peer_deleted(
        &self,
        vdev_id: VdevId,
        addr: &MacAddress,
    ) -> TxRxResult<()> {
        self.wait_for_peer_common(vdev_id, addr, false, self.config.peer_wait_timeout)
            .await
    }

    /// Dispatch an event from the target.
    ///
    /// Events referring to state, that doesn't exist (anymore), are dropped with a warning.
    /// Returns `false`, if the event was dropped.
    pub fn handle_event(&self, event: &HttEvent) -> bool {
        let result = match event {
            HttEvent::TxCompletion(tx_done) => self.on_tx_completion(tx_done),
            HttEvent::PeerMap(event) => self.on_peer_map(event),
            HttEvent::PeerUnmap(event) => self.on_peer_unmap(event),
        };
        // Failures are already logged by the handlers.
        result.is_ok()
    }
}
