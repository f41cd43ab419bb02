use heapless::Vec;

use crate::{
    dma::{DmaMapping, TxBuf},
    TxRxError, TxRxResult,
};

/// The id under which a pending transmission is known to the target.
///
/// This is called the MSDU id in the completion messages.
pub type SlotId = u16;
/// Identity of a frame, as assigned by the requester.
pub type FrameId = u32;

/// A frame, that can be handed to the [PendingTxTable].
pub trait TxFrame {
    /// Returns an id, which is unique among all frames currently owned by the driver.
    ///
    /// This is used to tell apart off-channel frames, which may be completed after the
    /// requester stopped waiting for them.
    fn frame_id(&self) -> FrameId;
}

/// A transmission, which was handed to the target and not yet completed.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingTx<F> {
    /// The frame itself. It is owned by the table until completion.
    pub frame: F,
    /// The mapping of the frame for the target.
    pub paddr: DmaMapping,
    /// The TX header buffer, if one was used.
    pub txbuf: Option<TxBuf>,
    /// The frame is transmitted on a channel other than the operating channel.
    pub is_offchan: bool,
    /// The requester didn't ask for an ACK, so the frame will never be reported as acked.
    pub no_ack_requested: bool,
}
impl<F> PendingTx<F> {
    pub const fn new(frame: F, paddr: DmaMapping) -> Self {
        Self {
            frame,
            paddr,
            txbuf: None,
            is_offchan: false,
            no_ack_requested: false,
        }
    }
    pub fn with_txbuf(self, txbuf: TxBuf) -> Self {
        Self {
            txbuf: Some(txbuf),
            ..self
        }
    }
    pub fn with_offchan(self, is_offchan: bool) -> Self {
        Self { is_offchan, ..self }
    }
    pub fn with_no_ack_requested(self, no_ack_requested: bool) -> Self {
        Self {
            no_ack_requested,
            ..self
        }
    }
}

/// The table of transmissions, which are currently owned by the target.
///
/// Every occupied slot holds exactly one [PendingTx]. Slots are handed out lowest first and
/// only become available again, once their occupant was taken out.
pub struct PendingTxTable<F, const SLOTS: usize> {
    slots: [Option<PendingTx<F>>; SLOTS],
    num_pending: usize,
    max_num_pending: usize,
}
impl<F, const SLOTS: usize> PendingTxTable<F, SLOTS> {
    const _ASSERT_SLOT_ID_RANGE: () = assert!(SLOTS <= SlotId::MAX as usize + 1);

    /// Create a new table.
    ///
    /// `max_num_pending` is clamped to `SLOTS`.
    pub fn new(max_num_pending: usize) -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::_ASSERT_SLOT_ID_RANGE;
        Self {
            slots: core::array::from_fn(|_| None),
            num_pending: 0,
            max_num_pending: max_num_pending.min(SLOTS),
        }
    }
    /// The maximum number of transmissions, that can be pending at once.
    pub const fn capacity(&self) -> usize {
        self.max_num_pending
    }
    /// The number of transmissions currently pending.
    pub const fn num_pending(&self) -> usize {
        self.num_pending
    }
    pub const fn is_empty(&self) -> bool {
        self.num_pending == 0
    }
    /// Place the transmission in the lowest free slot.
    ///
    /// If the table is exhausted, the transmission is returned to the caller alongside the
    /// error, so the frame can be requeued.
    pub fn alloc(&mut self, tx: PendingTx<F>) -> Result<SlotId, (TxRxError, PendingTx<F>)> {
        if self.num_pending >= self.max_num_pending {
            return Err((TxRxError::PoolExhausted, tx));
        }
        let Some(slot_id) = self.slots[..self.max_num_pending]
            .iter()
            .position(Option::is_none)
        else {
            return Err((TxRxError::PoolExhausted, tx));
        };
        self.slots[slot_id] = Some(tx);
        self.num_pending += 1;
        trace!("Allocated TX slot {}.", slot_id);
        Ok(slot_id as SlotId)
    }
    /// Returns the transmission in the slot, if it's occupied.
    pub fn get(&self, slot_id: SlotId) -> Option<&PendingTx<F>> {
        self.slots.get(slot_id as usize)?.as_ref()
    }
    /// Take the transmission out of its slot, which makes the slot available again.
    ///
    /// Fails with [TxRxError::InvalidSlot], if the slot is out of range or not occupied.
    pub fn take(&mut self, slot_id: SlotId) -> TxRxResult<PendingTx<F>> {
        let tx = self
            .slots
            .get_mut(slot_id as usize)
            .and_then(Option::take)
            .ok_or(TxRxError::InvalidSlot)?;
        self.num_pending -= 1;
        trace!("TX slot {} is now free again.", slot_id);
        Ok(tx)
    }
    /// Take all pending transmissions out of the table.
    pub fn take_all(&mut self) -> Vec<(SlotId, PendingTx<F>), SLOTS> {
        let mut taken = Vec::new();
        for (slot_id, slot) in self.slots.iter_mut().enumerate() {
            if let Some(tx) = slot.take() {
                // The vector has room for every slot.
                let _ = taken.push((slot_id as SlotId, tx));
            }
        }
        self.num_pending = 0;
        taken
    }
    /// Iterate over the ids of all occupied slots.
    pub fn slot_ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(slot_id, _)| slot_id as SlotId)
    }
}
