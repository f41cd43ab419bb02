use embassy_time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Runtime parameters of the [TxRx](crate::TxRx) core.
pub struct TxRxConfig {
    /// The maximum number of transmissions, that may be pending at once.
    ///
    /// This is clamped to the slot capacity of the core.
    pub max_num_pending_tx: usize,
    /// How long to wait for the target to map or unmap a peer.
    pub peer_wait_timeout: Duration,
    /// How long to wait for an off-channel transmission to complete.
    pub offchan_tx_timeout: Duration,
    /// How long to wait for all pending transmissions to complete, before giving up on a flush.
    pub tx_flush_timeout: Duration,
}
impl Default for TxRxConfig {
    fn default() -> Self {
        Self {
            max_num_pending_tx: usize::MAX,
            peer_wait_timeout: Duration::from_secs(3),
            offchan_tx_timeout: Duration::from_secs(3),
            tx_flush_timeout: Duration::from_secs(5),
        }
    }
}
