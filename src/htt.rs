//! Decoded host/target transport events.
//!
//! The bus layer parses the raw messages from the target and hands them to
//! [TxRx::handle_event](crate::TxRx::handle_event) in this form.

use macro_bits::serializable_enum;

use crate::{
    peer::{MacAddress, PeerId, VdevId},
    pending::SlotId,
};

serializable_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    /// The status shared by all MSDUs of one completion batch.
    pub enum TxDoneStatus: u8 {
        #[default]
        Ok => 0,
        Discard => 1,
        NoAck => 2,
        Postpone => 3,
        DownloadFail => 128
    }
}
impl TxDoneStatus {
    /// Interpret the raw status of a batch.
    ///
    /// Statuses, which don't indicate, that the frame left the target, are treated as a
    /// discard.
    pub fn from_raw(raw: u8) -> Self {
        match Self::from_bits(raw) {
            status @ (Self::Ok | Self::Discard | Self::NoAck) => status,
            Self::Postpone | Self::DownloadFail => Self::Discard,
            #[allow(unreachable_patterns)]
            _ => {
                warn!("Unknown TX completion status {}, treating it as discard.", raw);
                Self::Discard
            }
        }
    }
    pub const fn is_discard(&self) -> bool {
        matches!(self, Self::Discard | Self::Postpone | Self::DownloadFail)
    }
    pub const fn is_no_ack(&self) -> bool {
        matches!(self, Self::NoAck)
    }
}

/// The outcome of a single transmission, as reported by the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxDone {
    /// The slot of the transmission.
    pub msdu_id: SlotId,
    /// The frame was dropped without being transmitted.
    pub discard: bool,
    /// The frame was transmitted, but no ACK was received.
    pub no_ack: bool,
    pub rate_code: u8,
    pub rate_flags: u8,
}
impl TxDone {
    /// Create the completion of one MSDU from a batch status.
    pub const fn from_status(msdu_id: SlotId, status: TxDoneStatus) -> Self {
        Self {
            msdu_id,
            discard: status.is_discard(),
            no_ack: status.is_no_ack(),
            rate_code: 0,
            rate_flags: 0,
        }
    }
    pub const fn with_rate(self, rate_code: u8, rate_flags: u8) -> Self {
        Self {
            rate_code,
            rate_flags,
            ..self
        }
    }
}

/// The target assigned an id to a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerMapEvent {
    pub vdev_id: VdevId,
    pub addr: MacAddress,
    pub peer_id: PeerId,
}

/// The target withdrew a peer id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerUnmapEvent {
    pub peer_id: PeerId,
}

/// An event from the target, which concerns the data path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HttEvent {
    TxCompletion(TxDone),
    PeerMap(PeerMapEvent),
    PeerUnmap(PeerUnmapEvent),
}
