//! Handles for the DMA resources attached to a pending transmission.
//!
//! Allocating and mapping these is done by the bus layer. The core only carries them along with
//! the frame and hands them back through [TxHost](crate::TxHost), once the target reported the
//! fate of the frame.

/// A frame mapped for device access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaMapping {
    /// The bus address, at which the target reads the frame.
    pub paddr: u32,
    /// The length of the mapped region.
    pub len: u16,
}
impl DmaMapping {
    pub const fn new(paddr: u32, len: u16) -> Self {
        Self { paddr, len }
    }
}

/// A TX header buffer taken from the descriptor pool.
///
/// Not every frame needs one, management frames for example are sent by reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxBuf {
    /// Index of the buffer inside the pool.
    pub index: u16,
    /// The bus address of the buffer.
    pub paddr: u32,
}
impl TxBuf {
    pub const fn new(index: u16, paddr: u32) -> Self {
        Self { index, paddr }
    }
}
