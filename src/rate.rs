//! Decoding of the rate information attached to a TX completion.
//!
//! The target reports the rate a frame was finally sent at as a packed rate code and a byte of
//! rate flags. Only the rate code layout is known with some certainty, so decoding is done
//! through the [RateDecoder] trait, which allows swapping the strategy per firmware.

use bitfield_struct::bitfield;
use macro_bits::{bit, check_bit, serializable_enum};

serializable_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    /// The modulation class encoded in the upper two bits of the rate code.
    pub enum Preamble: u8 {
        #[default]
        Ofdm => 0,
        Cck => 1,
        Ht => 2,
        Vht => 3
    }
}

#[bitfield(u8)]
#[derive(PartialEq, Eq, Hash)]
/// The rate code reported in a TX completion.
pub struct TxRateCode {
    #[bits(4)]
    pub rate_idx: u8,
    #[bits(2)]
    pub nss: u8,
    #[bits(2)]
    pub preamble: Preamble,
}

#[bitfield(u16)]
#[derive(PartialEq, Eq, Hash)]
/// Flags describing how the frame was transmitted.
pub struct RateControlFlags {
    pub short_preamble: bool,
    /// The index is an HT MCS.
    pub mcs: bool,
    /// The index is a VHT MCS, with the number of spatial streams in the upper nibble.
    pub vht_mcs: bool,
    pub width_40: bool,
    pub width_80: bool,
    pub width_160: bool,
    pub short_gi: bool,
    #[bits(9)]
    pub __: u16,
}
#[cfg(feature = "defmt")]
impl defmt::Format for RateControlFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "RateControlFlags({=u16:#x})", self.into_bits())
    }
}

/// The rate a frame was transmitted at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxRate {
    /// The rate index. Its meaning depends on the flags.
    pub idx: u8,
    /// The number of attempts at this rate.
    pub count: u8,
    pub flags: RateControlFlags,
}

/// A strategy for turning the raw rate information of a completion into a [TxRate].
pub trait RateDecoder {
    /// Decode the rate code and flags.
    ///
    /// This is only called, if at least one of them is non-zero.
    fn decode(&self, rate_code: u8, rate_flags: u8) -> TxRate;
}

/// The default [RateDecoder].
///
/// The rate code is interpreted as a [TxRateCode].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackedRateDecoder;
impl PackedRateDecoder {
    pub const FLAG_CCK: u8 = bit!(0);
    pub const FLAG_SGI: u8 = bit!(1);
    pub const FLAG_40MHZ: u8 = bit!(2);
    pub const FLAG_80MHZ: u8 = bit!(3);
    pub const FLAG_160MHZ: u8 = bit!(4);

    const PREAMBLE_MASK: u8 = 0xc0;
    /// Selects the CCK class and the short preamble bit of the rate index.
    const SHORT_PREAMBLE_MASK: u8 = 0xcc;
    const SHORT_PREAMBLE: u8 = 0x44;
}
impl RateDecoder for PackedRateDecoder {
    fn decode(&self, rate_code: u8, rate_flags: u8) -> TxRate {
        let code = TxRateCode::from_bits(rate_code);
        let mut idx = code.rate_idx();
        let mut flags = RateControlFlags::new();

        if rate_code & Self::SHORT_PREAMBLE_MASK == Self::SHORT_PREAMBLE {
            flags.set_short_preamble(true);
        }
        match rate_code & Self::PREAMBLE_MASK {
            0x80 => flags.set_mcs(true),
            0xc0 => {
                flags.set_vht_mcs(true);
                idx |= code.nss() << 4;
            }
            _ => {}
        }
        flags.set_width_40(check_bit!(rate_flags, Self::FLAG_40MHZ));
        flags.set_width_80(check_bit!(rate_flags, Self::FLAG_80MHZ));
        flags.set_width_160(check_bit!(rate_flags, Self::FLAG_160MHZ));
        flags.set_short_gi(check_bit!(rate_flags, Self::FLAG_SGI));

        TxRate {
            idx,
            count: 1,
            flags,
        }
    }
}

/// Decode the rate of a completion, if it carries rate information at all.
pub fn decode_tx_rate(
    decoder: &impl RateDecoder,
    rate_code: u8,
    rate_flags: u8,
) -> Option<TxRate> {
    (rate_code != 0 || rate_flags != 0).then(|| decoder.decode(rate_code, rate_flags))
}
