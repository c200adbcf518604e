//! Identifier and DLC register encoding.
//!
//! Buffers, filters and masks all store a CAN identifier in four consecutive
//! registers, `SIDH`, `SIDL`, `EID8` and `EID0`:
//!
//! ```text
//! SIDH  SID10 SID9 SID8 SID7 SID6 SID5 SID4 SID3
//! SIDL  SID2  SID1 SID0 SRR  EXIDE  -  EID17 EID16
//! EID8  EID15 .. EID8
//! EID0  EID7  .. EID0
//! ```
//!
//! A standard identifier uses the `SID` bits only. An extended identifier
//! places its upper 11 bits in `SID` and its lower 18 bits in `EID`, with
//! `EXIDE` set.

use embedded_hal::can::{ExtendedId, Id, StandardId};
use modular_bitfield::prelude::*;

/// Identifier block (`SIDH`, `SIDL`, `EID8`, `EID0`, in that order).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IdRegs {
    /// Standard identifier bits 10..3.
    pub sidh: u8,
    /// Extended identifier bits 17..16.
    pub eid_hi: B2,
    #[skip]
    __: B1,
    /// Extended identifier enable.
    pub exide: bool,
    #[skip]
    __: B1,
    /// Standard identifier bits 2..0.
    pub sid_lo: B3,
    /// Extended identifier bits 15..8.
    pub eid8: u8,
    /// Extended identifier bits 7..0.
    pub eid0: u8,
}

impl IdRegs {
    /// `EXIDE` bit inside the `SIDL` register.
    pub const EXIDE: u8 = 0b0000_1000;

    /// Encodes a CAN ID.
    pub fn from_id(id: Id) -> Self {
        match id {
            Id::Standard(id) => Self::from_std(id.as_raw()),
            Id::Extended(id) => {
                let raw = id.as_raw();
                let high = (raw >> 16) as u16;
                Self::new()
                    .with_sidh((high >> 5) as u8)
                    .with_sid_lo(((high >> 2) & 0b111) as u8)
                    .with_exide(true)
                    .with_eid_hi((high & 0b11) as u8)
                    .with_eid8((raw >> 8) as u8)
                    .with_eid0(raw as u8)
            }
        }
    }

    /// Encodes an 11-bit standard identifier. Bits above bit 10 are ignored.
    pub fn from_std(id: u16) -> Self {
        Self::new()
            .with_sidh((id >> 3) as u8)
            .with_sid_lo((id & 0b111) as u8)
    }

    /// Decodes the CAN ID. `EXIDE` decides between a standard and an
    /// extended identifier.
    pub fn id(&self) -> Option<Id> {
        let sid = (u32::from(self.sidh()) << 3) | u32::from(self.sid_lo());
        if self.exide() {
            let raw = (sid << 18)
                | (u32::from(self.eid_hi()) << 16)
                | (u32::from(self.eid8()) << 8)
                | u32::from(self.eid0());
            ExtendedId::new(raw).map(Id::Extended)
        } else {
            StandardId::new(sid as u16).map(Id::Standard)
        }
    }
}

/// Data length code register.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DlcReg {
    pub dlc: B4,
    #[skip]
    __: B2,
    /// Remote transmission request.
    pub rtr: bool,
    #[skip]
    __: B1,
}

impl DlcReg {
    /// Largest number of data bytes in a classic CAN frame.
    pub const MAX_LEN: u8 = 8;

    /// Encodes a DLC, clamping it to 8.
    pub fn encode(dlc: u8, rtr: bool) -> Self {
        Self::new().with_dlc(dlc.min(Self::MAX_LEN)).with_rtr(rtr)
    }

    /// Data length, clamped to 8.
    pub fn data_len(&self) -> u8 {
        self.dlc().min(Self::MAX_LEN)
    }
}
