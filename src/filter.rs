//! Acceptance masks and filters.
//!
//! RXB0 is governed by mask 0 and filters 0-1, RXB1 by mask 1 and filters
//! 2-5. The chip only accepts writes to these registers in configuration
//! mode.

use core::fmt::Debug;

use embedded_hal::{blocking::spi::Transfer, can::Id, digital::v2::OutputPin};
use embedded_time::Clock;
use log::{debug, warn};

use crate::{
    error::Result,
    ident::IdRegs,
    regs::{OpMode, Register},
    MCP2515,
};

/// Identifiers accepted by the receive buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum IdMode {
    /// Standard and extended identifiers, subject to masks and filters.
    All,
    /// Standard identifiers. The chip has no separate mode for this, masks
    /// and filters stay on as with [`IdMode::All`].
    Standard,
    /// Extended identifiers. Behaves as [`IdMode::All`], see
    /// [`IdMode::Standard`].
    Extended,
    /// Masks and filters off, every message is received.
    Any,
}

crate::register_set! {
    /// Receive filters.
    RxFilter => {
        /// RXF0
        F0 => Register::RXF0SIDH,
        /// RXF1
        F1 => Register::RXF1SIDH,
        /// RXF2
        F2 => Register::RXF2SIDH,
        /// RXF3
        F3 => Register::RXF3SIDH,
        /// RXF4
        F4 => Register::RXF4SIDH,
        /// RXF5
        F5 => Register::RXF5SIDH
    }
}

impl RxFilter {
    /// Filter by number, `None` outside 0-5.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }
}

crate::register_set! {
    /// Receive masks.
    RxMask => {
        /// Mask 0, applies to RXB0.
        Mask0 => Register::RXM0SIDH,
        /// Mask 1, applies to RXB1.
        Mask1 => Register::RXM1SIDH
    }
}

impl<SPI, CS, CLK, SPIE, CSE> MCP2515<SPI, CS, CLK>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    /// Sets a receive filter.
    ///
    /// # Parameters
    ///
    /// * `filter` - The filter to action on.
    /// * `id` - The actual ID filter to apply to `filter`.
    pub fn set_filter(&mut self, filter: RxFilter, id: Id) -> Result<(), SPIE, CSE> {
        self.write_registers(filter.sidh(), &IdRegs::from_id(id).into_bytes())
    }

    /// Sets a receive mask.
    ///
    /// # Parameters
    ///
    /// * `mask` - The mask to action on.
    /// * `id` - The actual ID mask to apply to `mask`.
    pub fn set_mask(&mut self, mask: RxMask, id: Id) -> Result<(), SPIE, CSE> {
        self.write_registers(mask.sidh(), &IdRegs::from_id(id).into_bytes())
    }

    /// Sets both masks to standard identifier masks.
    ///
    /// Switches to configuration mode, writes the masks and switches back to
    /// the mode last selected with [`set_mode`](Self::set_mode). If
    /// configuration mode cannot be reached the masks are written anyway.
    ///
    /// # Parameters
    ///
    /// * `mask0` - 11-bit mask for RXB0.
    /// * `mask1` - 11-bit mask for RXB1. `0` reuses `mask0`.
    ///
    /// # Returns
    ///
    /// A [`FilterChain`] to continue with the filters.
    pub fn set_std_masks(
        &mut self,
        mask0: u16,
        mask1: u16,
    ) -> Result<FilterChain<'_, SPI, CS, CLK>, SPIE, CSE> {
        let restore = self.mode;
        if let Err(e) = self.switch_mode(OpMode::Configuration) {
            warn!("Writing masks outside of configuration mode: {:?}", e);
        }

        let mask1 = if mask1 == 0 { mask0 } else { mask1 };
        self.write_std_id(RxMask::Mask0.sidh(), mask0)?;
        self.write_std_id(RxMask::Mask1.sidh(), mask1)?;

        self.switch_mode(restore)?;
        Ok(FilterChain { mcp: self })
    }

    /// Sets filter `index` (0-5) to a standard identifier. Other indices are
    /// ignored.
    ///
    /// Only `SIDH` and `SIDL` are written. The current mode is kept.
    pub fn set_std_filter(&mut self, index: u8, id: u16) -> Result<(), SPIE, CSE> {
        match RxFilter::from_index(index) {
            Some(filter) => self.write_std_id(filter.sidh(), id),
            None => {
                debug!("No receive filter {}", index);
                Ok(())
            }
        }
    }

    fn write_std_id(&mut self, sidh: Register, id: u16) -> Result<(), SPIE, CSE> {
        let regs = IdRegs::from_std(id).into_bytes();
        self.write_registers(sidh, &regs[..2])
    }
}

/// Sets standard filters one after another, returned by
/// [`MCP2515::set_std_masks`].
pub struct FilterChain<'a, SPI, CS, CLK> {
    mcp: &'a mut MCP2515<SPI, CS, CLK>,
}

impl<'a, SPI, CS, CLK, SPIE, CSE> FilterChain<'a, SPI, CS, CLK>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    /// See [`MCP2515::set_std_filter`].
    pub fn filter(self, index: u8, id: u16) -> Result<Self, SPIE, CSE> {
        self.mcp.set_std_filter(index, id)?;
        Ok(self)
    }
}
