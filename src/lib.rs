#![cfg_attr(not(test), no_std)]

//! Polling driver for the MCP2515 stand-alone CAN controller.
//!
//! The driver talks to the chip over SPI and never relies on its interrupt
//! pin: receive and transmit state is polled through the status registers,
//! and every wait is bounded by a deadline taken from an
//! [`embedded_time::Clock`].

pub mod buffer;
pub mod error;
pub mod filter;
pub mod frame;
pub mod ident;
pub(crate) mod macros;
mod mode;
mod receive;
pub mod regs;
pub mod stat;
pub mod timing;
mod transmit;

#[cfg(test)]
pub(crate) mod mocks;
#[cfg(test)]
mod tests;

use core::fmt::Debug;

use embedded_hal::{
    blocking::{delay::DelayMs, spi::Transfer},
    can::{ExtendedId, Id, StandardId},
    digital::v2::OutputPin,
};
use embedded_time::{duration::Microseconds, Clock, Instant};
use log::error;

use crate::{
    buffer::{RxBuf, TxBuf},
    error::{Error, Result},
    filter::{IdMode, RxFilter, RxMask},
    frame::CanFrame,
    regs::{
        BfpCtrl, CanCtrl, CanInte, Cnf1, Cnf2, Cnf3, OpMode, RecvBufOpMode, Register, Rxb0Ctrl,
        Rxb1Ctrl, TXB_LEN,
    },
    stat::Status,
    timing::BitTiming,
};
pub use crate::timing::{CanSpeed, McpSpeed};

#[repr(u8)]
enum Instruction {
    Write = 0x2,
    Read = 0x3,
    Bitmod = 0x5,
    ReadStatus = 0xA0,
    Reset = 0xC0,
}

/// Settings used to initialize the MCP2515.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct Settings {
    /// Device operation mode after initialization.
    pub mode: OpMode,
    /// Which identifiers the receive buffers accept.
    pub id_mode: IdMode,
    /// Device CAN speed.
    pub can_speed: CanSpeed,
    /// Device oscillator speed. Should match the clock speed of the oscillator
    /// attached to the MCP2515.
    pub mcp_speed: McpSpeed,
    /// Whether to enable the CLKOUT pin.
    pub clkout_en: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: OpMode::Normal,
            id_mode: IdMode::All,
            can_speed: CanSpeed::Kbps100,
            mcp_speed: McpSpeed::MHz16,
            clkout_en: false,
        }
    }
}

/// MCP2515 driver.
pub struct MCP2515<SPI, CS, CLK> {
    /// SPI interface to interact with the MCP2515.
    spi: SPI,
    /// Chip select pin to select the MCP2515.
    cs: CS,
    /// Time source for the polling deadlines.
    clock: CLK,
    /// Operation mode selected by the user, restored after mask configuration.
    mode: OpMode,
    /// Latched on the first bus error. Transmit and receive are refused while
    /// set.
    faulted: bool,
}

impl<SPI, CS, CLK, SPIE, CSE> MCP2515<SPI, CS, CLK>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    /// Creates a new MCP2515 driver. Nothing is sent to the chip until
    /// [`init`](Self::init) is called.
    ///
    /// # Configuration
    ///
    /// As this driver only takes ownership of the SPI interface, it is up to
    /// the user to create and configure the SPI interface. Namely, the MCP2515
    /// requires the following options:
    ///
    /// * **Data Order**: MSB first.
    /// * **Clock**: up to 10 MHz.
    /// * **Mode**: Mode 0.
    ///
    /// # Parameters
    ///
    /// * `spi` - SPI interface.
    /// * `cs` - Chip-select pin for the MCP2515.
    /// * `clock` - Monotonic clock used to bound every polling loop.
    pub fn new(spi: SPI, cs: CS, clock: CLK) -> Self {
        Self {
            spi,
            cs,
            clock,
            mode: OpMode::Configuration,
            faulted: false,
        }
    }

    /// Releases the SPI interface, chip-select pin and clock.
    pub fn release(self) -> (SPI, CS, CLK) {
        (self.spi, self.cs, self.clock)
    }

    /// Initializes the MCP2515. This should be called once at the start of
    /// the program, and again to recover after a bus error disabled the
    /// driver.
    ///
    /// # Parameters
    ///
    /// * `delay` - Delay interface from downstream HAL.
    /// * `settings` - Settings for MCP2515. See [`Settings`].
    pub fn init(
        &mut self,
        delay: &mut impl DelayMs<u8>,
        settings: Settings,
    ) -> Result<(), SPIE, CSE> {
        self.faulted = false;
        self.cs.set_high().map_err(Error::Hal)?;
        self.reset(delay)?;

        // The bit timing is written even when configuration mode was not
        // reached, the failure is reported afterwards.
        let config = self.switch_mode(OpMode::Configuration);
        if let Err(e) = &config {
            error!("MCP2515 did not enter configuration mode: {:?}", e);
        }
        self.set_bitrate(settings.can_speed, settings.mcp_speed, settings.clkout_en)?;
        config?;
        self.set_clken(settings.clkout_en)?;

        self.clear_buffers()?;

        // Polled operation, the RXnIF flags are still needed by READ STATUS.
        self.write_register(CanInte::new().with_rx0ie(true).with_rx1ie(true))?;
        // RXnBF pins as digital outputs, TXnRTS pins as inputs.
        self.write_register(
            BfpCtrl::new()
                .with_b0bfe(true)
                .with_b1bfe(true)
                .with_b0bfs(true)
                .with_b1bfs(true),
        )?;
        self.write_register_addr(&[Register::TXRTSCTRL], &[0])?;

        let rxm = match settings.id_mode {
            IdMode::Any => RecvBufOpMode::FilterOff,
            IdMode::All | IdMode::Standard | IdMode::Extended => RecvBufOpMode::FilterOn,
        };
        // Messages overflowing RXB0 roll over into RXB1.
        self.modify_register(
            Rxb0Ctrl::new().with_rxm(rxm).with_bukt(true),
            Rxb0Ctrl::MASK_RXM | Rxb0Ctrl::MASK_BUKT,
        )?;
        self.modify_register(Rxb1Ctrl::new().with_rxm(rxm), Rxb1Ctrl::MASK_RXM)?;

        self.set_mode(settings.mode)
    }

    /// Zeroes masks, filters and buffer registers. Filters 0, 2 and 4 are
    /// set up for extended IDs, 1, 3 and 5 for standard IDs.
    fn clear_buffers(&mut self) -> Result<(), SPIE, CSE> {
        for mask in RxMask::ALL {
            self.set_mask(mask, Id::Extended(ExtendedId::ZERO))?;
        }
        for (n, filter) in RxFilter::ALL.into_iter().enumerate() {
            let id = if n % 2 == 0 {
                Id::Extended(ExtendedId::ZERO)
            } else {
                Id::Standard(StandardId::ZERO)
            };
            self.set_filter(filter, id)?;
        }

        let zeros = [0u8; TXB_LEN];
        for buf in TxBuf::ALL {
            self.write_registers(buf.ctrl(), &zeros)?;
        }
        for buf in RxBuf::ALL {
            self.write_register_addr(&[buf.ctrl()], &[0])?;
        }
        Ok(())
    }

    /// Configures the MCP2515 to operate at a certain CAN bitrate. The chip
    /// must be in configuration mode.
    ///
    /// # Parameters
    ///
    /// * `can_speed` - CAN speed to operate at.
    /// * `mcp_speed` - Clock speed of the MCP2515.
    /// * `clkout_en` - Whether to enable the `CLKOUT` pin.
    pub fn set_bitrate(
        &mut self,
        can_speed: CanSpeed,
        mcp_speed: McpSpeed,
        clkout_en: bool,
    ) -> Result<(), SPIE, CSE> {
        let timing = BitTiming::lookup(mcp_speed, can_speed)
            .ok_or(Error::InvalidConfiguration(can_speed, mcp_speed))?;
        let mut cnf3 = Cnf3::from_bytes([timing.cnf3]);
        if clkout_en {
            cnf3 = cnf3.with_sof(false);
        }
        self.write_register(Cnf1::from_bytes([timing.cnf1]))?;
        self.write_register(Cnf2::from_bytes([timing.cnf2]))?;
        self.write_register(cnf3)?;
        Ok(())
    }

    /// Enables/disables the `CLKOUT` pin on the MCP2515.
    fn set_clken(&mut self, clken: bool) -> Result<(), SPIE, CSE> {
        self.modify_register(CanCtrl::new().with_clken(clken), CanCtrl::MASK_CLKEN)
    }

    /// Whether a bus error has disabled the driver.
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    fn ensure_enabled(&self) -> Result<(), SPIE, CSE> {
        if self.faulted {
            Err(Error::Disabled)
        } else {
            Ok(())
        }
    }

    /// Returns the instant `timeout` from now.
    fn deadline(&self, timeout: Microseconds<u32>) -> Result<Instant<CLK>, SPIE, CSE> {
        self.clock
            .try_now()?
            .checked_add(timeout)
            .ok_or(Error::Clock)
    }

    /// Whether `deadline` has been reached.
    fn expired(&self, deadline: &Instant<CLK>) -> Result<bool, SPIE, CSE> {
        Ok(self.clock.try_now()? >= *deadline)
    }

    /// Resets the MCP2515 into configuration mode.
    pub fn reset(&mut self, delay: &mut impl DelayMs<u8>) -> Result<(), SPIE, CSE> {
        self.transfer(&mut [Instruction::Reset as u8])?;
        // The oscillator needs time to restart; a sleeping device won't respond
        // immediately.
        delay.delay_ms(5);

        Ok(())
    }

    /// Reads the status byte with the `READ STATUS` instruction.
    pub fn read_status(&mut self) -> Result<Status, SPIE, CSE> {
        let mut data = [Instruction::ReadStatus as u8, 0];
        self.transfer(&mut data)
            .map(|b| [b])
            .map(Status::from_bytes)
    }

    /// Read a register via a register object.
    #[inline]
    pub fn read_register<const N: usize, R: regs::Reg<N>>(&mut self) -> Result<R, SPIE, CSE> {
        let mut ret = [0u8; N];
        self.read_register_addr(&R::ADDRESSES, &mut ret)?;
        Ok(R::read(ret))
    }

    /// Reads a list of registers into an output buffer, one transaction per
    /// register.
    ///
    /// This function reads `n` registers, where `n` is the minimum of the
    /// length of `regs` and the length of `ret`.
    ///
    /// # Returns
    ///
    /// The number of registers read on success.
    pub fn read_register_addr(
        &mut self,
        regs: &[Register],
        ret: &mut [u8],
    ) -> Result<usize, SPIE, CSE> {
        let n = regs.len().min(ret.len());
        for i in 0..n {
            let mut data = [Instruction::Read as u8, regs[i] as u8, 0];
            ret[i] = self.transfer(&mut data)?;
        }
        Ok(n)
    }

    /// Reads registers starting from `reg` sequentially, moving on to the next
    /// register until `ret` is full.
    ///
    /// # Parameters
    ///
    /// * `reg` - Register to start reading from.
    /// * `ret` - Return slice to write into.
    pub fn read_register_seq(&mut self, reg: Register, ret: &mut [u8]) -> Result<(), SPIE, CSE> {
        let mut hdr = [Instruction::Read as u8, reg as u8];
        self.with_cs(|spi| {
            spi.transfer(&mut hdr)?;
            // The MCP2515 ignores what is clocked in while reading, so `ret`
            // is sent as is and overwritten with the register contents.
            spi.transfer(ret)?;
            Ok(())
        })
    }

    /// Write to a register using a register object.
    #[inline]
    pub fn write_register<const N: usize, R: regs::Reg<N>>(
        &mut self,
        reg: R,
    ) -> Result<(), SPIE, CSE> {
        self.write_register_addr(&R::ADDRESSES, &reg.write())?;
        Ok(())
    }

    /// Write to a list of registers, one transaction per register.
    ///
    /// This function writes to `n` registers, where `n` is the minimum of the
    /// length of `regs` and the length of `data`. The number of registers
    /// written is returned in a result.
    pub fn write_register_addr(
        &mut self,
        regs: &[Register],
        data: &[u8],
    ) -> Result<usize, SPIE, CSE> {
        let n = regs.len().min(data.len());
        for i in 0..n {
            let mut data = [Instruction::Write as u8, regs[i] as u8, data[i]];
            self.transfer(&mut data)?;
        }
        Ok(n)
    }

    /// Writes to sequential registers. Writing will start at `reg` and continue
    /// sequentially until `data` is empty.
    pub fn write_registers(&mut self, reg: Register, data: &[u8]) -> Result<(), SPIE, CSE> {
        let mut hdr = [Instruction::Write as u8, reg as u8];
        self.with_cs(|spi| {
            spi.transfer(&mut hdr)?;
            for d in data {
                spi.transfer(&mut [*d])?;
            }
            Ok(())
        })
    }

    /// Modifies a register.
    ///
    /// # Parameters
    ///
    /// * `reg` - New register content.
    /// * `mask` - Mask register. The bits must be 1 in the positions you want
    ///   to modify.
    #[inline]
    pub fn modify_register<const N: usize, R: regs::BitModifiable<N>>(
        &mut self,
        reg: R,
        mask: R,
    ) -> Result<(), SPIE, CSE> {
        self.modify_register_addr(&R::ADDRESSES, &reg.write(), &mask.write())?;
        Ok(())
    }

    /// Modifies n registers with the `BIT MODIFY` instruction, where n is the
    /// minimum length of `regs`, `data` and `masks`.
    ///
    /// # Returns
    ///
    /// Returns the number of registers modified (n), or error on failure.
    pub fn modify_register_addr(
        &mut self,
        regs: &[Register],
        data: &[u8],
        masks: &[u8],
    ) -> Result<usize, SPIE, CSE> {
        let n = regs.len().min(data.len()).min(masks.len());
        for i in 0..n {
            let mut data = [
                Instruction::Bitmod as u8, // BIT MODIFY
                regs[i] as u8,             // Register address
                masks[i],                  // Modify mask byte
                data[i],                   // Data byte
            ];
            self.transfer(&mut data)?;
        }
        Ok(n)
    }

    /// Transfers an array of bytes via SPI, returning the slave response inside
    /// the given mutable bytes array.
    ///
    /// # Returns
    ///
    /// Returns the last element received from the slave. If no bytes were sent,
    /// 0 is returned.
    fn transfer(&mut self, bytes: &mut [u8]) -> Result<u8, SPIE, CSE> {
        self.with_cs(|spi| spi.transfer(bytes).map(|_| ()))?;
        Ok(bytes.last().copied().unwrap_or(0))
    }

    /// Calls a function `f` after bringing the chip select pin low, restoring
    /// it to high after the function has finished, whether it failed or not.
    ///
    /// Any error latches the fault flag.
    fn with_cs<T>(
        &mut self,
        f: impl FnOnce(&mut SPI) -> core::result::Result<T, SPIE>,
    ) -> Result<T, SPIE, CSE> {
        if let Err(e) = self.cs.set_low() {
            self.faulted = true;
            return Err(Error::Hal(e));
        }
        let result = f(&mut self.spi).map_err(Error::Spi);
        let released = self.cs.set_high().map_err(Error::Hal);
        let result = result.and_then(|t| released.map(|()| t));
        if result.is_err() {
            self.faulted = true;
        }
        result
    }
}

impl<SPI, CS, CLK, SPIE, CSE> embedded_hal::blocking::can::Can for MCP2515<SPI, CS, CLK>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    type Frame = CanFrame;
    type Error = Error<SPIE, CSE>;

    #[inline]
    fn transmit(&mut self, frame: &Self::Frame) -> Result<(), SPIE, CSE> {
        self.send_message(*frame)
    }

    #[inline]
    fn receive(&mut self) -> Result<Self::Frame, SPIE, CSE> {
        self.read_message()
    }
}

impl<SPI, CS, CLK, SPIE, CSE> embedded_hal::can::nb::Can for MCP2515<SPI, CS, CLK>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    type Frame = CanFrame;
    type Error = Error<SPIE, CSE>;

    /// Queues the frame in a free Tx buffer without waiting for it to be sent.
    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        self.ensure_enabled()?;
        let buf = match self.find_free_tx_buf() {
            Ok(buf) => buf,
            Err(Error::TxBusy) => return Err(nb::Error::WouldBlock),
            Err(e) => return Err(nb::Error::Other(e)),
        };
        self.load_tx_buf(buf, frame)?;
        self.request_tx(buf)?;
        Ok(None)
    }

    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        match self.read_message() {
            Err(Error::NoMessage) => Err(nb::Error::WouldBlock),
            result => Ok(result?),
        }
    }
}
