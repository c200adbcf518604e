use core::fmt::Debug;

use embedded_hal::{blocking::spi::Transfer, digital::v2::OutputPin};
use embedded_time::{duration::Microseconds, Clock};
use log::debug;

use crate::{
    error::{Error, Result},
    regs::{CanCtrl, CanInte, CanIntf, CanStat, OpMode},
    MCP2515,
};

/// How long the chip gets to report a requested mode.
const MODE_TIMEOUT: Microseconds<u32> = Microseconds(200_000);

impl<SPI, CS, CLK, SPIE, CSE> MCP2515<SPI, CS, CLK>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    /// Set the operation mode of the device.
    ///
    /// This will wake the device if necessary. On success the mode is
    /// remembered and restored after [`set_std_masks`](Self::set_std_masks).
    ///
    /// # Returns
    ///
    /// Nothing on success, error if waking the device or setting the new mode
    /// fails.
    pub fn set_mode(&mut self, mode: OpMode) -> Result<(), SPIE, CSE> {
        self.switch_mode(mode)?;
        self.mode = mode;
        Ok(())
    }

    /// The operation mode last selected with [`set_mode`](Self::set_mode) or
    /// [`init`](Self::init).
    pub fn mode(&self) -> OpMode {
        self.mode
    }

    /// Reads the operation mode the device currently reports.
    pub fn read_mode(&mut self) -> Result<OpMode, SPIE, CSE> {
        let canstat: CanStat = self.read_register()?;
        canstat.opmod_or_err().map_err(|_| Error::InvalidMode)
    }

    /// Changes mode without touching the remembered user mode.
    pub(crate) fn switch_mode(&mut self, mode: OpMode) -> Result<(), SPIE, CSE> {
        self.wake_if_sleeping(mode)?;
        self.request_mode(mode)
    }

    /// Brings a sleeping device into listen-only mode, from where any mode
    /// can be requested. The wake-up interrupt has to be enabled for the
    /// device to leave sleep, so it is enabled for the duration if needed.
    ///
    /// The wake-up flag is cleared in every case.
    fn wake_if_sleeping(&mut self, mode: OpMode) -> Result<(), SPIE, CSE> {
        let status: CanStat = self.read_register()?;

        if matches!(status.opmod_or_err(), Ok(OpMode::Sleep)) && mode != OpMode::Sleep {
            let caninte: CanInte = self.read_register()?;
            let int_enabled = caninte.wakie();
            if !int_enabled {
                self.modify_register(CanInte::new().with_wakie(true), CanInte::MASK_WAKIE)?;
            }

            self.modify_register(CanIntf::new().with_wakif(true), CanIntf::MASK_WAKIF)?;
            self.request_mode(OpMode::ListenOnly)?;

            if !int_enabled {
                self.modify_register(CanInte::new().with_wakie(false), CanInte::MASK_WAKIE)?;
            }
        }

        self.modify_register(CanIntf::new().with_wakif(false), CanIntf::MASK_WAKIF)
    }

    /// Requests `mode` until `CANSTAT` reports it.
    ///
    /// The request is repeated on every poll, a single request is not always
    /// honoured (usually when entering sleep).
    fn request_mode(&mut self, mode: OpMode) -> Result<(), SPIE, CSE> {
        let deadline = self.deadline(MODE_TIMEOUT)?;
        loop {
            self.modify_register(CanCtrl::new().with_reqop(mode), CanCtrl::MASK_REQOP)?;

            let canstat: CanStat = self.read_register()?;
            if matches!(canstat.opmod_or_err(), Ok(current) if current == mode) {
                return Ok(());
            }
            if self.expired(&deadline)? {
                debug!("MCP2515 did not enter {:?} mode", mode);
                return Err(Error::NewModeTimeout);
            }
        }
    }
}
