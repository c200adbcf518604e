use core::fmt::Debug;

use embedded_hal::{blocking::spi::Transfer, digital::v2::OutputPin};
use embedded_time::Clock;

use crate::{
    buffer::RxBuf,
    error::{Error, Result},
    frame::CanFrame,
    ident::{DlcReg, IdRegs},
    regs::{CanIntf, Rxb0Ctrl, Rxb1Ctrl},
    MCP2515,
};

impl<SPI, CS, CLK, SPIE, CSE> MCP2515<SPI, CS, CLK>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    /// Reads a message from the MCP2515 Rx buffers.
    ///
    /// RXB0 is served first; a message in RXB1 stays pending until the next
    /// call.
    pub fn read_message(&mut self) -> Result<CanFrame, SPIE, CSE> {
        self.ensure_enabled()?;
        let status = self.read_status()?;
        if status.rx0if() {
            self.read_message_from_buf(RxBuf::B0)
        } else if status.rx1if() {
            self.read_message_from_buf(RxBuf::B1)
        } else {
            Err(Error::NoMessage)
        }
    }

    /// Reads a message from a specific Rx buffer and releases the buffer.
    ///
    /// # Parameters
    ///
    /// * `buf` - Rx buffer to read from.
    pub fn read_message_from_buf(&mut self, buf: RxBuf) -> Result<CanFrame, SPIE, CSE> {
        self.ensure_enabled()?;
        // CTRL, SIDH, SIDL, EID8, EID0, DLC
        let mut regs = [0u8; 6];
        self.read_register_seq(buf.ctrl(), &mut regs)?;
        let [ctrl, sidh, sidl, eid8, eid0, dlc] = regs;

        let id = IdRegs::from_bytes([sidh, sidl, eid8, eid0])
            .id()
            .ok_or(Error::InvalidFrameId)?;
        // RXRTR covers standard remote frames, the DLC RTR bit only extended
        // ones.
        let ctrl_rtr = match buf {
            RxBuf::B0 => Rxb0Ctrl::from_bytes([ctrl]).rxrtr(),
            RxBuf::B1 => Rxb1Ctrl::from_bytes([ctrl]).rxrtr(),
        };
        let dlc = DlcReg::from_bytes([dlc]);
        let mut frame = CanFrame {
            id,
            rtr: ctrl_rtr || dlc.rtr(),
            dlc: dlc.data_len(),
            data: [0; 8],
        };

        let len = usize::from(frame.dlc);
        if !frame.rtr && len > 0 {
            self.read_register_seq(buf.data(), &mut frame.data[..len])?;
        }

        // Clear the Rx interrupt flag so the buffer can take the next message.
        self.modify_register(CanIntf::new(), buf.intf_mask())?;
        Ok(frame)
    }

    /// Whether a message is waiting in either Rx buffer. Always `false` once
    /// the driver is disabled.
    pub fn available(&mut self) -> Result<bool, SPIE, CSE> {
        if self.faulted {
            return Ok(false);
        }
        Ok(self.read_status()?.rx_pending())
    }
}
