use core::fmt::Debug;

use embedded_hal::{
    blocking::spi::Transfer,
    can::{ExtendedId, Frame, Id, StandardId},
    digital::v2::OutputPin,
};
use embedded_time::{duration::Microseconds, Clock};
use log::debug;

use crate::{
    buffer::TxBuf,
    error::{Error, Result},
    frame::CanFrame,
    ident::IdRegs,
    regs::TxbCtrl,
    MCP2515,
};

/// How long to wait for a free Tx buffer, and then for the message to leave
/// it.
const TX_TIMEOUT: Microseconds<u32> = Microseconds(2500);

impl<SPI, CS, CLK, SPIE, CSE> MCP2515<SPI, CS, CLK>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    /// Sends a data frame. Payload beyond 8 bytes is dropped.
    ///
    /// # Parameters
    ///
    /// * `id` - Raw identifier, at most 11 bits unless `extended`.
    /// * `extended` - Whether `id` is a 29-bit extended identifier.
    /// * `data` - Payload.
    pub fn transmit(&mut self, id: u32, extended: bool, data: &[u8]) -> Result<(), SPIE, CSE> {
        self.ensure_enabled()?;
        let id = if extended {
            ExtendedId::new(id).map(Id::Extended)
        } else {
            u16::try_from(id)
                .ok()
                .and_then(StandardId::new)
                .map(Id::Standard)
        }
        .ok_or(Error::InvalidFrameId)?;
        self.send_message(CanFrame::truncated(id, data))
    }

    /// Sends a CAN frame over the CAN bus via any available Tx buffer and
    /// waits for it to go out.
    ///
    /// # Parameters
    ///
    /// * `frame` - Frame to send.
    pub fn send_message(&mut self, frame: CanFrame) -> Result<(), SPIE, CSE> {
        self.ensure_enabled()?;
        let buf = self.wait_free_tx_buf()?;
        self.send_message_via_buffer(buf, frame)
    }

    /// Sends a CAN frame over the CAN bus via a specific Tx buffer and waits
    /// for it to go out.
    ///
    /// # Parameters
    ///
    /// * `buf` - Tx buffer to use for transmission.
    /// * `frame` - Frame to send.
    pub fn send_message_via_buffer(
        &mut self,
        buf: TxBuf,
        frame: CanFrame,
    ) -> Result<(), SPIE, CSE> {
        self.ensure_enabled()?;
        self.load_tx_buf(buf, &frame)?;
        self.request_tx(buf)?;

        let deadline = self.deadline(TX_TIMEOUT)?;
        loop {
            let ctrl = self.read_txb_ctrl(buf)?;
            if !ctrl.txreq() {
                return if ctrl.failed() {
                    Err(Error::TxFailed)
                } else {
                    Ok(())
                };
            }
            if self.expired(&deadline)? {
                debug!("{:?} still pending after timeout", buf);
                return Err(Error::SendTimeout);
            }
        }
    }

    /// Attempts to find a free Tx buffer.
    ///
    /// All buffers are checked; when several are free the last one, `B2`
    /// before `B1` before `B0`, is returned.
    ///
    /// # Returns
    ///
    /// An available Tx buffer on success, error if all Tx buffers were busy.
    pub fn find_free_tx_buf(&mut self) -> Result<TxBuf, SPIE, CSE> {
        let mut free = None;
        for buf in TxBuf::ALL {
            if !self.read_txb_ctrl(buf)?.txreq() {
                free = Some(buf);
            }
        }
        free.ok_or(Error::TxBusy)
    }

    /// Polls [`find_free_tx_buf`](Self::find_free_tx_buf) until a buffer is
    /// free or the timeout elapses.
    fn wait_free_tx_buf(&mut self) -> Result<TxBuf, SPIE, CSE> {
        let deadline = self.deadline(TX_TIMEOUT)?;
        loop {
            match self.find_free_tx_buf() {
                Err(Error::TxBusy) => {}
                result => return result,
            }
            if self.expired(&deadline)? {
                debug!("No Tx buffer became free");
                return Err(Error::TxBufferTimeout);
            }
        }
    }

    /// Writes data, DLC and identifier of `frame` into `buf`.
    pub(crate) fn load_tx_buf(&mut self, buf: TxBuf, frame: &CanFrame) -> Result<(), SPIE, CSE> {
        let data = frame.data();
        if !data.is_empty() {
            self.write_registers(buf.data(), data)?;
        }
        self.write_register_addr(&[buf.dlc()], &frame.dlc_reg().into_bytes())?;
        self.write_registers(buf.sidh(), &IdRegs::from_id(frame.id()).into_bytes())
    }

    /// Sets `TXREQ` of `buf`, handing it to the chip.
    pub(crate) fn request_tx(&mut self, buf: TxBuf) -> Result<(), SPIE, CSE> {
        self.modify_register_addr(
            &[buf.ctrl()],
            &TxbCtrl::new().with_txreq(true).into_bytes(),
            &TxbCtrl::MASK_TXREQ.into_bytes(),
        )?;
        Ok(())
    }

    /// Read the `CTRL` register of a Tx buffer.
    fn read_txb_ctrl(&mut self, buf: TxBuf) -> Result<TxbCtrl, SPIE, CSE> {
        let mut ret = [0u8; 1];
        self.read_register_addr(&[buf.ctrl()], &mut ret)?;
        Ok(TxbCtrl::from_bytes(ret))
    }
}
