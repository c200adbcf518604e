use crate::regs::{CanIntf, Register};

crate::register_set! {
    /// Transmit buffer.
    TxBuf => {
        /// Tx buffer 0.
        B0 => Register::TXB0SIDH,
        /// Tx buffer 1.
        B1 => Register::TXB1SIDH,
        /// Tx buffer 2.
        B2 => Register::TXB2SIDH
    }
}

impl TxBuf {
    /// Returns the `CTRL` register for the selected Tx buffer.
    pub const fn ctrl(self) -> Register {
        match self {
            TxBuf::B0 => Register::TXB0CTRL,
            TxBuf::B1 => Register::TXB1CTRL,
            TxBuf::B2 => Register::TXB2CTRL,
        }
    }

    /// Returns the `DLC` register for the selected Tx buffer.
    pub const fn dlc(self) -> Register {
        match self {
            TxBuf::B0 => Register::TXB0DLC,
            TxBuf::B1 => Register::TXB1DLC,
            TxBuf::B2 => Register::TXB2DLC,
        }
    }

    /// Returns the first `DATA` register for the selected Tx buffer.
    pub const fn data(self) -> Register {
        match self {
            TxBuf::B0 => Register::TXB0DATA,
            TxBuf::B1 => Register::TXB1DATA,
            TxBuf::B2 => Register::TXB2DATA,
        }
    }
}

crate::register_set! {
    /// Receive buffer.
    RxBuf => {
        /// Rx buffer 0.
        B0 => Register::RXB0SIDH,
        /// Rx buffer 1.
        B1 => Register::RXB1SIDH
    }
}

impl RxBuf {
    /// Returns the `CTRL` register for the selected Rx buffer.
    pub const fn ctrl(self) -> Register {
        match self {
            RxBuf::B0 => Register::RXB0CTRL,
            RxBuf::B1 => Register::RXB1CTRL,
        }
    }

    /// Returns the first `DATA` register for the selected Rx buffer.
    pub const fn data(self) -> Register {
        match self {
            RxBuf::B0 => Register::RXB0DATA,
            RxBuf::B1 => Register::RXB1DATA,
        }
    }

    /// Returns the `CANINTF` bit signalling a message in this buffer.
    pub const fn intf_mask(self) -> CanIntf {
        match self {
            RxBuf::B0 => CanIntf::MASK_RX0IF,
            RxBuf::B1 => CanIntf::MASK_RX1IF,
        }
    }
}
