use core::fmt::Debug;

use embedded_hal::can::{Error as CanError, ErrorKind};

use crate::timing::{CanSpeed, McpSpeed};

pub type Result<T, SPIE, CSE> = core::result::Result<T, Error<SPIE, CSE>>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error<SPIE: Debug, CSE: Debug> {
    /// MCP2515 did not reach the requested mode within 200 ms.
    NewModeTimeout,
    /// CANSTAT reported a reserved operation mode.
    InvalidMode,
    /// All Tx buffers are busy.
    TxBusy,
    /// No Tx buffer became free within 2500 µs.
    TxBufferTimeout,
    /// The Tx buffer did not finish sending within 2500 µs.
    SendTimeout,
    /// The chip reported an aborted, lost or errored transmission.
    TxFailed,
    /// There was no message to be received in the Rx buffers.
    NoMessage,
    /// Frame ID does not fit the requested identifier width.
    InvalidFrameId,
    /// Invalid configuration options.
    InvalidConfiguration(CanSpeed, McpSpeed),
    /// A previous bus error disabled the driver. Cleared by re-initializing.
    Disabled,
    /// The clock could not be read.
    Clock,
    /// SPI error.
    Spi(SPIE),
    /// Chip-select pin error.
    Hal(CSE),
}

impl<SPIE: Debug, CSE: Debug> CanError for Error<SPIE, CSE> {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl<SPIE: Debug, CSE: Debug> From<embedded_time::clock::Error> for Error<SPIE, CSE> {
    fn from(_error: embedded_time::clock::Error) -> Self {
        Error::Clock
    }
}
