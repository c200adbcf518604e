use modular_bitfield::prelude::*;

/// Byte returned by the `READ STATUS` instruction.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// Message waiting in RXB0.
    #[skip(setters)]
    pub rx0if: bool,
    /// Message waiting in RXB1.
    #[skip(setters)]
    pub rx1if: bool,
    #[skip(setters)]
    pub tx0req: bool,
    #[skip(setters)]
    pub tx0if: bool,
    #[skip(setters)]
    pub tx1req: bool,
    #[skip(setters)]
    pub tx1if: bool,
    #[skip(setters)]
    pub tx2req: bool,
    #[skip(setters)]
    pub tx2if: bool,
}

impl Status {
    /// Whether any receive buffer holds a message.
    pub fn rx_pending(&self) -> bool {
        self.rx0if() || self.rx1if()
    }
}
