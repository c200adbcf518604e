//! CAN bit-timing profiles.

/// Speed the CAN bus is operating at.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum CanSpeed {
    Kbps5,
    Kbps10,
    Kbps20,
    Kbps31_25,
    Kbps33_3,
    Kbps40,
    Kbps50,
    Kbps80,
    Kbps83_3,
    Kbps95,
    Kbps100,
    Kbps125,
    Kbps200,
    Kbps250,
    Kbps500,
    Kbps1000,
}

/// Speed the MCP2515 is operating at. Should match the crystal frequency
/// onboard.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum McpSpeed {
    MHz8,
    MHz16,
    MHz20,
}

/// Contents of the `CNF1`, `CNF2` and `CNF3` registers for one bit rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct BitTiming {
    pub cnf1: u8,
    pub cnf2: u8,
    pub cnf3: u8,
}

impl BitTiming {
    const fn new(cnf1: u8, cnf2: u8, cnf3: u8) -> Self {
        Self { cnf1, cnf2, cnf3 }
    }

    /// Looks up the bit timing for a CAN speed given the oscillator speed.
    ///
    /// Returns `None` for combinations the oscillator cannot produce.
    pub const fn lookup(mcp_speed: McpSpeed, can_speed: CanSpeed) -> Option<Self> {
        use CanSpeed::*;
        use McpSpeed::*;

        let timing = match (mcp_speed, can_speed) {
            (MHz8, Kbps5) => Self::new(0x1F, 0xBF, 0x87),
            (MHz8, Kbps10) => Self::new(0x0F, 0xBF, 0x87),
            (MHz8, Kbps20) => Self::new(0x07, 0xBF, 0x87),
            (MHz8, Kbps31_25) => Self::new(0x07, 0xA4, 0x84),
            (MHz8, Kbps33_3) => Self::new(0x47, 0xE2, 0x85),
            (MHz8, Kbps40) => Self::new(0x03, 0xBF, 0x87),
            (MHz8, Kbps50) => Self::new(0x03, 0xB4, 0x86),
            (MHz8, Kbps80) => Self::new(0x01, 0xBF, 0x87),
            (MHz8, Kbps100) => Self::new(0x01, 0xB4, 0x86),
            (MHz8, Kbps125) => Self::new(0x01, 0xB1, 0x85),
            (MHz8, Kbps200) => Self::new(0x00, 0xB4, 0x86),
            (MHz8, Kbps250) => Self::new(0x00, 0xB1, 0x85),
            (MHz8, Kbps500) => Self::new(0x00, 0xD1, 0x81),
            (MHz8, Kbps1000) => Self::new(0x00, 0x80, 0x80),
            (MHz16, Kbps5) => Self::new(0x3F, 0xFF, 0x87),
            (MHz16, Kbps10) => Self::new(0x1F, 0xFF, 0x87),
            (MHz16, Kbps20) => Self::new(0x0F, 0xFF, 0x87),
            (MHz16, Kbps33_3) => Self::new(0x4E, 0xF1, 0x85),
            (MHz16, Kbps40) => Self::new(0x07, 0xFF, 0x87),
            (MHz16, Kbps50) => Self::new(0x07, 0xFA, 0x87),
            (MHz16, Kbps80) => Self::new(0x03, 0xFF, 0x87),
            (MHz16, Kbps83_3) => Self::new(0x03, 0xBE, 0x07),
            (MHz16, Kbps95) => Self::new(0x03, 0xAD, 0x07),
            (MHz16, Kbps100) => Self::new(0x03, 0xFA, 0x87),
            (MHz16, Kbps125) => Self::new(0x03, 0xF0, 0x86),
            (MHz16, Kbps200) => Self::new(0x01, 0xFA, 0x87),
            (MHz16, Kbps250) => Self::new(0x41, 0xF1, 0x85),
            (MHz16, Kbps500) => Self::new(0x00, 0xF0, 0x86),
            (MHz16, Kbps1000) => Self::new(0x00, 0xD0, 0x82),
            (MHz20, Kbps33_3) => Self::new(0x0B, 0xFF, 0x87),
            (MHz20, Kbps40) => Self::new(0x09, 0xFF, 0x87),
            (MHz20, Kbps50) => Self::new(0x09, 0xFA, 0x87),
            (MHz20, Kbps80) => Self::new(0x04, 0xFF, 0x87),
            (MHz20, Kbps83_3) => Self::new(0x04, 0xFE, 0x87),
            (MHz20, Kbps100) => Self::new(0x04, 0xFA, 0x87),
            (MHz20, Kbps125) => Self::new(0x03, 0xFA, 0x87),
            (MHz20, Kbps200) => Self::new(0x01, 0xFF, 0x87),
            (MHz20, Kbps250) => Self::new(0x41, 0xFB, 0x86),
            (MHz20, Kbps500) => Self::new(0x00, 0xFA, 0x87),
            (MHz20, Kbps1000) => Self::new(0x00, 0xD9, 0x82),
            _ => return None,
        };
        Some(timing)
    }
}
