use std::{
    cell::{Cell, RefCell},
    convert::Infallible,
    rc::Rc,
};

use embedded_hal::{
    blocking::{delay::DelayMs, spi::Transfer},
    digital::v2::OutputPin,
};
use embedded_time::{
    clock::Error,
    duration::Duration,
    fixed_point::FixedPoint,
    fraction::Fraction,
    timer::param::{Armed, OneShot},
    Clock, Instant, Timer,
};
use mockall::mock;

use crate::MCP2515;

const CANSTAT: usize = 0x0E;
const CANCTRL: usize = 0x0F;
const CANINTE: usize = 0x2B;
const CANINTF: usize = 0x2C;
const TXB_CTRL: [usize; 3] = [0x30, 0x40, 0x50];
const RXB_SIDH: [usize; 2] = [0x61, 0x71];

const TXREQ: u8 = 0b0000_1000;
const RXRTR: u8 = 0b0000_1000;
const DLC_RTR: u8 = 0b0100_0000;
const ABTF: u8 = 0b0100_0000;
const WAKIF: u8 = 0b0100_0000;
const WAKIE: u8 = 0b0100_0000;

const MODE_SLEEP: u8 = 1;
const MODE_LOOPBACK: u8 = 2;

/// Frame registers (`SIDH` to `D7`) captured when a Tx buffer was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sent {
    pub buf: usize,
    pub regs: [u8; 13],
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Idle,
    Reset,
    Read(Option<u8>),
    Write(Option<u8>),
    Bitmod { addr: Option<u8>, mask: Option<u8> },
    Status,
    Unknown,
}

/// Register level model of an MCP2515, driven byte by byte over the fake SPI
/// bus.
#[derive(Debug)]
pub struct Chip {
    pub regs: [u8; 0x80],
    /// Ignore every mode request.
    pub stuck: bool,
    /// Keep `TXREQ` set after a transmit request.
    pub hold_tx: bool,
    /// Abort every transmission.
    pub abort_tx: bool,
    pub sent: Vec<Sent>,
    /// `(address, mask, data)` of every `BIT MODIFY`.
    pub bit_modifies: Vec<(u8, u8, u8)>,
    /// Writes to `CANCTRL`.
    pub mode_requests: usize,
    /// Completed chip-select windows.
    pub transactions: usize,
    selected: bool,
    op: Op,
}

impl Default for Chip {
    fn default() -> Self {
        let mut chip = Self {
            regs: [0; 0x80],
            stuck: false,
            hold_tx: false,
            abort_tx: false,
            sent: Vec::new(),
            bit_modifies: Vec::new(),
            mode_requests: 0,
            transactions: 0,
            selected: false,
            op: Op::Idle,
        };
        chip.reset();
        chip
    }
}

impl Chip {
    pub fn reset(&mut self) {
        self.regs = [0; 0x80];
        self.regs[CANSTAT] = 0x80;
        self.regs[CANCTRL] = 0x87;
    }

    pub fn opmod(&self) -> u8 {
        self.regs[CANSTAT] >> 5
    }

    /// Forces the reported operation mode.
    pub fn set_opmod(&mut self, mode: u8) {
        self.regs[CANSTAT] = (self.regs[CANSTAT] & 0x1F) | (mode << 5);
    }

    /// Places a received frame (`SIDH` onwards) into Rx buffer `slot`.
    pub fn inject(&mut self, slot: usize, frame: &[u8]) {
        let base = RXB_SIDH[slot];
        self.regs[base..base + frame.len()].copy_from_slice(frame);
        self.regs[CANINTF] |= 1 << slot;
    }

    pub fn status(&self) -> u8 {
        let intf = self.regs[CANINTF];
        let req = |n: usize| (self.regs[TXB_CTRL[n]] & TXREQ != 0) as u8;
        (intf & 0b11)
            | req(0) << 2
            | ((intf >> 2) & 1) << 3
            | req(1) << 4
            | ((intf >> 3) & 1) << 5
            | req(2) << 6
            | ((intf >> 4) & 1) << 7
    }

    fn select(&mut self) {
        self.selected = true;
        self.op = Op::Idle;
    }

    fn deselect(&mut self) {
        if self.selected {
            self.transactions += 1;
        }
        self.selected = false;
        self.op = Op::Idle;
    }

    /// Shifts one byte in, returning the byte shifted out.
    fn clock(&mut self, byte: u8) -> u8 {
        if !self.selected {
            return 0xFF;
        }
        let (op, out) = match self.op {
            Op::Idle => {
                let op = match byte {
                    0xC0 => {
                        self.reset();
                        Op::Reset
                    }
                    0x03 => Op::Read(None),
                    0x02 => Op::Write(None),
                    0x05 => Op::Bitmod { addr: None, mask: None },
                    0xA0 => Op::Status,
                    _ => Op::Unknown,
                };
                (op, 0)
            }
            Op::Read(None) => (Op::Read(Some(byte & 0x7F)), 0),
            Op::Read(Some(addr)) => {
                let out = self.regs[addr as usize];
                (Op::Read(Some((addr + 1) & 0x7F)), out)
            }
            Op::Write(None) => (Op::Write(Some(byte & 0x7F)), 0),
            Op::Write(Some(addr)) => {
                self.store(addr as usize, byte);
                (Op::Write(Some((addr + 1) & 0x7F)), 0)
            }
            Op::Bitmod { addr: None, .. } => {
                let addr = Some(byte & 0x7F);
                (Op::Bitmod { addr, mask: None }, 0)
            }
            Op::Bitmod { addr, mask: None } => (Op::Bitmod { addr, mask: Some(byte) }, 0),
            Op::Bitmod { addr: Some(addr), mask: Some(mask) } => {
                self.bit_modifies.push((addr, mask, byte));
                let old = self.regs[addr as usize];
                self.store(addr as usize, (old & !mask) | (byte & mask));
                (Op::Unknown, 0)
            }
            Op::Status => (Op::Status, self.status()),
            op @ (Op::Reset | Op::Unknown) => (op, 0),
        };
        self.op = op;
        out
    }

    fn store(&mut self, addr: usize, value: u8) {
        match addr {
            CANSTAT => {}
            CANCTRL => {
                self.regs[CANCTRL] = value;
                self.mode_requests += 1;
                self.request_mode(value >> 5);
            }
            _ => {
                if let Some(n) = TXB_CTRL.iter().position(|&a| a == addr) {
                    let old = self.regs[addr];
                    if old & TXREQ == 0 && value & TXREQ != 0 {
                        // A new request clears the previous outcome.
                        self.regs[addr] = value & 0x0B;
                        self.start_tx(n);
                    } else {
                        // ABTF, MLOA and TXERR are read-only.
                        self.regs[addr] = (old & 0x70) | (value & 0x0B);
                    }
                } else {
                    self.regs[addr] = value;
                }
            }
        }
    }

    fn request_mode(&mut self, mode: u8) {
        if self.stuck || mode > 4 {
            return;
        }
        if self.opmod() == MODE_SLEEP && mode != MODE_SLEEP {
            let wake = self.regs[CANINTE] & WAKIE != 0 && self.regs[CANINTF] & WAKIF != 0;
            if !wake {
                return;
            }
        }
        self.set_opmod(mode);
    }

    fn start_tx(&mut self, n: usize) {
        let ctrl = TXB_CTRL[n];
        if self.hold_tx {
            return;
        }
        if self.abort_tx {
            self.regs[ctrl] = (self.regs[ctrl] & !TXREQ) | ABTF;
            return;
        }

        let mut regs = [0u8; 13];
        regs.copy_from_slice(&self.regs[ctrl + 1..ctrl + 14]);
        self.sent.push(Sent { buf: n, regs });
        self.regs[ctrl] &= !TXREQ;
        self.regs[CANINTF] |= 1 << (n + 2);

        if self.opmod() == MODE_LOOPBACK {
            if let Some(slot) = (0..2).find(|slot| self.regs[CANINTF] & (1 << slot) == 0) {
                self.inject(slot, &regs);
                // Loopback delivers remote frames with RXRTR set.
                let ctrl = RXB_SIDH[slot] - 1;
                self.regs[ctrl] = (self.regs[ctrl] & !RXRTR) | ((regs[4] & DLC_RTR) >> 3);
            }
        }
    }
}

pub type SharedChip = Rc<RefCell<Chip>>;

pub struct FakeSpi(pub SharedChip);

impl Transfer<u8> for FakeSpi {
    type Error = Infallible;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Infallible> {
        let mut chip = self.0.borrow_mut();
        for word in words.iter_mut() {
            *word = chip.clock(*word);
        }
        Ok(words)
    }
}

pub struct FakeCs(pub SharedChip);

impl OutputPin for FakeCs {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().select();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().deselect();
        Ok(())
    }
}

/// Clock advancing by `step` microseconds on every read.
#[derive(Debug)]
pub struct TestClock {
    pub now: Cell<u64>,
    pub step: u64,
}

impl TestClock {
    pub fn new(step: u64) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }
}

impl Clock for TestClock {
    type T = u64;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, Error> {
        let now = self.now.get();
        self.now.set(now + self.step);
        Ok(Instant::new(now))
    }

    fn new_timer<Dur>(&self, duration: Dur) -> Timer<OneShot, Armed, Self, Dur>
    where
        Dur: Duration + FixedPoint,
    {
        Timer::new(self, duration)
    }
}

pub struct NoDelay;

impl DelayMs<u8> for NoDelay {
    fn delay_ms(&mut self, _ms: u8) {}
}

mock! {
    pub SPIBus {}

    impl Transfer<u8> for SPIBus {
        type Error = u32;

        fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'static [u8], u32>;
    }
}

mock! {
    pub Pin {}

    impl OutputPin for Pin {
        type Error = u32;

        fn set_low(&mut self) -> Result<(), u32>;
        fn set_high(&mut self) -> Result<(), u32>;
    }
}

pub type FakeDriver = MCP2515<FakeSpi, FakeCs, TestClock>;

/// Driver wired to a freshly reset simulated chip. The clock advances 1 ms
/// per read.
pub fn fake_driver() -> (FakeDriver, SharedChip) {
    fake_driver_with_step(1_000)
}

/// As [`fake_driver`], with the clock advancing `step` µs per read.
pub fn fake_driver_with_step(step: u64) -> (FakeDriver, SharedChip) {
    let chip = SharedChip::default();
    let mcp = MCP2515::new(
        FakeSpi(chip.clone()),
        FakeCs(chip.clone()),
        TestClock::new(step),
    );
    (mcp, chip)
}

/// Microseconds the driver's clock has advanced so far.
pub fn elapsed(mcp: &FakeDriver) -> u64 {
    mcp.clock.now.get()
}
