use crate::error::Error;
use crate::mocks::{elapsed, fake_driver, fake_driver_with_step};
use crate::regs::OpMode;

const CANINTE: u8 = 0x2B;
const CANINTF: u8 = 0x2C;
const WAKE_BIT: u8 = 0b0100_0000;

#[test]
fn test_request_current_mode() {
    let (mut mcp, chip) = fake_driver();

    mcp.set_mode(OpMode::Configuration).unwrap();
    assert_eq!(1, chip.borrow().mode_requests);
    assert_eq!(OpMode::Configuration, mcp.mode());
}

#[test]
fn test_switch_modes() {
    let (mut mcp, chip) = fake_driver();
    assert_eq!(OpMode::Configuration, mcp.mode());

    let modes = [
        OpMode::Normal,
        OpMode::Loopback,
        OpMode::ListenOnly,
        OpMode::Sleep,
        OpMode::Normal,
    ];
    for mode in modes {
        mcp.set_mode(mode).unwrap();
        assert_eq!(mode, mcp.mode());
        assert_eq!(mode, mcp.read_mode().unwrap());
        assert_eq!(mode as u8, chip.borrow().opmod());
    }
}

#[test]
fn test_mode_timeout() {
    let (mut mcp, chip) = fake_driver();
    chip.borrow_mut().stuck = true;

    assert_eq!(Error::NewModeTimeout, mcp.set_mode(OpMode::Normal).unwrap_err());
    assert_eq!(OpMode::Configuration, mcp.mode());
    assert_eq!(4, chip.borrow().opmod());
    // The request is repeated while polling.
    assert!(chip.borrow().mode_requests > 1);
    assert!(!mcp.is_faulted());
}

#[test]
fn test_invalid_mode_reported() {
    let (mut mcp, chip) = fake_driver();
    chip.borrow_mut().set_opmod(6);

    assert_eq!(Error::InvalidMode, mcp.read_mode().unwrap_err());
}

#[test]
fn test_wake_from_sleep_with_wakeup_interrupt_disabled() {
    let (mut mcp, chip) = fake_driver();
    chip.borrow_mut().set_opmod(OpMode::Sleep as u8);

    mcp.set_mode(OpMode::Normal).unwrap();

    let chip = chip.borrow();
    assert_eq!(OpMode::Normal as u8, chip.opmod());
    let wake: Vec<_> = chip
        .bit_modifies
        .iter()
        .copied()
        .filter(|(addr, _, _)| *addr == CANINTE || *addr == CANINTF)
        .collect();
    assert_eq!(
        vec![
            (CANINTE, WAKE_BIT, WAKE_BIT),
            (CANINTF, WAKE_BIT, WAKE_BIT),
            (CANINTE, WAKE_BIT, 0),
            (CANINTF, WAKE_BIT, 0),
        ],
        wake
    );
    assert_eq!(0, chip.regs[CANINTE as usize] & WAKE_BIT);
    assert_eq!(0, chip.regs[CANINTF as usize] & WAKE_BIT);
}

#[test]
fn test_wake_from_sleep_with_wakeup_interrupt_enabled() {
    let (mut mcp, chip) = fake_driver();
    chip.borrow_mut().set_opmod(OpMode::Sleep as u8);
    chip.borrow_mut().regs[CANINTE as usize] = WAKE_BIT;

    mcp.set_mode(OpMode::Loopback).unwrap();

    let chip = chip.borrow();
    assert_eq!(OpMode::Loopback as u8, chip.opmod());
    assert!(chip.bit_modifies.iter().all(|(addr, _, _)| *addr != CANINTE));
    assert_eq!(WAKE_BIT, chip.regs[CANINTE as usize]);
    assert_eq!(0, chip.regs[CANINTF as usize] & WAKE_BIT);
}

#[test]
fn test_wake_flag_always_cleared() {
    let (mut mcp, chip) = fake_driver();
    chip.borrow_mut().regs[CANINTF as usize] = WAKE_BIT | 0b0000_0001;

    mcp.set_mode(OpMode::Normal).unwrap();

    assert_eq!(0b0000_0001, chip.borrow().regs[CANINTF as usize]);
}

#[test]
fn test_stays_asleep_without_wakeup() {
    let (mut mcp, chip) = fake_driver();
    mcp.set_mode(OpMode::Sleep).unwrap();
    chip.borrow_mut().stuck = true;

    assert_eq!(Error::NewModeTimeout, mcp.set_mode(OpMode::Normal).unwrap_err());
    assert_eq!(OpMode::Sleep, mcp.mode());
}

#[test]
fn test_mode_timeout_is_200ms() {
    let (mut mcp, chip) = fake_driver_with_step(1);
    chip.borrow_mut().stuck = true;

    assert_eq!(Error::NewModeTimeout, mcp.set_mode(OpMode::Normal).unwrap_err());
    let elapsed = elapsed(&mcp);
    assert!(elapsed >= 200_000, "gave up after {} us", elapsed);
    assert!(elapsed < 200_010, "gave up after {} us", elapsed);
}
