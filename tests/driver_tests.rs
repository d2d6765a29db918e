//! Tests for the register level behaviour of the driver.
//!
//! The register banks are backed by anonymous memory,
//! so registers read back whatever was last written to them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sunxi_linux_gpio::{
	AnonymousMemory,
	Bank,
	DataBitNumbering,
	DriverConfig,
	EdgeEventSource,
	Error,
	MappedRegion,
	PhysicalMemory,
	PhysicalWindow,
	PinFunction,
	PinMode,
	PinValue,
	PullMode,
	Register,
	RegisterAddress,
	SunxiDriver,
	MAX_PIN_COUNT,
};

struct CountingMemory {
	calls: Arc<AtomicUsize>,
}

impl PhysicalMemory for CountingMemory {
	fn map_windows(&self, windows: &[PhysicalWindow; 2]) -> Result<[MappedRegion; 2], Error> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		AnonymousMemory.map_windows(windows)
	}
}

fn no_edge_source() -> Result<Box<dyn EdgeEventSource>, Error> {
	Err(Error::Internal(String::from("edge events are not available in this test")))
}

fn driver_with(config: DriverConfig) -> (SunxiDriver, Arc<AtomicUsize>) {
	let calls = Arc::new(AtomicUsize::new(0));
	let memory = CountingMemory { calls: calls.clone() };
	let driver = SunxiDriver::with_backends(config, Box::new(memory), no_edge_source).unwrap();
	(driver, calls)
}

fn driver() -> (SunxiDriver, Arc<AtomicUsize>) {
	driver_with(DriverConfig::default())
}

#[test]
fn open_pin_maps_registers_and_selects_input() {
	let (driver, calls) = driver();
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	driver.open_pin(10).unwrap();
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(driver.mode(10).unwrap(), PinMode::Input);

	driver.open_pin(11).unwrap();
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn mode_reflects_the_last_set_mode() {
	let (driver, _) = driver();
	for &mode in [PinMode::Output, PinMode::InputPullUp, PinMode::InputPullDown, PinMode::Input].iter() {
		driver.set_mode(3, mode).unwrap();
		assert_eq!(driver.mode(3).unwrap(), mode);
	}
}

#[test]
fn mode_of_unconfigured_pin_is_an_error() {
	let (driver, _) = driver();
	assert!(matches!(driver.mode(4), Err(Error::PinNotOpen(4))));
}

#[test]
fn unsupported_mode_leaves_pin_untouched() {
	let (driver, _) = driver();
	driver.set_mode(5, PinMode::Output).unwrap();
	let cfg = RegisterAddress::new(0, Register::Cfg0);
	let before = driver.read_register(cfg).unwrap();

	let result = driver.set_mode(5, PinMode::Alternate(2));
	assert!(matches!(result, Err(Error::UnsupportedMode { pin: 5, mode: PinMode::Alternate(2) })));
	assert!(matches!(driver.set_mode(5, PinMode::Disabled), Err(Error::UnsupportedMode { .. })));
	assert_eq!(driver.mode(5).unwrap(), PinMode::Output);
	assert_eq!(driver.read_register(cfg).unwrap(), before);

	assert!(driver.is_mode_supported(5, PinMode::InputPullUp));
	assert!(!driver.is_mode_supported(5, PinMode::Alternate(4)));
}

#[test]
fn invalid_pins_never_touch_hardware() {
	let (mut driver, calls) = driver();
	let pin = driver.pin_count();

	assert!(matches!(driver.validate(pin), Err(Error::InvalidPin { .. })));
	assert!(matches!(driver.open_pin(pin), Err(Error::InvalidPin { .. })));
	assert!(matches!(driver.close_pin(pin), Err(Error::InvalidPin { .. })));
	assert!(matches!(driver.set_mode(pin, PinMode::Output), Err(Error::InvalidPin { .. })));
	assert!(matches!(driver.mode(pin), Err(Error::InvalidPin { .. })));
	assert!(matches!(driver.read(pin), Err(Error::InvalidPin { .. })));
	assert!(matches!(driver.write(pin, PinValue::High), Err(Error::InvalidPin { .. })));
	assert!(matches!(driver.pin_info(pin), Err(Error::InvalidPin { .. })));
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	driver.dispose();
}

#[test]
fn written_levels_read_back() {
	let (driver, _) = driver();
	driver.open_pin(7).unwrap();
	driver.set_mode(7, PinMode::Output).unwrap();

	driver.write(7, PinValue::High).unwrap();
	assert_eq!(driver.read(7).unwrap(), PinValue::High);
	driver.write(7, PinValue::Low).unwrap();
	assert_eq!(driver.read(7).unwrap(), PinValue::Low);
}

#[test]
fn legacy_numbering_uses_the_previous_data_bit() {
	let (driver, _) = driver();
	let dat = RegisterAddress::new(0, Register::Dat);

	driver.write(10, PinValue::High).unwrap();
	assert_eq!(driver.read_register(dat).unwrap(), 1 << 9);

	driver.write(0, PinValue::High).unwrap();
	assert_eq!(driver.read_register(dat).unwrap(), (1 << 9) | (1 << 31));
	assert_eq!(driver.read(0).unwrap(), PinValue::High);
	assert_eq!(driver.read(1).unwrap(), PinValue::Low);
}

#[test]
fn datasheet_numbering_uses_the_pin_bit() {
	let config = DriverConfig { data_bit_numbering: DataBitNumbering::Datasheet, ..Default::default() };
	let (driver, _) = driver_with(config);
	let dat = RegisterAddress::new(0, Register::Dat);

	driver.write(10, PinValue::High).unwrap();
	assert_eq!(driver.read_register(dat).unwrap(), 1 << 10);
}

#[test]
fn pull_up_on_pin_10() {
	let (driver, _) = driver();
	driver.set_mode(10, PinMode::InputPullUp).unwrap();

	let pull = driver.read_register(RegisterAddress::new(0, Register::Pull0)).unwrap();
	assert_eq!((pull >> 20) & 0b11, 0b01);
	assert_eq!(pull & !(0b11 << 20), 0);

	let cfg = driver.read_register(RegisterAddress::new(0, Register::Cfg1)).unwrap();
	assert_eq!((cfg >> 8) & 0xF, 0);

	let info = driver.pin_info(10).unwrap();
	assert_eq!(info.function, PinFunction::Input);
	assert_eq!(info.pull, PullMode::PullUp);
	assert_eq!(info.name(), "PA10");
}

#[test]
fn output_clears_previous_pull() {
	let (driver, _) = driver();
	driver.set_mode(20, PinMode::InputPullDown).unwrap();
	driver.set_mode(20, PinMode::Output).unwrap();

	let info = driver.pin_info(20).unwrap();
	assert_eq!(info.function, PinFunction::Output);
	assert_eq!(info.pull, PullMode::Disabled);
	let cfg = driver.read_register(RegisterAddress::new(0, Register::Cfg2)).unwrap();
	assert_eq!(cfg, 0b001 << 16);
}

#[test]
fn second_bank_pins_use_the_second_bank() {
	let config = DriverConfig { pin_count: MAX_PIN_COUNT, ..Default::default() };
	let (driver, _) = driver_with(config);
	let pin = 11 * 32 + 4;

	driver.set_mode(pin, PinMode::Output).unwrap();
	assert_eq!(driver.read_register(RegisterAddress::new(11, Register::Cfg0)).unwrap(), 0b001 << 16);
	assert_eq!(driver.read_register(RegisterAddress::new(1, Register::Cfg0)).unwrap(), 0);
	assert_eq!(driver.pin_info(pin).unwrap().name(), "PL4");
}

#[test]
fn closing_an_output_drives_it_low_and_releases_it() {
	let (driver, _) = driver();
	driver.open_pin(6).unwrap();
	driver.set_mode(6, PinMode::Output).unwrap();
	driver.write(6, PinValue::High).unwrap();

	driver.close_pin(6).unwrap();
	assert_eq!(driver.mode(6).unwrap(), PinMode::Input);
	assert_eq!(driver.read(6).unwrap(), PinValue::Low);
	assert_eq!(driver.pin_info(6).unwrap().function, PinFunction::Input);
}

#[test]
fn register_reads_outside_the_bank_window_fail() {
	let (driver, _) = driver();
	let wrong_bank = RegisterAddress { bank: Bank::Bank1, physical: 0x01C2_0800 };
	assert!(matches!(driver.read_register(wrong_bank), Err(Error::InvalidRegister(_, Bank::Bank1))));

	let past_window = RegisterAddress { bank: Bank::Bank0, physical: 0x01C2_0000 + 0x10_0000 };
	assert!(matches!(driver.read_register(past_window), Err(Error::InvalidRegister(..))));

	let unaligned = RegisterAddress { bank: Bank::Bank0, physical: 0x01C2_0802 };
	assert!(matches!(driver.read_register(unaligned), Err(Error::InvalidRegister(..))));

	assert_eq!(driver.read_register(RegisterAddress::new(0, Register::Dat)).unwrap(), 0);
}

#[test]
fn closing_an_input_keeps_its_configuration() {
	let (driver, _) = driver();
	driver.set_mode(8, PinMode::InputPullUp).unwrap();
	driver.close_pin(8).unwrap();
	assert_eq!(driver.mode(8).unwrap(), PinMode::InputPullUp);

	driver.close_pin(9).unwrap();
	assert!(matches!(driver.mode(9), Err(Error::PinNotOpen(9))));
}

#[test]
fn concurrent_first_use_maps_once() {
	let (driver, calls) = driver();

	std::thread::scope(|scope| {
		for pin in 0..8 {
			let driver = &driver;
			scope.spawn(move || {
				driver.open_pin(pin).unwrap();
				driver.read(pin).unwrap();
			});
		}
	});

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	for pin in 0..8 {
		assert_eq!(driver.mode(pin).unwrap(), PinMode::Input);
	}
}

#[test]
fn dispose_twice_then_reuse() {
	let (mut driver, calls) = driver();
	driver.open_pin(1).unwrap();

	driver.dispose();
	driver.dispose();
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	// Registers are mapped again on the next access.
	driver.write(1, PinValue::High).unwrap();
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn invalid_config_is_rejected() {
	let config = DriverConfig { pin_count: 0, ..Default::default() };
	let result = SunxiDriver::with_backends(config, Box::new(AnonymousMemory), no_edge_source);
	assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn mapping_failures_are_reported_and_retried() {
	struct Denied;

	impl PhysicalMemory for Denied {
		fn map_windows(&self, _windows: &[PhysicalWindow; 2]) -> Result<[MappedRegion; 2], Error> {
			Err(Error::HardwareAccess { message: String::from("failed to open /dev/mem"), errno: None })
		}
	}

	let driver = SunxiDriver::with_backends(DriverConfig::default(), Box::new(Denied), no_edge_source).unwrap();
	assert!(matches!(driver.open_pin(2), Err(Error::HardwareAccess { .. })));
	assert!(matches!(driver.read(2), Err(Error::HardwareAccess { .. })));
	assert!(matches!(driver.mode(2), Err(Error::PinNotOpen(2))));
}
