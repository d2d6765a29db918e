use log::trace;

use crate::config::DataBitNumbering;
use crate::memory::{MemoryMapSession, PhysicalMemory};
use crate::pin::PinLocation;
use crate::read::PinInfo;
use crate::register::RegisterAddress;
use crate::{Error, PinFunction, PinValue, PullMode};

/// Wait for a number of spin cycles.
///
/// This blocks the calling thread, it does not yield.
fn wait_cycles(cycles: u32) {
	for _ in 0..cycles {
		std::hint::spin_loop();
	}
}

/// Read-modify-write access to the registers of individual pins.
///
/// Sequences touching a register word are not serialized.
/// Concurrent changes to pins sharing a word may overwrite each other.
pub(crate) struct RegisterIo {
	session: MemoryMapSession,
	numbering: DataBitNumbering,
	settle_cycles: u32,
}

impl RegisterIo {
	pub fn new(memory: Box<dyn PhysicalMemory>, numbering: DataBitNumbering, settle_cycles: u32) -> Self {
		Self {
			session: MemoryMapSession::new(memory),
			numbering,
			settle_cycles,
		}
	}

	pub fn ensure_mapped(&self) -> Result<(), Error> {
		self.session.ensure_mapped()
	}

	pub fn teardown(&mut self) {
		self.session.teardown()
	}

	/// Set the function and pull mode of a pin.
	///
	/// The configuration register is written first,
	/// and the pull register only after the pin had time to settle.
	pub fn configure(&self, location: PinLocation, function: PinFunction, pull: PullMode) -> Result<(), Error> {
		let banks = self.session.banks()?;

		let cfg_register  = location.cfg_register();
		let pull_register = location.pull_register();
		let cfg_shift     = location.cfg_shift();
		let pull_shift    = location.pull_shift();

		let mut cfg_value  = banks.read(cfg_register)?;
		let mut pull_value = banks.read(pull_register)?;

		cfg_value  &= !(0xF  << cfg_shift);
		pull_value &= !(0b11 << pull_shift);

		cfg_value  |= u32::from(function.to_bits()) << cfg_shift;
		pull_value |= u32::from(pull.to_bits())     << pull_shift;

		trace!("configuring {} as {:?} with pull {:?}", location.name(), function, pull);
		banks.write(cfg_register, cfg_value)?;
		wait_cycles(self.settle_cycles);
		banks.write(pull_register, pull_value)
	}

	pub fn read_level(&self, location: PinLocation) -> Result<PinValue, Error> {
		let banks = self.session.banks()?;
		let value = banks.read(location.dat_register())?;
		Ok(PinValue::from((value >> location.dat_shift(self.numbering)) & 1 == 1))
	}

	pub fn write_level(&self, location: PinLocation, level: PinValue) -> Result<(), Error> {
		let banks = self.session.banks()?;
		let register = location.dat_register();
		let bit      = 1u32 << location.dat_shift(self.numbering);

		let value = match level {
			PinValue::High => banks.read(register)? | bit,
			PinValue::Low  => banks.read(register)? & !bit,
		};
		banks.write(register, value)
	}

	/// Read the function, pull mode and level of a pin from the hardware.
	pub fn read_info(&self, location: PinLocation) -> Result<PinInfo, Error> {
		let banks = self.session.banks()?;
		let cfg   = banks.read(location.cfg_register())?;
		let pull  = banks.read(location.pull_register())?;
		let dat   = banks.read(location.dat_register())?;
		PinInfo::decode(location, self.numbering, cfg, pull, dat)
	}

	pub fn read_register(&self, address: RegisterAddress) -> Result<u32, Error> {
		self.session.banks()?.read(address)
	}
}
