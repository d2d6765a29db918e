use crate::config::DataBitNumbering;
use crate::pin::PinLocation;
use crate::{Error, PinFunction, PinValue, PullMode};

/// The hardware state of a single pin.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PinInfo {
	pub location: PinLocation,
	pub function: PinFunction,
	pub pull: PullMode,
	pub level: PinValue,
}

impl PinInfo {
	/// Decode the state of a pin from the raw configuration, pull and data words of its group.
	pub fn decode(location: PinLocation, numbering: DataBitNumbering, cfg: u32, pull: u32, dat: u32) -> Result<Self, Error> {
		let function_bits = read_pin_bits(cfg, location.cfg_shift(), 4) as u8;
		let pull_bits     = read_pin_bits(pull, location.pull_shift(), 2) as u8;

		// The top bit of a configuration field is reserved.
		let function = PinFunction::try_from_bits(function_bits & 0b111)
			.map_err(|_| Error::Internal(format!("invalid function bits {:03b} for {}", function_bits, location.name())))?;
		let pull = PullMode::try_from_bits(pull_bits)
			.map_err(|_| Error::Internal(format!("invalid pull bits {:02b} for {}", pull_bits, location.name())))?;
		let level = PinValue::from(read_pin_bits(dat, location.dat_shift(numbering), 1) != 0);

		Ok(Self { location, function, pull, level })
	}

	pub fn name(&self) -> String {
		self.location.name()
	}
}

fn read_pin_bits(value: u32, shift: u32, bits_per_pin: u32) -> u32 {
	let mask = !(u32::MAX << bits_per_pin);
	(value >> shift) & mask
}
