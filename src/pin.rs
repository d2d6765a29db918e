use crate::config::DataBitNumbering;
use crate::register::{group_from_letter, group_letter, Register, RegisterAddress, GROUP_COUNT, PINS_PER_GROUP};
use crate::Error;

/// The register coordinates of a pin: its port group and the bit offset within that group.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PinLocation {
	pub group: usize,
	pub bit: usize,
}

impl PinLocation {
	/// The configuration register holding the 4 bit function field of the pin.
	pub fn cfg_register(&self) -> RegisterAddress {
		RegisterAddress::new(self.group, Register::cfg(self.bit / 8))
	}

	pub fn cfg_shift(&self) -> u32 {
		((self.bit % 8) * 4) as u32
	}

	/// The pull register holding the 2 bit pull field of the pin.
	pub fn pull_register(&self) -> RegisterAddress {
		RegisterAddress::new(self.group, Register::pull(self.bit / 16))
	}

	pub fn pull_shift(&self) -> u32 {
		((self.bit % 16) * 2) as u32
	}

	pub fn dat_register(&self) -> RegisterAddress {
		RegisterAddress::new(self.group, Register::dat())
	}

	pub fn dat_shift(&self, numbering: DataBitNumbering) -> u32 {
		numbering.data_bit(self.bit) as u32
	}

	/// The name of the pin as printed on schematics, for example `PA10`.
	pub fn name(&self) -> String {
		format!("P{}{}", group_letter(self.group), self.bit)
	}
}

/// Translates between logical pin numbers and register coordinates.
#[derive(Copy, Clone, Debug)]
pub struct PinLocator {
	pin_count: usize,
}

impl PinLocator {
	pub fn new(pin_count: usize) -> Self {
		Self { pin_count }
	}

	pub fn pin_count(&self) -> usize {
		self.pin_count
	}

	pub fn validate(&self, pin: usize) -> Result<(), Error> {
		if pin >= self.pin_count {
			return Err(Error::InvalidPin { pin, count: self.pin_count });
		}
		Ok(())
	}

	pub fn resolve(&self, pin: usize) -> Result<PinLocation, Error> {
		self.validate(pin)?;
		let bit   = pin % PINS_PER_GROUP;
		let group = (pin - bit) / PINS_PER_GROUP;
		Ok(PinLocation { group, bit })
	}

	pub fn compose(group: usize, bit: usize) -> usize {
		group * PINS_PER_GROUP + bit
	}
}

/// Parse a pin name such as `PA10` or `pl3` into a logical pin number.
pub fn parse_pin_name(name: &str) -> Result<usize, Error> {
	let invalid = || Error::InvalidConfig(format!("invalid pin name: {}", name));

	let mut chars = name.trim().chars();
	match chars.next() {
		Some('P') | Some('p') => (),
		_ => return Err(invalid()),
	}

	let group = chars.next().and_then(group_from_letter).ok_or_else(invalid)?;
	let bit: usize = chars.as_str().parse().map_err(|_| invalid())?;
	if bit >= PINS_PER_GROUP || group >= GROUP_COUNT {
		return Err(invalid());
	}

	Ok(PinLocator::compose(group, bit))
}
