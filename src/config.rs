use std::path::PathBuf;

use crate::register::{GROUP_COUNT, PINS_PER_GROUP};
use crate::Error;

/// The largest pin count the register layout can address.
pub const MAX_PIN_COUNT: usize = GROUP_COUNT * PINS_PER_GROUP;

/// How the bit of a pin in the data register is numbered.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataBitNumbering {
	/// Pin `n` of a group uses bit `n - 1`, wrapping pin 0 around to bit 31.
	///
	/// This is what existing Allwinner user-space drivers do.
	Legacy,

	/// Pin `n` of a group uses bit `n`, as documented in the SoC datasheets.
	Datasheet,
}

impl DataBitNumbering {
	/// Get the data register bit for a bit offset within a port group.
	pub fn data_bit(self, bit: usize) -> usize {
		match self {
			DataBitNumbering::Legacy    => (bit + PINS_PER_GROUP - 1) % PINS_PER_GROUP,
			DataBitNumbering::Datasheet => bit,
		}
	}
}

/// Configuration for a [`SunxiDriver`](crate::SunxiDriver).
#[derive(Clone, Debug)]
pub struct DriverConfig {
	/// Number of logical pins exposed by the driver.
	pub pin_count: usize,

	/// The special file giving access to physical memory.
	pub memory_path: PathBuf,

	/// The sysfs GPIO class directory used for edge events.
	pub sysfs_path: PathBuf,

	/// Number of spin cycles to wait between writing the configuration and the pull register.
	pub settle_cycles: u32,

	pub data_bit_numbering: DataBitNumbering,
}

impl Default for DriverConfig {
	fn default() -> Self {
		Self {
			pin_count: 28,
			memory_path: PathBuf::from("/dev/mem"),
			sysfs_path: PathBuf::from("/sys/class/gpio"),
			settle_cycles: 150,
			data_bit_numbering: DataBitNumbering::Legacy,
		}
	}
}

impl DriverConfig {
	pub fn validate(&self) -> Result<(), Error> {
		if self.pin_count == 0 || self.pin_count > MAX_PIN_COUNT {
			return Err(Error::InvalidConfig(format!("pin count must be in the range [1-{}], got {}", MAX_PIN_COUNT, self.pin_count)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn default_config_is_valid() {
		let config = DriverConfig::default();
		assert!(config.validate().is_ok());
		assert_eq!(config.pin_count, 28);
		assert_eq!(config.settle_cycles, 150);
		assert_eq!(config.data_bit_numbering, DataBitNumbering::Legacy);
	}

	#[test]
	fn pin_count_is_bounded() {
		let mut config = DriverConfig::default();
		config.pin_count = 0;
		assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
		config.pin_count = MAX_PIN_COUNT + 1;
		assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
		config.pin_count = MAX_PIN_COUNT;
		assert!(config.validate().is_ok());
	}

	#[test]
	fn legacy_numbering_is_off_by_one() {
		assert_eq!(DataBitNumbering::Legacy.data_bit(10), 9);
		assert_eq!(DataBitNumbering::Legacy.data_bit(1), 0);
		assert_eq!(DataBitNumbering::Legacy.data_bit(0), 31);
		assert_eq!(DataBitNumbering::Datasheet.data_bit(0), 0);
		assert_eq!(DataBitNumbering::Datasheet.data_bit(31), 31);
	}
}
