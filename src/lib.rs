//! Access to the GPIO controller of Allwinner (sunxi) SoCs from Linux user space.
//!
//! Pin functions, pull resistors and levels are controlled by mapping the GPIO
//! registers from `/dev/mem`. Edge events are delegated to an [`EdgeEventSource`],
//! by default the sysfs GPIO interface.
//!
//! ```no_run
//! use sunxi_linux_gpio::{DriverConfig, PinMode, PinValue, SunxiDriver};
//!
//! # fn main() -> Result<(), sunxi_linux_gpio::Error> {
//! let driver = SunxiDriver::new(DriverConfig::default())?;
//! driver.open_pin(10)?;
//! driver.set_mode(10, PinMode::Output)?;
//! driver.write(10, PinValue::High)?;
//! # Ok(())
//! # }
//! ```

use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;

use nix::errno::Errno;
use nix::fcntl::OFlag;

mod cache;
mod config;
mod driver;
mod edge;
mod io;
mod memory;
mod pin;
mod read;
mod register;
mod sysfs;

pub use cache::PinModeCache;
pub use config::{DataBitNumbering, DriverConfig, MAX_PIN_COUNT};
pub use driver::SunxiDriver;
pub use edge::{CancellationToken, Direction, Edge, EdgeCallback, EdgeEventBridge, EdgeEventSource, PendingWait, PinEvent, WaitResult};
pub use memory::{AnonymousMemory, DevMem, MappedRegion, MemoryMapSession, PhysicalMemory};
pub use pin::{parse_pin_name, PinLocation, PinLocator};
pub use read::PinInfo;
pub use register::{Bank, PhysicalWindow, Register, RegisterAddress};
pub use sysfs::SysfsEdgeSource;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("pin {pin} out of range, expected a value in the range [0-{count})")]
	InvalidPin { pin: usize, count: usize },

	#[error("pin {pin} does not support mode {mode:?}")]
	UnsupportedMode { pin: usize, mode: PinMode },

	#[error("pin {0} is not open")]
	PinNotOpen(usize),

	#[error("{message}{}", .errno.map(|e| format!(": {}", e)).unwrap_or_default())]
	HardwareAccess { message: String, errno: Option<Errno> },

	#[error("internal error: {0}")]
	Internal(String),

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("register address {0} is not in the mapped window of {1:?}")]
	InvalidRegister(RegisterAddress, Bank),
}

impl Error {
	fn from_nix(message: impl std::string::ToString, error: nix::Error) -> Self {
		Error::HardwareAccess { message: message.to_string(), errno: Some(error) }
	}

	fn from_io(message: impl std::string::ToString, error: std::io::Error) -> Self {
		let errno = error.raw_os_error().map(Errno::from_raw);
		Error::HardwareAccess { message: message.to_string(), errno }
	}
}

/// A pin mode as requested by users of the driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PinMode {
	Input,
	InputPullUp,
	InputPullDown,
	Output,
	/// One of the peripheral functions 2 to 6 of the pin.
	Alternate(u8),
	Disabled,
}

impl PinMode {
	/// The function and pull configuration for a mode, if the driver can configure it.
	pub fn encoding(self) -> Option<(PinFunction, PullMode)> {
		match self {
			PinMode::Input         => Some((PinFunction::Input, PullMode::Disabled)),
			PinMode::InputPullUp   => Some((PinFunction::Input, PullMode::PullUp)),
			PinMode::InputPullDown => Some((PinFunction::Input, PullMode::PullDown)),
			PinMode::Output        => Some((PinFunction::Output, PullMode::Disabled)),
			PinMode::Alternate(_)  => None,
			PinMode::Disabled      => None,
		}
	}

	pub fn is_supported(self) -> bool {
		self.encoding().is_some()
	}
}

/// The function selected in the configuration register of a pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum PinFunction {
	Input,
	Output,
	Alt2,
	Alt3,
	Alt4,
	Alt5,
	Alt6,
	Disabled,
}

impl PinFunction {
	pub fn try_from_bits(bits: u8) -> Result<Self, ()> {
		match bits {
			0b000 => Ok(PinFunction::Input),
			0b001 => Ok(PinFunction::Output),
			0b010 => Ok(PinFunction::Alt2),
			0b011 => Ok(PinFunction::Alt3),
			0b100 => Ok(PinFunction::Alt4),
			0b101 => Ok(PinFunction::Alt5),
			0b110 => Ok(PinFunction::Alt6),
			0b111 => Ok(PinFunction::Disabled),
			_     => Err(())
		}
	}

	pub fn to_bits(self) -> u8 {
		match self {
			PinFunction::Input    => 0b000,
			PinFunction::Output   => 0b001,
			PinFunction::Alt2     => 0b010,
			PinFunction::Alt3     => 0b011,
			PinFunction::Alt4     => 0b100,
			PinFunction::Alt5     => 0b101,
			PinFunction::Alt6     => 0b110,
			PinFunction::Disabled => 0b111,
		}
	}
}

/// A pull up/down mode for a GPIO pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum PullMode {
	Disabled,
	PullUp,
	PullDown,
	/// The reserved encoding `0b11`, never written by the driver.
	Reserved,
}

impl PullMode {
	pub fn try_from_bits(bits: u8) -> Result<Self, ()> {
		match bits {
			0b00 => Ok(PullMode::Disabled),
			0b01 => Ok(PullMode::PullUp),
			0b10 => Ok(PullMode::PullDown),
			0b11 => Ok(PullMode::Reserved),
			_    => Err(()),
		}
	}

	pub fn to_bits(self) -> u8 {
		match self {
			PullMode::Disabled => 0b00,
			PullMode::PullUp   => 0b01,
			PullMode::PullDown => 0b10,
			PullMode::Reserved => 0b11,
		}
	}
}

/// The logic level of a pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PinValue {
	Low,
	High,
}

impl From<bool> for PinValue {
	fn from(value: bool) -> Self {
		if value { PinValue::High } else { PinValue::Low }
	}
}

impl From<PinValue> for bool {
	fn from(value: PinValue) -> bool {
		value == PinValue::High
	}
}

struct FileWithPath {
	pub path: std::path::PathBuf,
	pub file: std::fs::File,
}

fn open(path: impl Into<std::path::PathBuf>) -> Result<FileWithPath, Error> {
	let path = path.into();
	let file = std::fs::File::open(&path).map_err(|e| Error::from_io(format!("failed to open {}", path.display()), e))?;
	Ok(FileWithPath {
		path,
		file,
	})
}

fn open_rw_sync(path: impl Into<std::path::PathBuf>) -> Result<std::fs::File, Error> {
	let path = path.into();
	std::fs::OpenOptions::new().create(false).read(true).write(true).custom_flags(OFlag::O_SYNC.bits()).open(&path)
		.map_err(|e| Error::from_io(format!("failed to open {}", path.display()), e))
}

fn read_all(file: FileWithPath) -> Result<Vec<u8>, Error> {
	let mut file = file;
	let mut data = Vec::new();
	file.file.read_to_end(&mut data).map_err(|e| Error::from_io(format!("failed to read from {}", file.path.display()), e))?;
	Ok(data)
}

/// Check whether the current platform is an Allwinner SoC according to the device tree.
pub fn check_sunxi_gpio() -> Result<(), Error> {
	const EXPECTED_VENDOR: &[u8] = b"allwinner,";

	let data = read_all(open("/proc/device-tree/compatible")?)?;

	// The compatible property is a list of NUL terminated strings.
	let compatible: Vec<&[u8]> = data.split(|c| *c == 0).filter(|x| !x.is_empty()).collect();
	if compatible.iter().any(|x| x.starts_with(EXPECTED_VENDOR)) {
		Ok(())
	} else {
		let found: Vec<_> = compatible.iter().map(|x| String::from_utf8_lossy(x)).collect();
		Err(Error::HardwareAccess {
			message: format!("invalid SoC vendor, expected allwinner, got {:?}", found),
			errno: None,
		})
	}
}
