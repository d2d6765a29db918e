use log::{debug, trace};

use crate::cache::PinModeCache;
use crate::config::DriverConfig;
use crate::edge::{CancellationToken, Edge, EdgeCallback, EdgeEventBridge, EdgeEventSource, PendingWait, WaitResult};
use crate::io::RegisterIo;
use crate::memory::{DevMem, PhysicalMemory};
use crate::pin::PinLocator;
use crate::read::PinInfo;
use crate::register::RegisterAddress;
use crate::sysfs::SysfsEdgeSource;
use crate::{Error, PinMode, PinValue};

/// GPIO driver for Allwinner SoCs.
///
/// Pin numbers are logical: `group * 32 + bit`, so `PA10` is pin 10 and `PC3` is pin 67.
/// The register banks are mapped on the first operation that needs them.
///
/// Mode changes and level writes are read-modify-write sequences on registers shared by many pins.
/// They are not serialized: callers must serialize concurrent changes to pins that share a register.
pub struct SunxiDriver {
	locator: PinLocator,
	io: RegisterIo,
	modes: PinModeCache,
	edges: EdgeEventBridge,
}

impl SunxiDriver {
	/// Create a driver using `/dev/mem` and the sysfs GPIO interface.
	pub fn new(config: DriverConfig) -> Result<Self, Error> {
		let memory = DevMem::new(config.memory_path.clone());
		let sysfs_path = config.sysfs_path.clone();
		Self::with_backends(config, Box::new(memory), move || {
			Ok(Box::new(SysfsEdgeSource::new(sysfs_path.clone())) as Box<dyn EdgeEventSource>)
		})
	}

	/// Create a driver with a custom source of physical memory and edge events.
	///
	/// The edge event source is created on first use.
	pub fn with_backends<F>(config: DriverConfig, memory: Box<dyn PhysicalMemory>, edge_source: F) -> Result<Self, Error>
	where
		F: Fn() -> Result<Box<dyn EdgeEventSource>, Error> + Send + Sync + 'static,
	{
		config.validate()?;
		debug!("creating sunxi GPIO driver for {} pins", config.pin_count);
		Ok(Self {
			locator: PinLocator::new(config.pin_count),
			io: RegisterIo::new(memory, config.data_bit_numbering, config.settle_cycles),
			modes: PinModeCache::new(),
			edges: EdgeEventBridge::new(edge_source),
		})
	}

	pub fn pin_count(&self) -> usize {
		self.locator.pin_count()
	}

	/// Convert a board pin number to the logical numbering of the driver.
	pub fn to_logical_numbering(&self, board_pin: usize) -> usize {
		board_pin
	}

	pub fn validate(&self, pin: usize) -> Result<(), Error> {
		self.locator.validate(pin)
	}

	/// Open a pin, configuring it as input.
	pub fn open_pin(&self, pin: usize) -> Result<(), Error> {
		self.validate(pin)?;
		self.io.ensure_mapped()?;
		self.set_mode(pin, PinMode::Input)
	}

	/// Close a pin, leaving it as input.
	///
	/// Output pins are driven low before they are switched to input.
	pub fn close_pin(&self, pin: usize) -> Result<(), Error> {
		self.validate(pin)?;
		if self.modes.get(pin) == Some(PinMode::Output) {
			self.write(pin, PinValue::Low)?;
			self.set_mode(pin, PinMode::Input)?;
		}
		Ok(())
	}

	pub fn set_mode(&self, pin: usize, mode: PinMode) -> Result<(), Error> {
		let location = self.locator.resolve(pin)?;
		let (function, pull) = match mode.encoding() {
			Some(x) => x,
			None => return Err(Error::UnsupportedMode { pin, mode }),
		};

		self.io.configure(location, function, pull)?;
		self.modes.set(pin, mode);
		trace!("pin {} ({}) set to {:?}", pin, location.name(), mode);
		Ok(())
	}

	/// Get the last mode set for a pin.
	pub fn mode(&self, pin: usize) -> Result<PinMode, Error> {
		self.validate(pin)?;
		self.modes.mode(pin)
	}

	pub fn is_mode_supported(&self, _pin: usize, mode: PinMode) -> bool {
		mode.is_supported()
	}

	/// Read the level of a pin.
	///
	/// This does not check the mode of the pin: output pins report their driven level.
	pub fn read(&self, pin: usize) -> Result<PinValue, Error> {
		let location = self.locator.resolve(pin)?;
		self.io.read_level(location)
	}

	/// Set the level of a pin.
	///
	/// The level is stored even if the pin is not an output.
	pub fn write(&self, pin: usize, value: PinValue) -> Result<(), Error> {
		let location = self.locator.resolve(pin)?;
		self.io.write_level(location, value)
	}

	/// Read the function, pull mode and level of a pin straight from the registers.
	pub fn pin_info(&self, pin: usize) -> Result<PinInfo, Error> {
		let location = self.locator.resolve(pin)?;
		self.io.read_info(location)
	}

	/// Read a raw register.
	pub fn read_register(&self, address: RegisterAddress) -> Result<u32, Error> {
		self.io.read_register(address)
	}

	pub fn register_edge_callback(&self, pin: usize, edge: Edge, callback: EdgeCallback) -> Result<(), Error> {
		let mode = self.open_mode(pin)?;
		self.edges.register_callback(pin, mode, edge, callback)
	}

	pub fn unregister_edge_callback(&self, pin: usize, callback: &EdgeCallback) -> Result<(), Error> {
		let mode = self.open_mode(pin)?;
		self.edges.unregister_callback(pin, mode, callback)
	}

	/// Block until an edge occurs on a pin, or until the token is cancelled.
	pub fn wait_for_edge(&self, pin: usize, edge: Edge, cancel: &CancellationToken) -> Result<WaitResult, Error> {
		let mode = self.open_mode(pin)?;
		self.edges.wait_for_event(pin, mode, edge, cancel)
	}

	/// Wait for an edge on a pin on another thread.
	pub fn wait_for_edge_async(&self, pin: usize, edge: Edge, cancel: CancellationToken) -> Result<PendingWait, Error> {
		let mode = self.open_mode(pin)?;
		self.edges.wait_for_event_async(pin, mode, edge, cancel)
	}

	/// Release the edge event source and unmap the registers.
	///
	/// Safe to call more than once. Also done when the driver is dropped.
	pub fn dispose(&mut self) {
		self.edges.dispose();
		self.io.teardown();
	}

	fn open_mode(&self, pin: usize) -> Result<PinMode, Error> {
		self.validate(pin)?;
		self.modes.mode(pin)
	}
}

impl Drop for SunxiDriver {
	fn drop(&mut self) {
		self.dispose();
	}
}
