use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::{Error, PinMode};

/// The last mode configured for each pin.
///
/// Entries are created by the first successful mode change of a pin and are never removed.
#[derive(Debug, Default)]
pub struct PinModeCache {
	modes: Mutex<HashMap<usize, PinMode>>,
}

impl PinModeCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(&self, pin: usize, mode: PinMode) {
		self.modes.lock().unwrap_or_else(PoisonError::into_inner).insert(pin, mode);
	}

	/// Get the cached mode of a pin, if the pin was ever configured.
	pub fn get(&self, pin: usize) -> Option<PinMode> {
		self.modes.lock().unwrap_or_else(PoisonError::into_inner).get(&pin).copied()
	}

	pub fn mode(&self, pin: usize) -> Result<PinMode, Error> {
		self.get(pin).ok_or(Error::PinNotOpen(pin))
	}
}
