use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};

use crate::edge::{CancellationToken, Direction, Edge, EdgeCallback, EdgeEventSource, PendingWait, PinEvent, WaitResult};
use crate::Error;

/// Time slice for a single poll, so cancellation is noticed.
const POLL_SLICE_MS: u16 = 100;

/// How long to wait for the attributes of a freshly exported pin to appear.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(1);

type Callbacks = Arc<Mutex<Vec<(Edge, EdgeCallback)>>>;

/// Edge events through the Linux sysfs GPIO interface.
///
/// Pins are exported on demand and unexported again on dispose,
/// unless they were already exported by someone else.
pub struct SysfsEdgeSource {
	inner: Arc<Inner>,
}

struct Inner {
	root: PathBuf,
	pins: Mutex<HashMap<usize, SysfsPin>>,
}

#[derive(Default)]
struct SysfsPin {
	exported: bool,
	callbacks: Callbacks,
	watcher: Option<Watcher>,
	/// Number of waits in progress.
	waits: usize,
}

struct Watcher {
	stop: CancellationToken,
	thread: JoinHandle<()>,
}

impl Watcher {
	fn stop(self) {
		self.stop.cancel();
		// A callback may unregister itself from the watcher thread.
		if self.thread.thread().id() == std::thread::current().id() {
			return;
		}
		if self.thread.join().is_err() {
			warn!("edge callback thread panicked");
		}
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn edge_name(edge: Option<Edge>) -> &'static str {
	match edge {
		None                => "none",
		Some(Edge::Rising)  => "rising",
		Some(Edge::Falling) => "falling",
		Some(Edge::Both)    => "both",
	}
}

impl SysfsEdgeSource {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			inner: Arc::new(Inner {
				root: root.into(),
				pins: Mutex::new(HashMap::new()),
			}),
		}
	}
}

impl Default for SysfsEdgeSource {
	fn default() -> Self {
		Self::new("/sys/class/gpio")
	}
}

impl Inner {
	fn pin_dir(&self, pin: usize) -> PathBuf {
		self.root.join(format!("gpio{}", pin))
	}

	fn write_file(path: &Path, value: &str) -> Result<(), Error> {
		std::fs::write(path, value).map_err(|e| Error::from_io(format!("failed to write {:?} to {}", value, path.display()), e))
	}

	fn write_attribute(&self, pin: usize, name: &str, value: &str) -> Result<(), Error> {
		trace!("gpio{}: {} = {}", pin, name, value);
		Self::write_file(&self.pin_dir(pin).join(name), value)
	}

	/// Export a pin if it is not exported yet.
	///
	/// Returns true if the pin was exported by this call.
	fn export(&self, pin: usize) -> Result<bool, Error> {
		if self.pin_dir(pin).exists() {
			return Ok(false);
		}

		Self::write_file(&self.root.join("export"), &pin.to_string())?;
		debug!("exported gpio{}", pin);

		let value = self.pin_dir(pin).join("value");
		let deadline = Instant::now() + EXPORT_TIMEOUT;
		while !value.exists() {
			if Instant::now() >= deadline {
				return Err(Error::HardwareAccess {
					message: format!("timed out waiting for {} to appear", value.display()),
					errno: None,
				});
			}
			std::thread::sleep(Duration::from_millis(10));
		}
		Ok(true)
	}

	fn unexport(&self, pin: usize) -> Result<(), Error> {
		Self::write_file(&self.root.join("unexport"), &pin.to_string())?;
		debug!("unexported gpio{}", pin);
		Ok(())
	}

	/// Open the value attribute of a pin and consume the pending state.
	fn open_value(&self, pin: usize) -> Result<(File, PathBuf), Error> {
		let path = self.pin_dir(pin).join("value");
		let mut file = File::open(&path).map_err(|e| Error::from_io(format!("failed to open {}", path.display()), e))?;
		read_level(&mut file, &path)?;
		Ok((file, path))
	}

	fn wait(&self, pin: usize, edge: Edge, cancel: &CancellationToken) -> Result<WaitResult, Error> {
		let _wait = self.begin_wait(pin, edge)?;
		let (mut file, path) = self.open_value(pin)?;

		loop {
			if cancel.is_cancelled() {
				return Ok(WaitResult::Cancelled);
			}
			if poll_value(&file, &path)? {
				let observed = observed_edge(read_level(&mut file, &path)?);
				if edge.matches(observed) {
					return Ok(WaitResult::Edge(observed));
				}
			}
		}
	}

	/// Select the edges needed by a new wait and count it as in progress.
	///
	/// The edge attribute is shared by everything listening on the pin.
	/// While a callback thread or another wait is active, both edges stay selected.
	fn begin_wait(&self, pin: usize, edge: Edge) -> Result<ActiveWait, Error> {
		let mut pins = lock(&self.pins);
		let state = pins.get_mut(&pin);
		let shared = state.as_ref().map_or(false, |state| state.watcher.is_some() || state.waits > 0);
		self.write_attribute(pin, "edge", edge_name(Some(if shared { Edge::Both } else { edge })))?;
		if let Some(state) = state {
			state.waits += 1;
		}
		Ok(ActiveWait { inner: self, pin })
	}

	fn start_watcher(&self, pin: usize, callbacks: Callbacks) -> Result<Watcher, Error> {
		self.write_attribute(pin, "edge", edge_name(Some(Edge::Both)))?;
		let (file, path) = self.open_value(pin)?;

		let stop = CancellationToken::new();
		let thread = {
			let stop = stop.clone();
			std::thread::Builder::new()
				.name(format!("gpio{}-edges", pin))
				.spawn(move || watch(pin, file, path, callbacks, stop))
				.map_err(|e| Error::from_io("failed to spawn edge callback thread", e))?
		};
		debug!("gpio{}: started edge callback thread", pin);
		Ok(Watcher { stop, thread })
	}
}

struct ActiveWait<'a> {
	inner: &'a Inner,
	pin: usize,
}

impl Drop for ActiveWait<'_> {
	fn drop(&mut self) {
		if let Some(state) = lock(&self.inner.pins).get_mut(&self.pin) {
			state.waits = state.waits.saturating_sub(1);
		}
	}
}

fn watch(pin: usize, mut file: File, path: PathBuf, callbacks: Callbacks, stop: CancellationToken) {
	while !stop.is_cancelled() {
		let level = match poll_value(&file, &path).and_then(|ready| if ready { read_level(&mut file, &path).map(Some) } else { Ok(None) }) {
			Ok(Some(level)) => level,
			Ok(None) => continue,
			Err(e) => {
				warn!("gpio{}: stopped delivering edge events: {}", pin, e);
				return;
			},
		};

		let event = PinEvent { pin, edge: observed_edge(level) };
		let matching: Vec<EdgeCallback> = lock(&callbacks).iter()
			.filter(|(edge, _)| edge.matches(event.edge))
			.map(|(_, callback)| callback.clone())
			.collect();
		for callback in matching {
			callback(event);
		}
	}
}

fn observed_edge(level: bool) -> Edge {
	if level { Edge::Rising } else { Edge::Falling }
}

fn poll_value(file: &File, path: &Path) -> Result<bool, Error> {
	let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLPRI | PollFlags::POLLERR)];
	match poll(&mut fds, POLL_SLICE_MS) {
		Ok(ready) => Ok(ready > 0),
		Err(Errno::EINTR) => Ok(false),
		Err(e) => Err(Error::from_nix(format!("failed to poll {}", path.display()), e)),
	}
}

fn read_level(file: &mut File, path: &Path) -> Result<bool, Error> {
	let mut buffer = [0u8; 4];
	file.seek(SeekFrom::Start(0))
		.and_then(|_| file.read(&mut buffer))
		.map(|read| read > 0 && buffer[0] == b'1')
		.map_err(|e| Error::from_io(format!("failed to read from {}", path.display()), e))
}

impl EdgeEventSource for SysfsEdgeSource {
	fn open_pin(&self, pin: usize) -> Result<(), Error> {
		let mut pins = lock(&self.inner.pins);
		if pins.contains_key(&pin) {
			return Ok(());
		}
		let exported = self.inner.export(pin)?;
		pins.insert(pin, SysfsPin { exported, ..Default::default() });
		Ok(())
	}

	fn set_mode(&self, pin: usize, direction: Direction) -> Result<(), Error> {
		let direction = match direction {
			Direction::Input  => "in",
			Direction::Output => "out",
		};
		self.inner.write_attribute(pin, "direction", direction)
	}

	fn register_callback(&self, pin: usize, edge: Edge, callback: EdgeCallback) -> Result<(), Error> {
		let mut pins = lock(&self.inner.pins);
		let state = pins.entry(pin).or_default();
		lock(&state.callbacks).push((edge, callback));

		if state.watcher.is_none() {
			match self.inner.start_watcher(pin, state.callbacks.clone()) {
				Ok(watcher) => state.watcher = Some(watcher),
				Err(e) => {
					lock(&state.callbacks).pop();
					return Err(e);
				},
			}
		}
		Ok(())
	}

	fn unregister_callback(&self, pin: usize, callback: &EdgeCallback) -> Result<(), Error> {
		let watcher = {
			let mut pins = lock(&self.inner.pins);
			let state = match pins.get_mut(&pin) {
				Some(x) => x,
				None => return Ok(()),
			};

			let mut callbacks = lock(&state.callbacks);
			callbacks.retain(|(_, registered)| !Arc::ptr_eq(registered, callback));
			if callbacks.is_empty() {
				drop(callbacks);
				state.watcher.take()
			} else {
				None
			}
		};

		// A running callback may need the pin table, so it must not be locked while joining the watcher.
		if let Some(watcher) = watcher {
			watcher.stop();
			debug!("gpio{}: stopped edge callback thread", pin);

			let pins = lock(&self.inner.pins);
			let idle = pins.get(&pin).map_or(false, |state| state.watcher.is_none() && state.waits == 0);
			if idle {
				self.inner.write_attribute(pin, "edge", edge_name(None))?;
			}
		}
		Ok(())
	}

	fn wait_for_event(&self, pin: usize, edge: Edge, cancel: &CancellationToken) -> Result<WaitResult, Error> {
		self.inner.wait(pin, edge, cancel)
	}

	fn wait_for_event_async(&self, pin: usize, edge: Edge, cancel: CancellationToken) -> Result<PendingWait, Error> {
		let inner = self.inner.clone();
		PendingWait::spawn(format!("gpio{}-wait", pin), move || inner.wait(pin, edge, &cancel))
	}

	fn dispose(&self) {
		let pins: Vec<(usize, SysfsPin)> = lock(&self.inner.pins).drain().collect();
		for (pin, state) in pins {
			if let Some(watcher) = state.watcher {
				watcher.stop();
				if let Err(e) = self.inner.write_attribute(pin, "edge", edge_name(None)) {
					warn!("gpio{}: {}", pin, e);
				}
			}
			if state.exported {
				if let Err(e) = self.inner.unexport(pin) {
					warn!("gpio{}: {}", pin, e);
				}
			}
		}
	}
}

impl Drop for SysfsEdgeSource {
	fn drop(&mut self) {
		self.dispose();
	}
}
