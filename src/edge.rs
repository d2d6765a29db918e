use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::debug;

use crate::{Error, PinMode};

/// The pin direction understood by an edge event source.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
	Input,
	Output,
}

/// A signal edge, or the set of edges to wait for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Edge {
	Rising,
	Falling,
	Both,
}

impl Edge {
	/// Check if an observed edge is one of the edges selected by `self`.
	pub fn matches(self, observed: Edge) -> bool {
		match self {
			Edge::Both => true,
			edge       => edge == observed,
		}
	}
}

/// An edge observed on a pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinEvent {
	pub pin: usize,
	pub edge: Edge,
}

/// A callback invoked for edge events.
///
/// Callbacks are identified by the pointer of the [`Arc`], so keep a clone to unregister it later.
pub type EdgeCallback = Arc<dyn Fn(PinEvent) + Send + Sync>;

/// The outcome of waiting for an edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaitResult {
	Edge(Edge),
	Cancelled,
}

/// A flag to stop a wait for an edge from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
	cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst)
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}

/// The result of a wait running on another thread.
pub struct PendingWait {
	receiver: mpsc::Receiver<Result<WaitResult, Error>>,
}

impl PendingWait {
	/// Run a wait on a new thread.
	pub fn spawn<F>(name: String, wait: F) -> Result<Self, Error>
	where
		F: FnOnce() -> Result<WaitResult, Error> + Send + 'static,
	{
		let (sender, receiver) = mpsc::channel();
		std::thread::Builder::new()
			.name(name)
			.spawn(move || {
				// Nobody may be listening anymore, that's fine.
				drop(sender.send(wait()));
			})
			.map_err(|e| Error::from_io("failed to spawn edge wait thread", e))?;
		Ok(Self { receiver })
	}

	/// A wait that already finished.
	pub fn ready(result: Result<WaitResult, Error>) -> Self {
		let (sender, receiver) = mpsc::channel();
		drop(sender.send(result));
		Self { receiver }
	}

	/// Block until the wait finishes.
	pub fn wait(self) -> Result<WaitResult, Error> {
		self.receiver.recv().unwrap_or_else(|_| Err(lost_result()))
	}

	/// Get the result if the wait finished, without blocking.
	pub fn try_wait(&self) -> Option<Result<WaitResult, Error>> {
		match self.receiver.try_recv() {
			Ok(result) => Some(result),
			Err(TryRecvError::Empty) => None,
			Err(TryRecvError::Disconnected) => Some(Err(lost_result())),
		}
	}
}

fn lost_result() -> Error {
	Error::Internal(String::from("edge wait finished without producing a result"))
}

/// Something that can deliver edge events for pins.
pub trait EdgeEventSource: Send + Sync {
	fn open_pin(&self, pin: usize) -> Result<(), Error>;

	fn set_mode(&self, pin: usize, direction: Direction) -> Result<(), Error>;

	fn register_callback(&self, pin: usize, edge: Edge, callback: EdgeCallback) -> Result<(), Error>;

	fn unregister_callback(&self, pin: usize, callback: &EdgeCallback) -> Result<(), Error>;

	/// Block until an edge occurs or the token is cancelled.
	fn wait_for_event(&self, pin: usize, edge: Edge, cancel: &CancellationToken) -> Result<WaitResult, Error>;

	/// Start waiting for an edge without blocking the caller.
	fn wait_for_event_async(&self, pin: usize, edge: Edge, cancel: CancellationToken) -> Result<PendingWait, Error>;

	/// Release everything the source holds.
	fn dispose(&self);
}

type SourceFactory = Box<dyn Fn() -> Result<Box<dyn EdgeEventSource>, Error> + Send + Sync>;

/// Forwards edge event requests to a lazily created [`EdgeEventSource`].
pub struct EdgeEventBridge {
	factory: SourceFactory,
	source: OnceLock<Box<dyn EdgeEventSource>>,
	init_lock: Mutex<()>,
}

impl EdgeEventBridge {
	pub fn new<F>(factory: F) -> Self
	where
		F: Fn() -> Result<Box<dyn EdgeEventSource>, Error> + Send + Sync + 'static,
	{
		Self {
			factory: Box::new(factory),
			source: OnceLock::new(),
			init_lock: Mutex::new(()),
		}
	}

	/// Translate a pin mode to the direction understood by the edge event source.
	pub fn to_external_mode(mode: PinMode) -> Result<Direction, Error> {
		match mode {
			PinMode::Input | PinMode::InputPullUp | PinMode::InputPullDown => Ok(Direction::Input),
			PinMode::Output => Ok(Direction::Output),
			PinMode::Alternate(_) | PinMode::Disabled => Err(Error::Internal(format!("can not translate pin mode {:?} for edge events", mode))),
		}
	}

	pub fn is_initialized(&self) -> bool {
		self.source.get().is_some()
	}

	fn source(&self) -> Result<&dyn EdgeEventSource, Error> {
		if let Some(source) = self.source.get() {
			return Ok(source.as_ref());
		}

		let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
		if let Some(source) = self.source.get() {
			return Ok(source.as_ref());
		}

		let source = (self.factory)()?;
		debug!("created edge event source");
		Ok(self.source.get_or_init(|| source).as_ref())
	}

	/// Make sure the source knows the pin with the direction derived from `mode`.
	fn prepare(&self, pin: usize, mode: PinMode) -> Result<&dyn EdgeEventSource, Error> {
		let direction = Self::to_external_mode(mode)?;
		let source = self.source()?;
		source.open_pin(pin)?;
		source.set_mode(pin, direction)?;
		Ok(source)
	}

	pub fn register_callback(&self, pin: usize, mode: PinMode, edge: Edge, callback: EdgeCallback) -> Result<(), Error> {
		self.prepare(pin, mode)?.register_callback(pin, edge, callback)
	}

	pub fn unregister_callback(&self, pin: usize, mode: PinMode, callback: &EdgeCallback) -> Result<(), Error> {
		self.prepare(pin, mode)?.unregister_callback(pin, callback)
	}

	pub fn wait_for_event(&self, pin: usize, mode: PinMode, edge: Edge, cancel: &CancellationToken) -> Result<WaitResult, Error> {
		self.prepare(pin, mode)?.wait_for_event(pin, edge, cancel)
	}

	pub fn wait_for_event_async(&self, pin: usize, mode: PinMode, edge: Edge, cancel: CancellationToken) -> Result<PendingWait, Error> {
		self.prepare(pin, mode)?.wait_for_event_async(pin, edge, cancel)
	}

	/// Dispose of the edge event source, if it was created.
	pub fn dispose(&mut self) {
		if let Some(source) = self.source.take() {
			debug!("disposing edge event source");
			source.dispose();
		}
	}
}
