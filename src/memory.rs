use std::ffi::c_void;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::{Mutex, OnceLock, PoisonError};

use log::{debug, trace, warn};
use nix::sys::mman::{self, MapFlags, ProtFlags};
use nix::unistd::{sysconf, SysconfVar};

use crate::register::{Bank, PhysicalWindow, RegisterAddress, BANK_COUNT};
use crate::Error;

/// An owned window of mapped memory.
///
/// The window is unmapped when the region is dropped.
/// All access goes through bounds checked volatile word accessors.
pub struct MappedRegion {
	base: NonNull<c_void>,
	len: usize,
}

// The region is plain device memory without thread affinity.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
	/// Take ownership of a mapping created with `mmap`.
	///
	/// # Safety
	/// `base` must point to a mapping of at least `len` bytes that was created by `mmap`
	/// and that is not unmapped by anything else.
	pub unsafe fn from_raw(base: NonNull<c_void>, len: usize) -> Self {
		Self { base, len }
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub(crate) fn read_u32(&self, offset: usize) -> u32 {
		unsafe { std::ptr::read_volatile(self.word(offset)) }
	}

	pub(crate) fn write_u32(&self, offset: usize, value: u32) {
		unsafe { std::ptr::write_volatile(self.word(offset), value) }
	}

	fn word(&self, offset: usize) -> *mut u32 {
		assert!(offset % 4 == 0, "unaligned register offset 0x{:X}", offset);
		assert!(offset + 4 <= self.len, "register offset 0x{:X} outside of mapped window of 0x{:X} bytes", offset, self.len);
		self.base.as_ptr().cast::<u8>().wrapping_add(offset).cast::<u32>()
	}
}

impl Drop for MappedRegion {
	fn drop(&mut self) {
		if let Err(e) = unsafe { mman::munmap(self.base, self.len) } {
			warn!("failed to unmap GPIO register window at {:p}: {}", self.base.as_ptr(), e);
		}
	}
}

/// A source of mappable physical memory.
pub trait PhysicalMemory: Send + Sync {
	/// Map each of the given physical windows into the address space of the process.
	fn map_windows(&self, windows: &[PhysicalWindow; BANK_COUNT]) -> Result<[MappedRegion; BANK_COUNT], Error>;
}

/// Physical memory accessed through `/dev/mem`.
///
/// Mapping may fail if:
///  - we don't have root permission.
///  - the kernel was compiled with CONFIG_IO_STRICT_DEVMEM.
///  - the kernel was compiled with CONFIG_STRICT_DEVMEM,
///    and not started with `iomem=relaxed` on the kernel command line.
#[derive(Clone, Debug)]
pub struct DevMem {
	path: PathBuf,
}

impl DevMem {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl Default for DevMem {
	fn default() -> Self {
		Self::new("/dev/mem")
	}
}

impl PhysicalMemory for DevMem {
	fn map_windows(&self, windows: &[PhysicalWindow; BANK_COUNT]) -> Result<[MappedRegion; BANK_COUNT], Error> {
		let file = crate::open_rw_sync(&self.path)?;
		let first  = map_shared(&file, &self.path, &windows[0])?;
		let second = map_shared(&file, &self.path, &windows[1])?;
		// The mappings stay valid after the file is closed.
		drop(file);
		Ok([first, second])
	}
}

fn map_shared(file: &File, path: &Path, window: &PhysicalWindow) -> Result<MappedRegion, Error> {
	let len = NonZeroUsize::new(window.len).ok_or_else(|| Error::Internal(String::from("refusing to map an empty window")))?;
	let offset = nix::libc::off_t::try_from(window.start)
		.map_err(|_| Error::Internal(format!("physical address 0x{:08X} does not fit in off_t", window.start)))?;

	let base = unsafe {
		mman::mmap(None, len, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE, MapFlags::MAP_SHARED, file, offset)
			.map_err(|e| Error::from_nix(format!("failed to map GPIO memory (0x{:08X}) from {}", window.start, path.display()), e))?
	};
	debug!("mapped 0x{:X} bytes of physical memory at 0x{:08X} to {:p}", window.len, window.start, base.as_ptr());

	Ok(unsafe { MappedRegion::from_raw(base, window.len) })
}

/// Zeroed anonymous memory standing in for the GPIO registers.
///
/// Useful for dry runs and tests: registers behave like plain memory.
#[derive(Clone, Debug, Default)]
pub struct AnonymousMemory;

impl PhysicalMemory for AnonymousMemory {
	fn map_windows(&self, windows: &[PhysicalWindow; BANK_COUNT]) -> Result<[MappedRegion; BANK_COUNT], Error> {
		Ok([map_anonymous(&windows[0])?, map_anonymous(&windows[1])?])
	}
}

fn map_anonymous(window: &PhysicalWindow) -> Result<MappedRegion, Error> {
	let len = NonZeroUsize::new(window.len).ok_or_else(|| Error::Internal(String::from("refusing to map an empty window")))?;
	let base = unsafe {
		mman::mmap_anonymous(None, len, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE, MapFlags::MAP_PRIVATE)
			.map_err(|e| Error::from_nix("failed to map anonymous memory", e))?
	};
	Ok(unsafe { MappedRegion::from_raw(base, window.len) })
}

/// Both register banks, mapped.
pub(crate) struct MappedBanks {
	windows: [PhysicalWindow; BANK_COUNT],
	regions: [MappedRegion; BANK_COUNT],
}

impl MappedBanks {
	pub(crate) fn read(&self, address: RegisterAddress) -> Result<u32, Error> {
		let (region, offset) = self.locate(address)?;
		let value = region.read_u32(offset);
		trace!("read register {}: 0x{:08X}", address, value);
		Ok(value)
	}

	pub(crate) fn write(&self, address: RegisterAddress, value: u32) -> Result<(), Error> {
		let (region, offset) = self.locate(address)?;
		trace!("write register {}: 0x{:08X}", address, value);
		region.write_u32(offset, value);
		Ok(())
	}

	fn locate(&self, address: RegisterAddress) -> Result<(&MappedRegion, usize), Error> {
		let bank = address.bank.index();
		let offset = self.windows[bank].offset_of(address).ok_or(Error::InvalidRegister(address, address.bank))?;
		Ok((&self.regions[bank], offset))
	}
}

/// The lazily established mapping of the GPIO register banks.
///
/// The banks are mapped on first use, at most once, no matter how many threads race to use them.
pub struct MemoryMapSession {
	memory: Box<dyn PhysicalMemory>,
	banks: OnceLock<MappedBanks>,
	init_lock: Mutex<()>,
}

impl MemoryMapSession {
	pub fn new(memory: Box<dyn PhysicalMemory>) -> Self {
		Self {
			memory,
			banks: OnceLock::new(),
			init_lock: Mutex::new(()),
		}
	}

	pub fn is_mapped(&self) -> bool {
		self.banks.get().is_some()
	}

	/// Map the register banks if they are not mapped yet.
	pub fn ensure_mapped(&self) -> Result<(), Error> {
		self.banks().map(|_| ())
	}

	pub(crate) fn banks(&self) -> Result<&MappedBanks, Error> {
		if let Some(banks) = self.banks.get() {
			return Ok(banks);
		}

		let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
		if let Some(banks) = self.banks.get() {
			return Ok(banks);
		}

		let page_size = page_size();
		let windows = Bank::all().map(|bank| bank.window(page_size));
		let regions = self.memory.map_windows(&windows)?;
		for (window, region) in windows.iter().zip(regions.iter()) {
			if region.len() < window.len {
				return Err(Error::Internal(format!("mapped 0x{:X} bytes for a window of 0x{:X} bytes", region.len(), window.len)));
			}
		}

		debug!("mapped GPIO register banks at 0x{:08X} and 0x{:08X}", windows[0].start, windows[1].start);
		Ok(self.banks.get_or_init(|| MappedBanks { windows, regions }))
	}

	/// Unmap the register banks.
	///
	/// Does nothing if the banks are not mapped.
	pub fn teardown(&mut self) {
		if self.banks.take().is_some() {
			debug!("unmapped GPIO register banks");
		}
	}
}

fn page_size() -> usize {
	match sysconf(SysconfVar::PAGE_SIZE) {
		Ok(Some(size)) if size > 0 => size as usize,
		_ => {
			warn!("failed to determine the system page size, assuming 4096 bytes");
			4096
		},
	}
}
