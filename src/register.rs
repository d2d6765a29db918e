/// Physical base address of the main GPIO controller (port groups A to J).
pub const BANK0_BASE: u64 = 0x01C2_0800;

/// Physical base address of the R_PIO controller (port groups K to M).
pub const BANK1_BASE: u64 = 0x01F0_2C00;

/// Index of the first port group that lives in the second bank.
pub const BANK1_FIRST_GROUP: usize = 10;

/// Number of port groups known for the SoC family (A to M).
pub const GROUP_COUNT: usize = 13;

/// Number of pins in a single port group.
pub const PINS_PER_GROUP: usize = 32;

/// Byte span of the register set of a single port group.
pub const GROUP_STRIDE: u64 = 0x24;

/// Number of banks that need to be mapped.
pub const BANK_COUNT: usize = 2;

/// One of the two physically discontiguous register banks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Bank {
	Bank0 = 0,
	Bank1 = 1,
}

impl Bank {
	/// Get the bank holding the registers of a port group.
	pub fn of_group(group: usize) -> Self {
		assert_group_index(group);
		if group < BANK1_FIRST_GROUP {
			Bank::Bank0
		} else {
			Bank::Bank1
		}
	}

	pub fn index(self) -> usize {
		self as usize
	}

	/// The physical address of the first register of the bank.
	pub fn base(self) -> u64 {
		match self {
			Bank::Bank0 => BANK0_BASE,
			Bank::Bank1 => BANK1_BASE,
		}
	}

	/// The index of the first port group in the bank.
	pub fn first_group(self) -> usize {
		match self {
			Bank::Bank0 => 0,
			Bank::Bank1 => BANK1_FIRST_GROUP,
		}
	}

	/// The page-aligned physical window that has to be mapped to reach the bank.
	pub fn window(self, page_size: usize) -> PhysicalWindow {
		let page_size = page_size as u64;
		let start = self.base() & !(page_size - 1);
		PhysicalWindow {
			start,
			len: page_size as usize,
		}
	}

	pub fn all() -> [Bank; BANK_COUNT] {
		[Bank::Bank0, Bank::Bank1]
	}
}

/// A range of physical memory to map.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PhysicalWindow {
	pub start: u64,
	pub len: usize,
}

impl PhysicalWindow {
	/// Get the byte offset of a register relative to the start of the window.
	///
	/// Returns `None` if the register is unaligned or does not lie entirely within the window.
	pub fn offset_of(&self, address: RegisterAddress) -> Option<usize> {
		let offset = usize::try_from(address.physical.checked_sub(self.start)?).ok()?;
		if offset % 4 != 0 || offset.checked_add(4)? > self.len {
			return None;
		}
		Some(offset)
	}
}

/// The registers of a port group.
///
/// The layout of each group is:
///  - 0x00..0x10: four configuration words, 4 bits per pin.
///  - 0x10: the data word, 1 bit per pin.
///  - 0x14..0x1C: two drive strength words (unused here).
///  - 0x1C..0x24: two pull words, 2 bits per pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Register {
	Cfg0  = 0x00,
	Cfg1  = 0x04,
	Cfg2  = 0x08,
	Cfg3  = 0x0C,

	Dat   = 0x10,

	Pull0 = 0x1C,
	Pull1 = 0x20,
}

impl Register {
	pub fn cfg(index: usize) -> Self {
		match index {
			0 => Register::Cfg0,
			1 => Register::Cfg1,
			2 => Register::Cfg2,
			3 => Register::Cfg3,
			_ => panic!("CFG register index must be in the range [0..4), got {}", index),
		}
	}

	pub fn dat() -> Self {
		Register::Dat
	}

	pub fn pull(index: usize) -> Self {
		match index {
			0 => Register::Pull0,
			1 => Register::Pull1,
			_ => panic!("PULL register index must be in the range [0..2), got {}", index),
		}
	}

	/// Byte offset of the register within its port group.
	pub fn offset(self) -> u64 {
		self as u64
	}
}

/// The physical location of a single 32 bit register.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RegisterAddress {
	pub bank: Bank,
	pub physical: u64,
}

impl RegisterAddress {
	/// Compute the address of a register of a port group.
	pub fn new(group: usize, register: Register) -> Self {
		let bank  = Bank::of_group(group);
		let local = (group - bank.first_group()) as u64;
		Self {
			bank,
			physical: bank.base() + local * GROUP_STRIDE + register.offset(),
		}
	}
}

impl std::fmt::Display for RegisterAddress {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "0x{:08X}", self.physical)
	}
}

/// Get the letter of a port group.
pub fn group_letter(group: usize) -> char {
	assert_group_index(group);
	(b'A' + group as u8) as char
}

/// Get the port group of a letter, if the letter names a known group.
pub fn group_from_letter(letter: char) -> Option<usize> {
	let letter = letter.to_ascii_uppercase();
	if !letter.is_ascii_uppercase() {
		return None;
	}
	let group = (letter as u8 - b'A') as usize;
	if group < GROUP_COUNT {
		Some(group)
	} else {
		None
	}
}

fn assert_group_index(group: usize) {
	assert!(group < GROUP_COUNT, "port group index out of range, expected a value in the range [0-{}), got {}", GROUP_COUNT, group);
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn groups_below_cutoff_use_first_bank() {
		assert_eq!(Bank::of_group(0), Bank::Bank0);
		assert_eq!(Bank::of_group(9), Bank::Bank0);
		assert_eq!(Bank::of_group(10), Bank::Bank1);
		assert_eq!(Bank::of_group(12), Bank::Bank1);
	}

	#[test]
	fn addresses_are_relative_to_the_bank_of_the_group() {
		assert_eq!(RegisterAddress::new(0, Register::Cfg0).physical, 0x01C2_0800);
		assert_eq!(RegisterAddress::new(0, Register::Dat).physical, 0x01C2_0810);
		assert_eq!(RegisterAddress::new(3, Register::Pull1).physical, 0x01C2_0800 + 3 * 0x24 + 0x20);
		assert_eq!(RegisterAddress::new(10, Register::Cfg0).physical, 0x01F0_2C00);
		assert_eq!(RegisterAddress::new(11, Register::Pull0).physical, 0x01F0_2C00 + 0x24 + 0x1C);
	}

	#[test]
	fn group_registers_never_overlap() {
		let last = Register::Pull1.offset() + 4;
		assert!(last <= GROUP_STRIDE);
		let a = RegisterAddress::new(4, Register::Pull1);
		let b = RegisterAddress::new(5, Register::Cfg0);
		assert!(a.physical < b.physical);
	}

	#[test]
	fn windows_are_page_aligned_and_contain_all_groups() {
		for bank in Bank::all().iter() {
			let window = bank.window(4096);
			assert_eq!(window.start % 4096, 0);
			let groups = if *bank == Bank::Bank0 { 0..BANK1_FIRST_GROUP } else { BANK1_FIRST_GROUP..GROUP_COUNT };
			for group in groups {
				let address = RegisterAddress::new(group, Register::Pull1);
				assert_eq!(address.bank, *bank);
				assert!(window.offset_of(address).is_some());
			}
		}
		assert_eq!(Bank::Bank0.window(4096).offset_of(RegisterAddress::new(0, Register::Cfg0)), Some(0x800));
	}

	#[test]
	fn addresses_outside_the_window_have_no_offset() {
		let window = Bank::Bank1.window(4096);
		assert_eq!(window.offset_of(RegisterAddress::new(0, Register::Cfg0)), None);
		assert_eq!(window.offset_of(RegisterAddress { bank: Bank::Bank1, physical: window.start + 4096 }), None);
		assert_eq!(window.offset_of(RegisterAddress { bank: Bank::Bank1, physical: window.start + 4094 }), None);
		assert_eq!(window.offset_of(RegisterAddress { bank: Bank::Bank1, physical: window.start + 2 }), None);
		assert_eq!(window.offset_of(RegisterAddress { bank: Bank::Bank1, physical: window.start + 4092 }), Some(4092));
	}

	#[test]
	fn group_letters() {
		assert_eq!(group_letter(0), 'A');
		assert_eq!(group_letter(12), 'M');
		assert_eq!(group_from_letter('l'), Some(11));
		assert_eq!(group_from_letter('N'), None);
		assert_eq!(group_from_letter('1'), None);
	}

	#[test]
	#[should_panic]
	fn unknown_group_panics() {
		RegisterAddress::new(GROUP_COUNT, Register::Dat);
	}

	#[test]
	#[should_panic]
	fn cfg_index_out_of_range_panics() {
		Register::cfg(4);
	}
}
