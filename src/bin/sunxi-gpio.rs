// vi: sw=4 ts=4 noexpandtab
use yansi::Paint;
use sunxi_linux_gpio::{
	check_sunxi_gpio,
	parse_pin_name,
	AnonymousMemory,
	CancellationToken,
	DataBitNumbering,
	DriverConfig,
	Edge,
	EdgeEventSource,
	PinInfo,
	PinMode,
	PinValue,
	SunxiDriver,
	SysfsEdgeSource,
	WaitResult,
};

use structopt::StructOpt;

#[derive(Clone, Debug)]
struct PinCommand {
	index    : usize,
	set_mode : Option<PinMode>,
	set_level: Option<PinValue>,
}

#[derive(Clone, Debug)]
struct WaitCommand {
	index: usize,
	edge : Edge,
}

#[derive(StructOpt)]
#[structopt(about = "Inspect and modify Allwinner (sunxi) GPIO state.")]
#[structopt(max_term_width = 120)]
#[structopt(setting = structopt::clap::AppSettings::DeriveDisplayOrder)]
#[structopt(setting = structopt::clap::AppSettings::UnifiedHelpMessage)]
#[structopt(setting = structopt::clap::AppSettings::ColoredHelp)]
#[structopt(after_help = "
Pins are given as a logical number (group * 32 + bit) or a name like PA10.

Allowed pin options:
    mode=input/input-pull-up/input-pull-down/output
    level=on/off
")]
struct Options {
	/// Show more information.
	#[structopt(long, short)]
	verbose: bool,

	/// Number of pins exposed by the driver.
	#[structopt(long, default_value = "28")]
	pin_count: usize,

	/// Use the bit numbering of the datasheet for the data register.
	#[structopt(long)]
	datasheet_numbering: bool,

	/// Use scratch memory instead of /dev/mem. Nothing is changed on the hardware.
	#[structopt(long)]
	dry_run: bool,

	/// Dangerous: skip the verification of the SoC.
	#[structopt(long)]
	no_verify_cpu: bool,

	/// Configure a GPIO pin.
	/// May be specified multiple times.
	#[structopt(
		long = "set-pin",
		short = "s",
		value_name = "PIN,OPTION,OPTION...",
		number_of_values = 1,
	)]
	pins: Vec<PinCommand>,

	/// Wait for an edge on a pin after applying the pin configuration.
	#[structopt(long, value_name = "PIN,edge=rising/falling/both")]
	wait: Option<WaitCommand>,
}

fn main() {
	env_logger::init();
	let options = Options::from_args();

	if !options.no_verify_cpu && !options.dry_run {
		if let Some(error) = check_sunxi_gpio().err() {
			eprintln!("{}: {}", Paint::red("Error").bold(), error);
			eprintln!();
			eprintln!("Failed to verify the SoC type. Make sure the program is being run on an Allwinner SoC.");
			eprintln!("Alternatively, add --no-verify-cpu to the command line, but note that this could be dangerous.");
			std::process::exit(1);
		}
	}

	let config = DriverConfig {
		pin_count: options.pin_count,
		data_bit_numbering: if options.datasheet_numbering { DataBitNumbering::Datasheet } else { DataBitNumbering::Legacy },
		..Default::default()
	};

	let driver = if options.dry_run {
		let sysfs_path = config.sysfs_path.clone();
		SunxiDriver::with_backends(config, Box::new(AnonymousMemory), move || {
			Ok(Box::new(SysfsEdgeSource::new(sysfs_path.clone())) as Box<dyn EdgeEventSource>)
		})
	} else {
		SunxiDriver::new(config)
	};
	let driver = driver.unwrap_or_else(|error| exit_with_error(error));

	for pin in &options.pins {
		if let Err(error) = apply(&driver, pin) {
			eprintln!("{}: {}", Paint::red("Error").bold(), error);
			eprintln!();
			eprintln!("Make sure to run the application as root on an Allwinner SoC and that your kernel was configured properly.");
			eprintln!("You may need to disable CONFIG_IO_STRICT_DEVMEM and add iomem=relaxed to the kernel command line.");
			std::process::exit(1);
		}
	}

	let shown: Vec<usize> = if options.pins.is_empty() {
		(0..driver.pin_count()).collect()
	} else {
		options.pins.iter().map(|x| x.index).collect()
	};

	for index in shown {
		match driver.pin_info(index) {
			Ok(info) => print_pin(index, &info, options.verbose),
			Err(error) => exit_with_error(error),
		}
	}

	if let Some(wait) = &options.wait {
		if driver.mode(wait.index).is_err() {
			if let Err(error) = driver.open_pin(wait.index) {
				exit_with_error(error);
			}
		}
		match driver.wait_for_edge(wait.index, wait.edge, &CancellationToken::new()) {
			Ok(WaitResult::Edge(edge)) => println!("pin={:<3}  edge={:?}", Paint::yellow(wait.index), Paint::cyan(edge)),
			Ok(WaitResult::Cancelled) => println!("pin={:<3}  {}", Paint::yellow(wait.index), Paint::magenta("cancelled")),
			Err(error) => exit_with_error(error),
		}
	}
}

fn exit_with_error(error: sunxi_linux_gpio::Error) -> ! {
	eprintln!("{}: {}", Paint::red("Error").bold(), error);
	std::process::exit(1);
}

fn apply(driver: &SunxiDriver, pin: &PinCommand) -> Result<(), sunxi_linux_gpio::Error> {
	if driver.mode(pin.index).is_err() {
		driver.open_pin(pin.index)?;
	}
	if let Some(mode) = pin.set_mode {
		driver.set_mode(pin.index, mode)?;
	}
	if let Some(level) = pin.set_level {
		driver.write(pin.index, level)?;
	}
	Ok(())
}

fn print_pin(index: usize, pin: &PinInfo, verbose: bool) {
	let level = match pin.level {
		PinValue::High => Paint::green("HIGH"),
		PinValue::Low  => Paint::red("LOW"),
	};

	let function = format!("{:?}", pin.function);
	print!("pin={:<3}  name={:<5}  level={:4}  function={:8}", Paint::yellow(index), pin.name(), level, Paint::cyan(function));

	if verbose {
		let pull = format!("{:?}", pin.pull);
		print!("  pull={}  cfg={}  dat={}", Paint::cyan(pull), pin.location.cfg_register(), pin.location.dat_register());
	}

	println!();
}

fn partition(input: &str, split_on: char) -> (&str, Option<&str>) {
	let mut parts = input.splitn(2, split_on);
	(parts.next().unwrap_or(""), parts.next())
}

fn split_key_value(input: &str) -> (&str, Option<&str>) {
	let (key, value) = partition(input, '=');
	let key = key.trim();
	let value = value.map(str::trim);
	(key, value)
}

fn parse_index(index: Option<&str>) -> Result<usize, String> {
	let index = index.ok_or_else(|| String::from("missing pin index"))?;
	match index.parse::<usize>() {
		Ok(x) => Ok(x),
		Err(_) => parse_pin_name(index).map_err(|e| e.to_string()),
	}
}

impl std::str::FromStr for PinCommand {
	type Err = String;
	fn from_str(data: &str) -> Result<Self, Self::Err> {
		let mut fields = data.split(',').map(str::trim).filter(|x| !x.is_empty());

		let mut command = PinCommand {
			index: parse_index(fields.next())?,
			set_mode: None,
			set_level: None,
		};

		for field in fields {
			let (key, value) = split_key_value(field);

			let value = match value {
				Some(x) => x,
				None => return Err(format!("missing value for option `{}`", key)),
			};

			match key {
				"mode"  => set_mode(&mut command.set_mode, key, value)?,
				"level" => set_level(&mut command.set_level, key, value)?,
				_ => return Err(format!("unknown pin option: `{}`", key)),
			}
		}

		Ok(command)
	}
}

impl std::str::FromStr for WaitCommand {
	type Err = String;
	fn from_str(data: &str) -> Result<Self, Self::Err> {
		let mut fields = data.split(',').map(str::trim).filter(|x| !x.is_empty());
		let index = parse_index(fields.next())?;

		let mut edge = Edge::Both;
		for field in fields {
			match split_key_value(field) {
				("edge", Some("rising"))  => edge = Edge::Rising,
				("edge", Some("falling")) => edge = Edge::Falling,
				("edge", Some("both"))    => edge = Edge::Both,
				("edge", value) => return Err(format!("unknown edge: {:?}, expected rising, falling or both", value)),
				(key, _) => return Err(format!("unknown wait option: `{}`", key)),
			}
		}

		Ok(WaitCommand { index, edge })
	}
}

fn set_level(dest: &mut Option<PinValue>, key: &str, value: &str) -> Result<(), String> {
	if dest.is_some() {
		return Err(format!("option `{}` already set", key))
	}

	dest.replace(match value {
		"on"  | "high" | "true"  | "1" => PinValue::High,
		"off" | "low"  | "false" | "0" => PinValue::Low,
		_ => return Err(format!("invalid level: {}, expected on, high, true, 1, off, low, false or 0", value)),
	});

	Ok(())
}

fn set_mode(dest: &mut Option<PinMode>, key: &str, value: &str) -> Result<(), String> {
	if dest.is_some() {
		return Err(format!("option `{}` already set", key))
	}

	dest.replace(match value {
		"input"  | "in"                  => PinMode::Input,
		"input-pull-up"   | "pull-up"    => PinMode::InputPullUp,
		"input-pull-down" | "pull-down"  => PinMode::InputPullDown,
		"output" | "out"                 => PinMode::Output,
		_ => return Err(format!("unknown pin mode: {}, expected input, input-pull-up, input-pull-down or output", value)),
	});

	Ok(())
}
