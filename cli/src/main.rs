//! A basic command-line driver for the PDP-1 emulator: load an octal
//! memory listing, run until something stops the machine, print the
//! register file.

use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;

use atty::Stream;
use clap::{Arg, ArgAction, Command};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing::{event, Level};
use tracing_subscriber::prelude::*;

use base::prelude::*;
use cpu::{
    BasicClock, CpuConfiguration, IntervalClock, MemoryConfiguration, MulDivMode, Pdp1, SbsMode,
    StopCondition,
};

/// Parse one line of an octal memory listing: `address value`, with
/// everything after a `;` ignored.
fn parse_listing_line(line: &str) -> Result<Option<(Address, Word)>, String> {
    let meaningful = match line.split_once(';') {
        Some((before, _comment)) => before,
        None => line,
    };
    let mut fields = meaningful.split_whitespace();
    let (addr_text, value_text) = match (fields.next(), fields.next()) {
        (None, _) => return Ok(None), // blank or comment-only line
        (Some(a), Some(v)) => (a, v),
        (Some(_), None) => return Err(format!("malformed listing line: {line:?}")),
    };
    if let Some(extra) = fields.next() {
        return Err(format!("unexpected extra field {extra:?} in line {line:?}"));
    }
    let addr = u32::from_str_radix(addr_text, 8)
        .map_err(|e| format!("bad address {addr_text:?}: {e}"))
        .and_then(|n| Address::try_from(n).map_err(|e| format!("address {addr_text}: {e}")))?;
    let value = u32::from_str_radix(value_text, 8)
        .map_err(|e| format!("bad value {value_text:?}: {e}"))
        .and_then(|n| Word::try_from(n).map_err(|e| format!("value {value_text}: {e}")))?;
    Ok(Some((addr, value)))
}

fn load_listing(machine: &mut Pdp1, path: &PathBuf) -> Result<usize, Box<dyn Error>> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for line in reader.lines() {
        if let Some((addr, value)) = parse_listing_line(&line?)? {
            machine.memory_mut().write_raw(addr, value);
            count += 1;
        }
    }
    Ok(count)
}

fn parse_octal_address(text: &str) -> Result<Address, String> {
    u32::from_str_radix(text, 8)
        .map_err(|e| format!("bad octal address {text:?}: {e}"))
        .and_then(|n| Address::try_from(n).map_err(|e| format!("address {text}: {e}")))
}

fn report(machine: &Pdp1, stop: Option<StopCondition>) -> Result<(), Box<dyn Error>> {
    let choice = if atty::is(Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut out = StandardStream::stdout(choice);

    out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    match stop {
        Some(stop) => writeln!(&mut out, "{stop}")?,
        None => writeln!(&mut out, "instruction limit reached")?,
    }
    out.reset()?;

    let regs = machine.cpu().registers();
    writeln!(
        &mut out,
        "PC={:>06o} AC={:>06o} IO={:>06o} MA={:>06o} MB={:>06o} OV={} PF={:>03o} EXT={}",
        regs.pc,
        regs.ac,
        regs.io,
        regs.ma,
        regs.mb,
        u8::from(regs.ov),
        regs.pf,
        u8::from(regs.extend),
    )?;
    Ok(())
}

fn run_simulator() -> Result<(), Box<dyn Error>> {
    let matches = Command::new("PDP-1 Emulator")
        .about("Simulate the historic PDP-1 computer")
        .arg(
            Arg::new("LISTING")
                .help("File containing an octal memory listing (address value pairs)")
                .required(true),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .help("Octal address at which execution starts")
                .default_value("100"),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .help("Stop after this many instructions")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("breakpoint")
                .long("breakpoint")
                .help("Octal address to stop at (may be repeated)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("one-channel")
                .long("one-channel")
                .help("Use the basic one-channel sequence-break system")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("step-muldiv")
                .long("step-muldiv")
                .help("Omit the automatic multiply/divide option (opcodes 26/27 become MUS/DIS)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("clock-channel")
                .long("clock-channel")
                .help("Attach an interval clock raising this sequence-break channel")
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            Arg::new("clock-period-us")
                .long("clock-period-us")
                .help("Interval clock period in simulated microseconds")
                .default_value("10000")
                .value_parser(clap::value_parser!(u64)),
        )
        .get_matches();

    // See
    // https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables
    // for instructions on how to select which trace messages get
    // printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("warn"))?;
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let cpu_config = CpuConfiguration {
        sbs_mode: if matches.get_flag("one-channel") {
            SbsMode::OneChannel
        } else {
            SbsMode::SixteenChannel
        },
        muldiv: if matches.get_flag("step-muldiv") {
            MulDivMode::Step
        } else {
            MulDivMode::Hardware
        },
        ..CpuConfiguration::default()
    };
    let mut machine = Pdp1::new(cpu_config, &MemoryConfiguration::default());

    let listing: &String = matches.get_one("LISTING").expect("LISTING is required");
    let words = load_listing(&mut machine, &PathBuf::from(listing))?;
    event!(Level::INFO, "loaded {} words from {}", words, listing);

    let start: &String = matches.get_one("start").expect("start has a default");
    machine.cpu_mut().registers_mut().pc = parse_octal_address(start)?;

    if let Some(addresses) = matches.get_many::<String>("breakpoint") {
        for text in addresses {
            machine.add_breakpoint(parse_octal_address(text)?);
        }
    }

    if let Some(&channel) = matches.get_one::<u8>("clock-channel") {
        let channel = Channel::try_from(channel).map_err(|e| format!("clock channel: {e}"))?;
        let period = Duration::from_micros(
            *matches
                .get_one::<u64>("clock-period-us")
                .expect("clock-period-us has a default"),
        );
        let ctx = cpu::Context::new(Duration::ZERO, Duration::ZERO);
        machine.cpu_mut().sequence_breaks().enable_channel(channel);
        machine.cpu_mut().sequence_breaks().set_on(true);
        machine.attach_device(
            &ctx,
            DeviceCode::new_truncated(0o32),
            Box::new(IntervalClock::new(channel, period)),
        );
    }

    let mut clock = BasicClock::new();
    let limit = matches.get_one::<u64>("limit").copied();
    let stop = machine.run(&mut clock, limit);
    report(&machine, stop)
}

fn main() {
    match run_simulator() {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
