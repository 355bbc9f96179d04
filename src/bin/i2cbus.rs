use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use i2cbus::fault_injection::NackInjector;
use i2cbus::{Address, BusError, BusId, BusSystem, SystemConfig, BROADCAST_ADDRESS};
use tracing::Level;

// i2cdetect's default probe range
const FIRST_PROBE_ADDRESS: Address = 0x03;
const LAST_PROBE_ADDRESS: Address = 0x77;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("i2cbus")
        .version("0.1.0")
        .author("Space Systems Engineering Team")
        .about("I2C bus transaction engine - probe, fault-inject and snapshot simulated buses")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON system description (defaults to a built-in two-bus sample)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log every bus event")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("detect")
                .about("Probe every address on each bus, like i2cdetect")
                .arg(bus_arg().required(false)),
        )
        .subcommand(
            SubCommand::with_name("inject")
                .about("Arm a one-shot NACK on a bus and run one write transaction into it")
                .arg(bus_arg().required(true))
                .arg(address_arg().required(true)),
        )
        .subcommand(
            SubCommand::with_name("snapshot")
                .about("Open a transaction, snapshot the system and restore it into a fresh copy")
                .arg(bus_arg().required(true))
                .arg(address_arg().required(false).help(
                    "Target address (omit for a broadcast transaction)",
                )),
        )
        .get_matches();

    let level = if matches.is_present("verbose") {
        Level::TRACE
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = match matches.value_of("config") {
        Some(path) => SystemConfig::from_file(path)?,
        None => SystemConfig::sample(),
    };
    let format = matches.value_of("format").unwrap_or("table");

    match matches.subcommand() {
        ("detect", Some(sub)) => handle_detect(&config, sub, format),
        ("inject", Some(sub)) => handle_inject(&config, sub, format),
        ("snapshot", Some(sub)) => handle_snapshot(&config, sub, format),
        _ => {
            println!("{}", "i2cbus - I2C bus transaction engine".bright_blue().bold());
            println!();
            println!("{}", "Quick start:".bright_green());
            println!("  {} Probe every configured bus", "i2cbus detect".bright_cyan());
            println!("  {} NACK the next start on bus 0", "i2cbus inject 0 0x50".bright_cyan());
            println!("  {} Snapshot an open broadcast", "i2cbus snapshot 0".bright_cyan());
            Ok(())
        }
    }
}

fn bus_arg() -> Arg<'static, 'static> {
    Arg::with_name("bus")
        .help("Bus serial")
        .validator(|v| {
            v.parse::<u32>()
                .map(|_| ())
                .map_err(|_| "Bus must be a serial number".to_owned())
        })
}

fn address_arg() -> Arg<'static, 'static> {
    Arg::with_name("address")
        .help("7-bit peripheral address, decimal or 0x-prefixed hex")
        .validator(|v| parse_address(&v).map(|_| ()))
}

fn parse_address(text: &str) -> Result<Address, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse::<u8>(),
    };
    parsed.map_err(|_| format!("'{}' is not an address", text))
}

fn bus_from(matches: &ArgMatches<'_>) -> Option<BusId> {
    matches
        .value_of("bus")
        .and_then(|v| v.parse::<u32>().ok())
        .map(BusId)
}

fn address_from(matches: &ArgMatches<'_>) -> Option<Address> {
    matches.value_of("address").and_then(|v| parse_address(v).ok())
}

fn handle_detect(
    config: &SystemConfig,
    matches: &ArgMatches<'_>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut system = BusSystem::from_config(config)?;
    let only = bus_from(matches);
    let buses: Vec<BusId> = system
        .buses()
        .map(|b| b.id())
        .filter(|id| only.map_or(true, |o| o == *id))
        .collect();

    let mut report = serde_json::Map::new();
    for bus in buses {
        let mut found = Vec::new();
        for address in FIRST_PROBE_ADDRESS..=LAST_PROBE_ADDRESS {
            // quick-write probe
            if system.start_send(bus, address).is_ok() {
                found.push(address);
                system.end(bus)?;
            }
        }

        match format {
            "json" => {
                report.insert(bus.to_string(), serde_json::json!(found));
            }
            _ => print_detect_table(&system, bus, &found),
        }
    }

    if format == "json" {
        println!("{}", serde_json::Value::Object(report));
    }
    Ok(())
}

fn print_detect_table(system: &BusSystem<NackInjector>, bus: BusId, found: &[Address]) {
    let name = system.bus(bus).map_or("?", |b| b.name());
    println!("\n{} {}", bus.to_string().bright_blue().bold(), name.bright_white());
    println!("     0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f");
    for row in (0u8..0x80).step_by(16) {
        let mut line = format!("{:02x}: ", row);
        for address in row..row + 16 {
            let cell = if !(FIRST_PROBE_ADDRESS..=LAST_PROBE_ADDRESS).contains(&address) {
                "   ".normal()
            } else if found.contains(&address) {
                format!("{:02x} ", address).bright_green()
            } else {
                "-- ".dimmed()
            };
            line.push_str(&cell.to_string());
        }
        println!("{}", line);
    }
}

fn handle_inject(
    config: &SystemConfig,
    matches: &ArgMatches<'_>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut system = BusSystem::from_config(config)?;
    let bus = bus_from(matches).ok_or("missing bus")?;
    let address = address_from(matches).ok_or("missing address")?;

    system.observer_mut().arm(bus);
    let first = system.start_send(bus, address);
    system.end(bus)?;
    let second = system.start_send(bus, address);
    system.end(bus)?;

    let traffic = system.observer().traffic(bus);
    match format {
        "json" => {
            let report = serde_json::json!({
                "bus": bus.0,
                "address": address,
                "first_start": describe(&first),
                "second_start": describe(&second),
                "traffic": traffic,
            });
            println!("{}", report);
        }
        _ => {
            println!("{} {}", "Fault injection on".bright_blue().bold(), bus.to_string().bright_white());
            print_start_result("First start", &first);
            print_start_result("Second start", &second);
            println!(
                "Transactions: {}  Injected NACKs: {}",
                traffic.transactions_started.to_string().bright_cyan(),
                traffic.injected_nacks.to_string().bright_yellow()
            );
        }
    }
    Ok(())
}

fn handle_snapshot(
    config: &SystemConfig,
    matches: &ArgMatches<'_>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut system = BusSystem::from_config(config)?;
    let bus = bus_from(matches).ok_or("missing bus")?;
    let address = address_from(matches).unwrap_or(BROADCAST_ADDRESS);

    system.start_send(bus, address)?;
    let before = system.matched_addresses(bus);
    let snapshot = system.snapshot();
    let json = snapshot.to_json()?;

    let mut restored = BusSystem::from_config(config)?;
    restored.restore(&i2cbus::snapshot::SystemSnapshot::from_json(&json)?)?;
    let after = restored.matched_addresses(bus);

    match format {
        "json" => println!("{}", json),
        _ => {
            println!("{}", "Snapshot".bright_blue().bold());
            println!("{}", json.bright_white());
            println!("Members before: {}", format_addresses(&before).bright_cyan());
            println!("Members after:  {}", format_addresses(&after).bright_cyan());
        }
    }

    system.end(bus)?;
    restored.end(bus)?;
    Ok(())
}

fn describe(result: &Result<(), BusError>) -> String {
    match result {
        Ok(()) => "ack".to_owned(),
        Err(e) => e.to_string(),
    }
}

fn print_start_result(label: &str, result: &Result<(), BusError>) {
    match result {
        Ok(()) => println!("{} {}: {}", "✅".green(), label.bright_white(), "ACK".bright_green()),
        Err(e) => println!("{} {}: {}", "❌".red(), label.bright_white(), e.to_string().bright_red()),
    }
}

fn format_addresses(addresses: &[Address]) -> String {
    if addresses.is_empty() {
        return "(none)".to_owned();
    }
    addresses
        .iter()
        .map(|a| format!("{:#04x}", a))
        .collect::<Vec<_>>()
        .join(" ")
}
