//! Flowgate CLI Entry Point
//!
//! Drives the engine against a YAML catalog, keeping instances in a JSON
//! state file between invocations.
//!
//! # Usage
//!
//! ```bash
//! # List flow types in the catalog
//! flowgate --catalog demos/onboarding.yaml flows
//!
//! # Start an instance of flow type 1
//! flowgate --catalog demos/onboarding.yaml start 1
//!
//! # Submit field values for instance 1
//! flowgate --catalog demos/onboarding.yaml process 1 1="Ana Diaz" 2=ana@example.com
//!
//! # Inspect or cancel an instance
//! flowgate status 1
//! flowgate cancel 1
//! ```

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use log::{error, info};

use flowgate::config::{EngineConfig, Latency, DEFAULT_CATALOG, STATE_FILE_PATH};
use flowgate::execution::{FlowEngine, Outcome};
use flowgate::store::MemoryStore;
use flowgate::workflow::{load_catalog, Catalog, FieldId, FlowInstance, FlowStatus};
use flowgate::{APP_NAME, VERSION};

/// Subcommand selected on the command line.
#[derive(Debug, PartialEq)]
enum Command {
    Start(i64),
    Process(i64, HashMap<FieldId, String>),
    Status(i64),
    Cancel(i64),
    Flows,
}

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    catalog_path: String,
    state_path: Option<PathBuf>,
    latency: Latency,
    verbose: bool,
    command: Command,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: flowgate [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  start <FLOW_TYPE_ID>                        Start a new instance");
    println!("  process <INSTANCE_ID> [FIELD_ID=VALUE ...]  Submit values and resume");
    println!("  status <INSTANCE_ID>                        Show an instance");
    println!("  cancel <INSTANCE_ID>                        Cancel an instance");
    println!("  flows                                       List flow types");
    println!();
    println!("Options:");
    println!("  --catalog PATH      Catalog YAML file (default: {})", DEFAULT_CATALOG);
    println!("  --state PATH        Instance state file (default: {})", STATE_FILE_PATH.display());
    println!("  --latency           Simulate nominal step durations");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  flowgate --catalog demos/onboarding.yaml start 1");
    println!("  flowgate --catalog demos/onboarding.yaml process 1 1=\"Ana Diaz\" 2=ana@example.com");
}

fn parse_id(value: &str, what: &str) -> Result<i64, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid {}: {}", what, value))
}

/// Parses `FIELD_ID=VALUE` pairs.
fn parse_values(pairs: &[String]) -> Result<HashMap<FieldId, String>, String> {
    let mut values = HashMap::new();
    for pair in pairs {
        let (id, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Expected FIELD_ID=VALUE, got: {}", pair))?;
        let id = parse_id(id.trim(), "field id")?;
        if values.insert(id, value.to_string()).is_some() {
            return Err(format!("Field {} given more than once", id));
        }
    }
    Ok(values)
}

fn parse_command(positional: &[String]) -> Result<Command, String> {
    let (name, rest) = positional
        .split_first()
        .ok_or_else(|| "Missing command".to_string())?;

    let single_id = |what: &str| -> Result<i64, String> {
        match rest {
            [id] => parse_id(id, what),
            [] => Err(format!("'{}' requires {}", name, what)),
            _ => Err(format!("Unexpected argument: {}", rest[1])),
        }
    };

    match name.as_str() {
        "start" => Ok(Command::Start(single_id("a flow type id")?)),
        "status" => Ok(Command::Status(single_id("an instance id")?)),
        "cancel" => Ok(Command::Cancel(single_id("an instance id")?)),
        "process" => {
            let (id, pairs) = rest
                .split_first()
                .ok_or_else(|| "'process' requires an instance id".to_string())?;
            Ok(Command::Process(
                parse_id(id, "an instance id")?,
                parse_values(pairs)?,
            ))
        }
        "flows" if rest.is_empty() => Ok(Command::Flows),
        "flows" => Err(format!("Unexpected argument: {}", rest[0])),
        other => Err(format!("Unknown command: {}", other)),
    }
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut catalog_path = DEFAULT_CATALOG.to_string();
    let mut state_path = None;
    let mut latency = Latency::None;
    let mut verbose = false;
    let mut positional = Vec::new();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        // Everything after the command name belongs to the command
        if !positional.is_empty() {
            positional.push(arg.clone());
            i += 1;
            continue;
        }

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--latency" => {
                latency = Latency::Simulated;
            }
            "--verbose" | "-v" => {
                verbose = true;
            }
            "--catalog" => {
                i += 1;
                if i >= args.len() {
                    return Err("--catalog requires a path argument".to_string());
                }
                catalog_path = args[i].clone();
            }
            "--state" => {
                i += 1;
                if i >= args.len() {
                    return Err("--state requires a path argument".to_string());
                }
                state_path = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => positional.push(arg.clone()),
        }
        i += 1;
    }

    Ok(Config {
        catalog_path,
        state_path,
        latency,
        verbose,
        command: parse_command(&positional)?,
    })
}

fn print_flows(catalog: &Catalog) {
    println!("{}", "Flow types".cyan().bold());
    for flow_type in &catalog.flow_types {
        let order: Vec<String> = flow_type.sequences.iter().map(|id| id.to_string()).collect();
        println!(
            "  {:>3}  {}  {}",
            flow_type.id,
            flow_type.name,
            format!("sequences [{}]", order.join(", ")).dimmed()
        );
    }
}

fn print_outcome(outcome: &Outcome) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(outcome)?);

    let label = if !outcome.success {
        "FAILED".red().bold()
    } else if outcome.complete {
        "COMPLETE".green().bold()
    } else if outcome.required_fields.is_empty() {
        "OK".green()
    } else {
        "WAITING".yellow().bold()
    };
    eprintln!("{} instance {}: {}", label, outcome.instance_id, outcome.message);
    Ok(())
}

fn print_instance(instance: &FlowInstance) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(instance)?);

    let status = instance.status.to_string();
    let status = match instance.status {
        FlowStatus::Completed => status.green().bold(),
        FlowStatus::Failed | FlowStatus::Cancelled => status.red().bold(),
        FlowStatus::WaitingForData => status.yellow().bold(),
        FlowStatus::Started | FlowStatus::InProgress => status.cyan(),
    };
    eprintln!(
        "instance {}: {} at sequence {}",
        instance.id, status, instance.current_sequence
    );
    Ok(())
}

/// Main application entry point.
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    info!("{} v{}", APP_NAME, VERSION);

    let catalog = load_catalog(&config.catalog_path).map_err(|e| {
        error!("Failed to load catalog: {}", e);
        format!("Could not load catalog from '{}': {}", config.catalog_path, e)
    })?;

    if config.command == Command::Flows {
        print_flows(&catalog);
        return Ok(());
    }

    let engine_config = EngineConfig::default()
        .with_latency(config.latency)
        .with_state_path(
            config
                .state_path
                .clone()
                .unwrap_or_else(|| STATE_FILE_PATH.clone()),
        );
    info!("State file: {}", engine_config.state_path.display());

    let store = Arc::new(MemoryStore::load_snapshot(
        catalog,
        &engine_config.state_path,
    )?);
    let engine = FlowEngine::from_config(store.clone(), &engine_config);

    let outcome = match config.command {
        Command::Status(id) => {
            let instance = engine.status(id).await?;
            return print_instance(&instance);
        }
        Command::Start(flow_type_id) => engine.start(flow_type_id).await,
        Command::Process(id, values) => engine.process(id, values).await,
        Command::Cancel(id) => engine.cancel(id).await,
        Command::Flows => return Ok(()),
    };

    store.save_snapshot(&engine_config.state_path)?;
    print_outcome(&outcome)?;

    if outcome.success {
        Ok(())
    } else {
        Err(outcome.message.into())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
