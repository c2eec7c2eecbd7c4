use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use pinctl::{
    AppConfig, AppError, Command, CommandDispatcher, EventSink, PinRegistry, SharedBackend,
    StatusEvent, shutdown,
};

#[cfg(feature = "hardware-gpio")]
use pinctl::LibgpiodBackend;
#[cfg(not(feature = "hardware-gpio"))]
use pinctl::MockGpioBackend;

#[derive(Parser)]
#[command(name = "pinctl")]
#[command(about = "Exercise and observe configured GPIO inputs and outputs", long_about = None)]
#[command(version)]
struct Cli {
    /// Pin configuration file (JSON)
    #[arg(long, env = "PINCTL_CONFIG", default_value = "config.json")]
    config: PathBuf,
    /// List configured pins and exit
    #[arg(long)]
    list: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured pins with their resolved settings
    List {
        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cycle all OUTPUT pins on/off until interrupted
    Cycle {
        /// Delay between toggles (seconds)
        #[arg(long)]
        delay: Option<f64>,
    },
    /// Toggle a single OUTPUT pin a fixed number of times
    Test {
        /// Pin name
        pin: String,
        /// Number of on/off cycles
        #[arg(long)]
        cycles: Option<u32>,
        /// Delay between toggles (seconds)
        #[arg(long)]
        delay: Option<f64>,
    },
    /// Watch a single INPUT pin for edges
    Watch {
        /// Pin name
        pin: String,
        /// Watch time (seconds)
        #[arg(long)]
        duration: Option<f64>,
        /// Debounce window (milliseconds)
        #[arg(long)]
        debounce: Option<u64>,
    },
    /// Set an OUTPUT pin once: on|off|high|low|1|0|true|false
    Set { pin: String, state: String },
}

struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: StatusEvent) {
        println!("{event}");
    }
}

fn seconds(value: Option<f64>) -> Result<Option<Duration>, AppError> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| AppError::InvalidValue(format!("invalid duration {secs}: {e}")))
        })
        .transpose()
}

fn to_command(command: Commands) -> Result<Command, AppError> {
    Ok(match command {
        Commands::List { .. } => Command::List,
        Commands::Cycle { delay } => Command::Cycle {
            delay: seconds(delay)?,
        },
        Commands::Test { pin, cycles, delay } => Command::Test {
            pin,
            cycles,
            delay: seconds(delay)?,
        },
        Commands::Watch {
            pin,
            duration,
            debounce,
        } => Command::Watch {
            pin,
            duration: seconds(duration)?,
            debounce: debounce.map(Duration::from_millis),
        },
        Commands::Set { pin, state } => Command::Set { pin, state },
    })
}

fn make_backend(config: &AppConfig) -> Result<SharedBackend, AppError> {
    #[cfg(feature = "hardware-gpio")]
    {
        Ok(Arc::new(LibgpiodBackend::new(config.chip.clone())?))
    }
    #[cfg(not(feature = "hardware-gpio"))]
    {
        log::warn!(
            "built without `hardware-gpio`, {} is simulated in memory",
            config.chip
        );
        Ok(Arc::new(MockGpioBackend::default()))
    }
}

fn print_hints() {
    println!("\n[HINT] Examples:");
    println!("  pinctl cycle --delay 0.5");
    println!("  pinctl test ESPRESSO_PUMP_RELAY --cycles 5");
    println!("  pinctl watch LOW_FILL_SENSOR --duration 30");
    println!("  pinctl set ESPRESSO_PUMP_RELAY on");
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match AppConfig::load_from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[ERROR] {e}");
            return ExitCode::from(2);
        }
    };
    let registry = match PinRegistry::from_config(&config) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("[ERROR] {e}");
            return ExitCode::from(2);
        }
    };
    let backend = match make_backend(&config) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("[ERROR] {e}");
            return ExitCode::from(2);
        }
    };
    let dispatcher = CommandDispatcher::new(registry, backend, config.defaults.clone());

    let command = match cli.command {
        _ if cli.list => {
            dispatcher.list(&ConsoleSink);
            return ExitCode::SUCCESS;
        }
        None => {
            dispatcher.list(&ConsoleSink);
            print_hints();
            return ExitCode::SUCCESS;
        }
        Some(Commands::List { json: true }) => {
            let descriptors: Vec<_> = dispatcher.registry().all().map(|(_, d)| d).collect();
            return match serde_json::to_string_pretty(&descriptors) {
                Ok(json) => {
                    println!("{json}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("[ERROR] {e}");
                    ExitCode::FAILURE
                }
            };
        }
        Some(command) => match to_command(command) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("[ERROR] {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            trigger.trigger();
        }
    });

    match dispatcher.execute(command, shutdown, &ConsoleSink).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(AppError::EmptyDeviceSet) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("[ERROR] {e}");
            ExitCode::FAILURE
        }
    }
}
