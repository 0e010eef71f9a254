use anyhow::Result;
use clap::Parser;
use homesentry::app::{Collaborators, SentryNode};
use homesentry::channel::MqttLink;
use homesentry::config::SentryConfig;
use homesentry::hal::{LoggingDriver, SimulatedClimate};
use homesentry::scheduler::Scheduler;
use homesentry::SentryError;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "homesentry")]
#[command(about = "Raspberry Pi home-monitoring node with motion alerting and MQTT control")]
#[command(version)]
#[command(long_about = "A home-monitoring node that watches a motion sensor, drives alarm \
actuators, captures alert photos, and reports to an MQTT broker. Operating mode and \
actuators are remotely controllable over subscribed feeds; every event is appended to a \
daily journal file.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "homesentry.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the node")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    // Load configuration before logging: the file layer needs the log path.
    let config = match SentryConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    let _log_guard = init_logging(&args, &config)?;

    info!("Starting homesentry v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {e}");
                std::process::exit(1);
            }
        }
    }

    let token = CancellationToken::new();

    // Real GPIO, camera, and DHT drivers are wired here on actual hardware.
    // On a bare host the node runs with logging actuators, a simulated
    // climate sensor, and no camera.
    let collaborators = Collaborators {
        led_light: LoggingDriver::new("led_light"),
        fan_relay: LoggingDriver::new("fan_relay"),
        buzzer: LoggingDriver::new("buzzer"),
        camera: None,
        climate: Some(Arc::new(SimulatedClimate::new())),
        shipper: None,
    };

    // The publish side is needed to build the node; the event loop needs the
    // node's router. MqttLink splits the two phases.
    let link = MqttLink::new(&config.mqtt);
    let node = SentryNode::build(config, collaborators, link.channel(), token.clone()).map_err(
        |e| {
            error!("Failed to assemble node: {e}");
            e
        },
    )?;
    let mqtt_task = link.start(node.command_router(), token.clone());

    let mut scheduler = Scheduler::new(token.clone());
    node.start_jobs(&mut scheduler)?;

    info!("homesentry is running; press CTRL+C to exit");
    node.run_until_shutdown().await?;

    scheduler.join().await;
    let _ = mqtt_task.await;
    Ok(())
}

fn init_logging(
    args: &Args,
    config: &SentryConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("homesentry={log_level}")));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") => fmt::layer().pretty().with_target(true).boxed(),
        None => fmt::layer().with_target(args.debug).boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{format}', using default");
            fmt::layer().with_target(args.debug).boxed()
        }
    };

    // File layer mirroring everything to the configured application log.
    let log_path = Path::new(&config.logging.log_file);
    let log_dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    let log_name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "app.log".to_string());
    std::fs::create_dir_all(log_dir)?;
    let appender = tracing_appender::rolling::never(log_dir, log_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print the built-in default configuration in TOML format.
fn print_default_config() -> Result<()> {
    let rendered =
        toml::to_string_pretty(&SentryConfig::default()).map_err(SentryError::Serialization)?;
    println!("# Homesentry configuration file");
    println!("# Defaults shown; every key is optional.");
    println!();
    println!("{rendered}");
    Ok(())
}
