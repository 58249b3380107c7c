use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use rovercam::camera::{CameraBackend, SimulatedBackend, SimulatedScene};
use rovercam::output::{BroadcastSink, FanoutSink, JsonLinesSink, OutputSink};
use rovercam::{RovercamConfig, RovercamOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "rovercam")]
#[command(about = "Obstacle sensing from depth and color cameras for a mobile robot")]
#[command(version)]
#[command(long_about = "Polls up to two depth cameras and two webcams at a fixed rate, \
republishes their color frames as JPEG and turns filtered depth frames into left/right \
obstacle flags plus an average proximity reading.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "rovercam.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without opening cameras")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - open cameras, then release them and exit
    #[arg(long, help = "Initialize camera sources but don't start the scheduler")]
    dry_run: bool,

    /// Use the simulated camera backend
    #[arg(long, help = "Run against simulated cameras with a synthetic obstacle scene")]
    simulate: bool,

    /// Write obstacle signals to stdout as JSON lines
    #[arg(long, help = "Emit obstacle and proximity signals on stdout as JSON lines")]
    signal_log: bool,

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

    init_logging(&args)?;

    info!("Starting rovercam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match RovercamConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let mut backend = create_backend(&args, &config)?;
    let sink = create_sink(&args, &config);

    let mut orchestrator = RovercamOrchestrator::new(config, sink);

    orchestrator
        .initialize(backend.as_mut())
        .await
        .map_err(|e| {
            error!("Failed to initialize cameras: {}", e);
            e
        })?;

    if args.dry_run {
        info!("Dry run mode - cameras initialized but scheduler not started");
        orchestrator.shutdown().await?;
        println!("✓ Dry run completed successfully - camera sources initialized");
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start frame scheduler: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Rovercam exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn create_backend(args: &Args, config: &RovercamConfig) -> Result<Box<dyn CameraBackend>> {
    if args.simulate {
        info!("Using simulated cameras");
        return Ok(Box::new(SimulatedBackend::from_config(
            &config.cameras,
            SimulatedScene::with_obstacle(),
        )));
    }

    hardware_backend()
}

#[cfg(all(feature = "realsense", feature = "camera", target_os = "linux"))]
fn hardware_backend() -> Result<Box<dyn CameraBackend>> {
    use rovercam::camera::{CompositeBackend, GstreamerBackend, RealsenseBackend};

    info!("Using RealSense depth cameras and GStreamer webcams");
    Ok(Box::new(CompositeBackend::new(
        Box::new(RealsenseBackend::new()?),
        Box::new(GstreamerBackend::new()?),
    )))
}

#[cfg(all(feature = "realsense", not(feature = "camera"), target_os = "linux"))]
fn hardware_backend() -> Result<Box<dyn CameraBackend>> {
    warn!("Built without the `camera` feature; webcams stay inactive");
    Ok(Box::new(rovercam::camera::RealsenseBackend::new()?))
}

#[cfg(all(feature = "camera", not(feature = "realsense"), target_os = "linux"))]
fn hardware_backend() -> Result<Box<dyn CameraBackend>> {
    warn!("Built without the `realsense` feature; depth cameras stay inactive");
    Ok(Box::new(rovercam::camera::GstreamerBackend::new()?))
}

#[cfg(not(all(target_os = "linux", any(feature = "camera", feature = "realsense"))))]
fn hardware_backend() -> Result<Box<dyn CameraBackend>> {
    anyhow::bail!("Built without camera support; enable `realsense` and `camera` or rerun with --simulate")
}

fn create_sink(args: &Args, config: &RovercamConfig) -> Arc<dyn OutputSink> {
    let broadcast: Arc<dyn OutputSink> =
        Arc::new(BroadcastSink::new(config.output.signal_capacity));

    if args.signal_log {
        if args.log_format.as_deref() != Some("json") {
            warn!("Signal log shares stdout with human readable logs");
        }
        let signal_log: Arc<dyn OutputSink> = Arc::new(JsonLinesSink::new(std::io::stdout()));
        Arc::new(FanoutSink::new(vec![broadcast, signal_log]))
    } else {
        broadcast
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rovercam={}", log_level)));

    // Logs go to stderr so stdout stays free for the signal log
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Rovercam configuration file");
    println!("# Every value below is the built-in default; ROVERCAM_ environment");
    println!("# variables (e.g. ROVERCAM_SCHEDULER__TICK_MS=50) override the file.");
    println!();
    println!("{}", toml::to_string_pretty(&RovercamConfig::default())?);
    Ok(())
}
