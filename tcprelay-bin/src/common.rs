use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{arg, value_parser, ArgMatches, Command};
use log::info;
use tcprelay::config::{RelayConfig, SessionOptions};
use tcprelay::log::LogSink;
use tcprelay::socket::RelayListener;

pub fn with_common_args(command: Command) -> Command {
    command
        .arg(
            arg!(--tick <SECS> "Seconds between two throughput lines of a connection")
                .value_parser(value_parser!(u64).range(1..))
                .default_value("5")
                .required(false),
        )
        .arg(
            arg!(--"connect-timeout" <SECS> "Give up connecting to the remote address after this many seconds")
                .value_parser(value_parser!(u64).range(1..))
                .required(false),
        )
        .arg(
            arg!(--"idle-timeout" <SECS> "Drop a connection when neither direction moves a byte for this many seconds")
                .value_parser(value_parser!(u64).range(1..))
                .required(false),
        )
        .arg(
            arg!(--"drain-timeout" <SECS> "After the client is done, close the connection once the remote stays silent for this many seconds")
                .value_parser(value_parser!(u64).range(1..))
                .default_value("5")
                .required(false),
        )
        .arg(arg!(-v --verbose "Turn on verbose logging").required(false))
}

pub fn session_options(args: &ArgMatches) -> SessionOptions {
    let secs = |id: &str| args.get_one::<u64>(id).copied().map(Duration::from_secs);
    let defaults = SessionOptions::default();
    SessionOptions {
        tick_period: secs("tick").unwrap_or(defaults.tick_period),
        connect_timeout: secs("connect-timeout"),
        idle_timeout: secs("idle-timeout"),
        drain_timeout: secs("drain-timeout").unwrap_or(defaults.drain_timeout),
    }
}

pub fn init_log(args: &ArgMatches) -> Result<()> {
    let is_verbose = args.get_flag("verbose");
    let colors = fern::colors::ColoredLevelConfig::new();
    let level = if is_verbose || cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S%.3f]"),
                record.target(),
                colors.color(record.level()),
                message
            ))
        })
        .level(level);
    if !is_verbose {
        dispatch = dispatch.filter(|meta| meta.target().starts_with("tcprelay"));
    }
    dispatch
        .chain(std::io::stdout())
        .apply()
        .context("Cannot set up logger")
}

pub fn run(config: RelayConfig) -> Result<()> {
    config.validate().context("Invalid arguments")?;

    let runtime = tcprelay::tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Error initializing Tokio runtime")?;
    let relay = runtime
        .block_on(RelayListener::bind(&config, Arc::new(LogSink)))
        .with_context(|| format!("Failed to start relay on {}", config.listen))?;
    let stat = relay.stat();
    let server = runtime.spawn(relay.run());

    let (ctrlc_tx, ctrlc_rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        use std::sync::atomic::{AtomicBool, Ordering};
        static CTRLC_FIRED: AtomicBool = AtomicBool::new(false);
        if CTRLC_FIRED.swap(true, Ordering::Relaxed) {
            std::process::exit(2);
        }
        let _ = ctrlc_tx.send(());
    })
    .context("Error setting Ctrl-C handler")?;

    ctrlc_rx
        .recv()
        .context("Error waiting for Ctrl-C channel signal")?;
    info!("Shutting down relay: {}", stat);

    server.abort();
    drop(runtime);
    info!("Runtime destroyed. Bye!");

    Ok(())
}
