mod demo;
mod logging;

use std::env;

use anyhow::{bail, Context, Result};
use tracing::{error, info};

use dapbridge_adapter::Adapter;
use dapbridge_config::{apply_env_overrides, load_config, Config, DefaultPaths, PlatformPaths};

const USAGE: &str = "usage: dapbridge [--demo] [--port N] [--backend NAME]

  --demo          stop on the demo program's first line
  --port N        DAP listener port (default from config, 9000)
  --backend NAME  stepping backend: console or script
  -h, --help      show this help";

/// Parsed command line.
#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    stop_at_entry: bool,
    port: Option<u16>,
    backend: Option<String>,
    help: bool,
}

fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--demo" => parsed.stop_at_entry = true,
            "--port" => {
                let value = args.next().context("--port needs a value")?;
                let port = value
                    .parse()
                    .with_context(|| format!("invalid port: {value}"))?;
                parsed.port = Some(port);
            }
            "--backend" => {
                parsed.backend = Some(args.next().context("--backend needs a value")?);
            }
            "-h" | "--help" => parsed.help = true,
            other => bail!("unknown argument: {other}\n\n{USAGE}"),
        }
    }
    Ok(parsed)
}

/// Config file, then environment, then command line.
fn resolve_config(paths: &DefaultPaths, args: &Args) -> Result<Config> {
    let project_dir = env::current_dir().ok();
    let config = load_config(&paths.config_dir(), project_dir.as_deref())
        .context("failed to load configuration")?;
    let mut config = apply_env_overrides(config, |key| env::var(key).ok())
        .context("invalid DAPBRIDGE_* environment override")?;
    if let Some(port) = args.port {
        config.adapter.port = port;
    }
    if let Some(backend) = &args.backend {
        config.adapter.backend = backend.clone();
    }
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let paths = DefaultPaths::new().context("failed to detect platform paths")?;
    let config = resolve_config(&paths, &args)?;

    let log_path = logging::log_file_path(&config.log, &paths);
    let directive = logging::filter_directive(config.log.level, env::var("RUST_LOG").ok().as_deref());
    logging::init(&log_path, &directive)?;
    info!(version = env!("CARGO_PKG_VERSION"), "dapbridge starting");

    let adapter = Adapter::new(&config.adapter).context("failed to create adapter")?;
    let addr = adapter.start().context("failed to start adapter")?;
    eprintln!("dapbridge: DAP server listening on {addr}");
    if let Some(trigger) = adapter.trigger_addr() {
        eprintln!("dapbridge: send START to {trigger} to stop the program");
    }

    let stop_at_entry = args.stop_at_entry;
    adapter
        .launch("main", move |probe| demo::run(probe, stop_at_entry))
        .context("failed to launch demo program")?;
    adapter.wait();

    if let Err(e) = adapter.shutdown() {
        error!(error = %e, "shutdown failed");
        return Err(e).context("failed to shut down adapter");
    }
    info!("dapbridge exiting");
    Ok(())
}

fn main() {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("dapbridge: {e:#}");
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return;
    }
    if let Err(e) = run(args) {
        eprintln!("dapbridge: {e:#}");
        std::process::exit(1);
    }
}
