use anyhow::Context;
use clap::{Parser, Subcommand};
use generator::profile::GeneratorConfig;
use std::path::PathBuf;
use status::StatusBridge;
use transport::{LineFrameSource, SpoolDirectory};
use workflow::config::{SinkOverrides, WorkflowConfig};
use workflow::runner::Runner;

mod generator;
mod sink;
mod status;
mod transport;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Sensor telemetry uplink: serial frames to a spreadsheet")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Spreadsheet to append rows to
    #[arg(long, global = true)]
    spreadsheet_id: Option<String>,
    /// OAuth bearer token for the sheets API
    #[arg(long, global = true)]
    access_token: Option<String>,
    /// Target range, e.g. Data!A2:G
    #[arg(long, global = true)]
    range: Option<String>,
    #[arg(long, global = true)]
    endpoint: Option<String>,
    /// Log rows instead of sending them
    #[arg(long, global = true, default_value_t = false)]
    dry_run: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read frames from a serial port and append every change immediately
    ///
    /// The port is read as a plain device file. Set the line speed first,
    /// e.g. `stty -F /dev/ttyUSB0 9600 raw -echo`.
    Stream {
        /// Serial device path, or - for stdin
        #[arg(long)]
        serial: PathBuf,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        #[arg(long)]
        status_port: Option<u16>,
    },
    /// Upload every spooled frame in a single append
    Upload {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Capture frames from a serial port into a spool directory
    ///
    /// Expects the port at 9600 baud, set with
    /// `stty -F /dev/ttyUSB0 9600 raw -echo`.
    Spool {
        #[arg(long)]
        serial: PathBuf,
        #[arg(long)]
        dir: PathBuf,
    },
    /// Write synthetic frames into a spool directory
    Simulate {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value_t = 32)]
        count: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = args.config.as_ref() {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::default()
    };
    workflow_config.apply_overrides(SinkOverrides {
        spreadsheet_id: args.spreadsheet_id,
        access_token: args.access_token,
        range: args.range,
        endpoint: args.endpoint,
        dry_run: args.dry_run,
    });

    match args.command {
        Command::Stream {
            serial,
            cache_dir,
            status_port,
        } => {
            if cache_dir.is_some() {
                workflow_config.cache_dir = cache_dir;
            }
            if status_port.is_some() {
                workflow_config.status_port = status_port;
            }
            let runner = Runner::new(workflow_config.clone());
            let _status = match workflow_config.status_port {
                Some(port) => Some(StatusBridge::spawn(port, runner.metrics())?),
                None => None,
            };
            let sink = sink::build(&workflow_config.sink)?;
            let mut source = LineFrameSource::open(&serial)?;
            log::info!("reading frames from {}", source.name());
            runner.stream(&mut source, sink)?;
        }
        Command::Upload { dir, cache_dir } => {
            if cache_dir.is_some() {
                workflow_config.cache_dir = cache_dir;
            }
            let runner = Runner::new(workflow_config.clone());
            let sink = sink::build(&workflow_config.sink)?;
            let mut spool = SpoolDirectory::open(&dir)?;
            let report = runner.upload(&mut spool, sink)?;
            println!(
                "Upload -> pending {}, kept {}, dropped {}, rejected {}, rows {}, cells {}, removed {}",
                report.pending,
                report.kept,
                report.dropped,
                report.rejected,
                report.appended.updated_rows,
                report.appended.updated_cells,
                report.removed
            );
        }
        Command::Spool { serial, dir } => {
            let runner = Runner::new(workflow_config);
            let spool = SpoolDirectory::open(&dir)?;
            let mut source = LineFrameSource::open(&serial)?;
            let written = runner
                .spool(&mut source, &spool)
                .with_context(|| format!("spooling frames from {}", serial.display()))?;
            println!("Spool -> {} frames written to {}", written, dir.display());
        }
        Command::Simulate { dir, count, seed } => {
            let runner = Runner::new(workflow_config);
            let spool = SpoolDirectory::open(&dir)?;
            let generator = GeneratorConfig {
                count,
                seed,
                ..Default::default()
            };
            let written = runner.simulate(&spool, &generator)?;
            println!("Simulate -> {} frames written to {}", written, dir.display());
        }
    }

    Ok(())
}
