use std::{
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use bft_chaos::{
    sim::{sim_cluster, SimConfig, SimMessage},
    ClusterConfig, DirectTransport, FlowFileRecorder, FuzzRunner, PartitionTransport, Recorder,
    RunReport, RunnerConfig, TransportConfig,
};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Randomly stop and start nodes
    Churn,
    /// Repeated minority/majority partitions with node drops
    Network,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Run the BFT fuzz runner against a simulated cluster", long_about = None)]
struct Cli {
    /// Count of initially started nodes
    #[arg(long, default_value_t = 5)]
    nodes: usize,

    /// How long to inject faults, longer than 1 minute (e.g. 2m, 5m, 1h)
    #[arg(long, default_value = "25m", value_parser = parse_run_duration)]
    duration: Duration,

    /// Seed for every random decision [default: derived from the clock]
    #[arg(long)]
    seed: Option<u64>,

    /// Fault scheduling strategy
    #[arg(long, value_enum, default_value_t = Mode::Churn)]
    mode: Mode,

    /// Maximum random delay applied to each message
    #[arg(long, default_value = "50ms", value_parser = humantime::parse_duration)]
    jitter: Duration,

    /// Replay file [default: fuzz-<seed>.flow]
    #[arg(long)]
    flow_file: Option<PathBuf>,
}

fn parse_run_duration(s: &str) -> std::result::Result<Duration, String> {
    let duration = humantime::parse_duration(s).map_err(|e| e.to_string())?;
    if duration <= Duration::from_secs(60) {
        return Err(format!("duration must be longer than 1 minute, got {}", s));
    }
    Ok(duration)
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let seed = cli.seed.unwrap_or_else(clock_seed);
    let flow_file = cli
        .flow_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("fuzz-{}.flow", seed)));

    println!("Starting BFT fuzz runner...");
    println!("Node count: {}", cli.nodes);
    println!("Duration: {}", humantime::format_duration(cli.duration));
    println!("Mode: {:?}", cli.mode);
    println!("Seed: {}", seed);
    println!("Flow file: {}", flow_file.display());

    let recorder = Arc::new(
        FlowFileRecorder::create(&flow_file)
            .with_context(|| format!("failed to create flow file {}", flow_file.display()))?,
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let outcome = runtime.block_on(fuzz(&cli, seed, recorder.clone()));
    let mut code = ExitCode::SUCCESS;
    match &outcome {
        Ok(report) => println!("PASS: {}", report),
        Err(err) if err.is_assertion() => println!("FAIL: {}", err),
        Err(err) => {
            eprintln!("error while running fuzz runner: {}", err);
            code = ExitCode::from(1);
        }
    }

    if let Err(err) = Recorder::<SimMessage>::close(&*recorder) {
        eprintln!("error while closing {}: {}", flow_file.display(), err);
        return Ok(ExitCode::from(1));
    }
    Ok(code)
}

async fn fuzz(
    cli: &Cli,
    seed: u64,
    recorder: Arc<FlowFileRecorder>,
) -> bft_chaos::Result<RunReport> {
    let transport = Arc::new(
        PartitionTransport::new(
            DirectTransport::new(),
            TransportConfig::new()
                .with_max_jitter(cli.jitter)
                .with_seed(seed),
        )
        .with_recorder(recorder as Arc<dyn Recorder<SimMessage>>),
    );
    let cluster = sim_cluster(
        "fuzz",
        "ptr",
        cli.nodes,
        transport,
        SimConfig::new(),
        ClusterConfig::new(),
    )?;

    let config = match cli.mode {
        Mode::Churn => RunnerConfig::churn(),
        Mode::Network => RunnerConfig::unreliable_network(),
    }
    .with_duration(cli.duration)
    .with_seed(seed);
    let mut runner = FuzzRunner::new(config)?;

    let result = match cli.mode {
        Mode::Churn => runner.run_churn(&cluster).await,
        Mode::Network => runner.run_network(&cluster).await,
    };
    cluster.stop();
    result
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
