use clap::{Args, Parser, Subcommand};
use framework::prelude::*;
use framework::{CommandFramework, PathSourceResolver, ReplayFramework};
use runner::{reason_table, IssueSummary, TestRunner};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

#[derive(Parser)]
#[command(name = "runner")]
#[command(about = "Run a target's tests and report the results as issues")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tests of a single target
    Run(RunArgs),
    /// List the failure reasons decoded into expected/value messages
    Reasons,
}

#[derive(Args)]
struct RunArgs {
    /// The target whose tests to run
    target: String,
    /// Replay recorded results from a JSON fixture
    #[arg(long, conflicts_with = "command", required_unless_present = "command")]
    fixture: Option<PathBuf>,
    /// Program that runs the tests and prints one JSON event per line
    #[arg(long, requires_all = ["source_root", "extension"])]
    command: Option<String>,
    /// Extra argument for the test program, placed before the target
    #[arg(long = "arg", requires = "command")]
    args: Vec<String>,
    /// Directory holding target sources
    #[arg(long)]
    source_root: Option<PathBuf>,
    /// File extension of target sources
    #[arg(long)]
    extension: Option<String>,
    /// Config file (TOML) with timeout_ms, start_timeout_ms and verbose
    #[arg(long)]
    config: Option<PathBuf>,
    /// Milliseconds to wait for the result once the run has started
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Milliseconds to wait for the run to start (unbounded by default)
    #[arg(long)]
    start_timeout_ms: Option<u64>,
    /// Print issues as a JSON array
    #[arg(long)]
    json: bool,
    /// Log run state transitions and test events
    #[arg(short, long)]
    verbose: bool,
}

/// Exit code when the run itself failed and there are no results to report.
const RUN_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Reasons => {
            list_reasons();
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Exits non-zero when a test failed or was cancelled.
async fn run(args: RunArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    let runner = build_runner(&args)?.with_config(config);

    let issues = match runner.run_tests(&args.target).await {
        Ok(issues) => issues,
        Err(e) => {
            error!("Test run for {} failed: {}", args.target, e);
            return Ok(ExitCode::from(RUN_FAILED));
        }
    };

    let summary = IssueSummary::from_issues(&issues);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
    } else {
        for issue in &issues {
            println!("{}", issue);
        }
        println!("\n{}", summary);
    }

    if summary.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn load_config(args: &RunArgs) -> Result<RunConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };

    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = args.start_timeout_ms {
        config = config.with_start_timeout(Duration::from_millis(ms));
    }
    if args.verbose {
        config = config.with_verbose(true);
    }

    config.validate()?;
    Ok(config)
}

fn build_runner(args: &RunArgs) -> Result<TestRunner, Box<dyn std::error::Error>> {
    if let Some(path) = &args.fixture {
        let replay = Arc::new(ReplayFramework::from_file(path)?);
        return Ok(TestRunner::new(replay.clone(), replay));
    }

    match (&args.command, &args.source_root, &args.extension) {
        (Some(program), Some(root), Some(extension)) => {
            let framework = CommandFramework::new(program.clone()).with_args(args.args.clone());
            let resolver = PathSourceResolver::new(root.clone(), extension.clone());
            Ok(TestRunner::new(Arc::new(framework), Arc::new(resolver)))
        }
        _ => Err("either --fixture or --command with --source-root and --extension is required"
            .into()),
    }
}

fn list_reasons() {
    println!("{:<28} {:<18} value field", "reason", "expected field");
    for (reason, fields) in reason_table() {
        println!(
            "{:<28} {:<18} {}",
            reason,
            fields.expected.unwrap_or("undefined"),
            fields.value.unwrap_or("undefined")
        );
    }
}
