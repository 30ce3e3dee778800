use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;
use versus::config::VersusConfig;
use versus::openings::{load_openings, standard_openings};
use versus::orchestrator::{EngineSpec, MatchOrchestrator, MatchPlan};
use versus::record::{render_summary, RecordFormat};
use versus::worker::WorkerCommand;

/// Plays a match between two UCI chess engines.
#[derive(Parser, Debug)]
#[command(name = "versus")]
#[command(about = "Plays a match between two UCI chess engines")]
struct Cli {
    /// Engine playing white (black in the return pass)
    white: PathBuf,
    /// Engine playing black (white in the return pass)
    black: PathBuf,
    /// File with one starting FEN per line
    #[arg(long)]
    openings: Option<PathBuf>,
    /// Directory for the game log and results summary
    #[arg(short, long, default_value = "versus")]
    output: PathBuf,
    /// Play positions up to this line of the openings file
    #[arg(short = 'n', long, default_value = "200")]
    total_games: usize,
    /// Skip the first N positions
    #[arg(long, default_value = "0")]
    skip: usize,
    /// Replay every position with colors swapped
    #[arg(long)]
    both_sides: bool,
    /// Only write the results summary
    #[arg(long)]
    no_records: bool,
    /// Number of concurrent games
    #[arg(short, long)]
    workers: Option<usize>,
    /// Search options for every move, e.g. "movetime 200"
    #[arg(long)]
    go: Option<String>,
    /// Abandon games after this many plies
    #[arg(long)]
    max_plies: Option<usize>,
    /// Game log format
    #[arg(long, value_enum)]
    format: Option<RecordFormat>,
    /// Appended to output file names when not 1
    #[arg(long, default_value = "1")]
    match_number: u32,
    /// Configuration file (default: versus.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// More log output (-v debug, -vv protocol trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Hidden entry point of a worker process; see `versus::worker`.
#[derive(Parser, Debug)]
#[command(name = "versus")]
struct WorkerCli {
    #[arg(long, hide = true)]
    worker: bool,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Configuration file values with command-line overrides applied.
fn merged_config(cli: &Cli) -> anyhow::Result<VersusConfig> {
    let mut config = VersusConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(go) = &cli.go {
        config.go = go.clone();
    }
    if let Some(max_plies) = cli.max_plies {
        config.max_plies = max_plies;
    }
    if let Some(workers) = cli.workers {
        config.workers = Some(workers);
    }
    if let Some(format) = cli.format {
        config.format = format;
    }
    config.validate()?;
    Ok(config)
}

fn build_plan(cli: &Cli, config: &VersusConfig) -> anyhow::Result<MatchPlan> {
    let openings = match &cli.openings {
        Some(path) => load_openings(path, cli.skip, cli.total_games)?,
        None => standard_openings(cli.skip, cli.total_games),
    };

    Ok(MatchPlan {
        first: EngineSpec::new(&cli.white),
        second: EngineSpec::new(&cli.black),
        openings,
        workers: config.worker_count(),
        both_sides: cli.both_sides,
        runner: config.runner_config()?,
        engine: config.engine_settings(),
        output_dir: cli.output.clone(),
        format: config.format,
        write_records: !cli.no_records,
        match_number: cli.match_number,
        progress_offset: cli.skip as u64,
        worker: WorkerCommand::current(cli.verbose).context("Failed to locate the versus executable")?,
    })
}

fn run_worker(verbose: u8) -> anyhow::Result<()> {
    init_logging(verbose);
    let stdin = std::io::stdin();
    versus::worker::serve(stdin.lock(), std::io::stdout().lock())?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    if let Ok(worker) = WorkerCli::try_parse() {
        if worker.worker {
            return run_worker(worker.verbose);
        }
    }

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = merged_config(&cli)?;
    let plan = build_plan(&cli, &config)?;
    let orchestrator = MatchOrchestrator::new(plan);
    orchestrator.preflight()?;

    let plan = orchestrator.plan();
    println!("Starting the match...");
    println!("White: {} | Black: {}", plan.first.name, plan.second.name);

    let summary = orchestrator.run()?;

    println!("\nMatch finished in {:.2}s", summary.elapsed.as_secs_f64());
    print!(
        "{}",
        render_summary(&plan.first.name, &plan.second.name, &summary.totals)
    );
    if summary.unplayed > 0 {
        println!("Unplayed positions: {}", summary.unplayed);
    }
    if plan.write_records {
        println!("Games written to {}", summary.paths.records.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses_engines_with_defaults() {
        let cli = Cli::try_parse_from(["versus", "engines/a", "engines/b"]).unwrap();

        assert_eq!(cli.white, PathBuf::from("engines/a"));
        assert_eq!(cli.black, PathBuf::from("engines/b"));
        assert_eq!(cli.output, PathBuf::from("versus"));
        assert_eq!(cli.total_games, 200);
        assert_eq!(cli.skip, 0);
        assert_eq!(cli.match_number, 1);
        assert!(!cli.both_sides);
        assert!(!cli.no_records);
        assert_eq!(cli.format, None);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_parses_all_options() {
        let cli = Cli::try_parse_from([
            "versus",
            "a",
            "b",
            "--openings",
            "openings.txt",
            "-o",
            "out",
            "--total-games",
            "200",
            "--skip",
            "100",
            "--both-sides",
            "--no-records",
            "-w",
            "4",
            "--go",
            "depth 6",
            "--max-plies",
            "300",
            "--format",
            "json",
            "--match-number",
            "2",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.openings, Some(PathBuf::from("openings.txt")));
        assert_eq!(cli.output, PathBuf::from("out"));
        assert_eq!(cli.skip, 100);
        assert!(cli.both_sides);
        assert!(cli.no_records);
        assert_eq!(cli.workers, Some(4));
        assert_eq!(cli.go.as_deref(), Some("depth 6"));
        assert_eq!(cli.max_plies, Some(300));
        assert_eq!(cli.format, Some(RecordFormat::Json));
        assert_eq!(cli.match_number, 2);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_requires_both_engines() {
        assert!(Cli::try_parse_from(["versus", "a"]).is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["versus", "a", "b", "--format", "csv"]).is_err());
    }

    #[test]
    fn test_command_line_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versus.toml");
        std::fs::write(&path, "go = \"depth 3\"\nmax_plies = 100\n").unwrap();

        let cli = Cli::try_parse_from([
            "versus",
            "a",
            "b",
            "--config",
            path.to_str().unwrap(),
            "--max-plies",
            "50",
        ])
        .unwrap();
        let config = merged_config(&cli).unwrap();

        assert_eq!(config.go, "depth 3");
        assert_eq!(config.max_plies, 50);
    }

    #[test]
    fn test_invalid_go_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versus.toml");
        std::fs::write(&path, "").unwrap();

        let cli = Cli::try_parse_from([
            "versus",
            "a",
            "b",
            "--config",
            path.to_str().unwrap(),
            "--go",
            "movetime soon",
        ])
        .unwrap();
        assert!(merged_config(&cli).is_err());
    }

    #[test]
    fn test_plan_without_openings_uses_start_position() {
        let cli = Cli::try_parse_from([
            "versus",
            "engines/CEngine_v0",
            "engines/CEngine_v30",
            "--total-games",
            "10",
            "--skip",
            "4",
        ])
        .unwrap();
        let plan = build_plan(&cli, &VersusConfig::default()).unwrap();

        assert_eq!(plan.openings.len(), 6);
        assert_eq!(plan.first.name, "CEngine_v0");
        assert_eq!(plan.second.name, "CEngine_v30");
        assert_eq!(plan.progress_offset, 4);
        assert!(plan.write_records);
    }

    #[test]
    fn test_worker_flag_selects_worker_mode() {
        let worker = WorkerCli::try_parse_from(["versus", "--worker", "-vv"]).unwrap();
        assert!(worker.worker);
        assert_eq!(worker.verbose, 2);

        // A normal invocation is not a worker invocation.
        assert!(WorkerCli::try_parse_from(["versus", "a", "b"]).is_err());
        assert!(!Cli::command().render_help().to_string().contains("--worker"));
    }

    #[test]
    fn test_plan_forwards_verbosity_to_workers() {
        let cli = Cli::try_parse_from(["versus", "a", "b", "-v"]).unwrap();
        let plan = build_plan(&cli, &VersusConfig::default()).unwrap();
        assert_eq!(plan.worker.args, vec!["--worker", "-v"]);
    }

    #[test]
    fn test_cli_help_lists_match_options() {
        let help = Cli::command().render_help().to_string();
        assert!(help.contains("--both-sides"));
        assert!(help.contains("--no-records"));
        assert!(help.contains("--openings"));
    }
}
