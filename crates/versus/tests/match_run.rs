#![cfg(unix)]

mod common;

use common::{fast_settings, fools_mate_engine, scripted_engine, write_engine};
use std::path::{Path, PathBuf};
use versus::game_runner::RunnerConfig;
use versus::orchestrator::{EngineSpec, MatchError, MatchOrchestrator, MatchPlan};
use versus::record::{render_summary, RecordFormat};
use versus::worker::WorkerCommand;

fn plan(first: &Path, second: &Path, games: usize, output: &Path) -> MatchPlan {
    MatchPlan {
        first: EngineSpec::new(first),
        second: EngineSpec::new(second),
        openings: vec![uci::STARTING_FEN.to_string(); games],
        workers: 1,
        both_sides: false,
        runner: RunnerConfig::default(),
        engine: fast_settings(),
        output_dir: output.to_path_buf(),
        format: RecordFormat::Pgn,
        write_records: true,
        match_number: 1,
        progress_offset: 0,
        worker: WorkerCommand::new(env!("CARGO_BIN_EXE_versus")),
    }
}

fn rounds(log: &str) -> Vec<u64> {
    let mut rounds: Vec<u64> = log
        .lines()
        .filter_map(|l| l.strip_prefix("[Round \""))
        .map(|r| r.trim_end_matches("\"]").parse().unwrap())
        .collect();
    rounds.sort_unstable();
    rounds
}

#[test]
fn test_single_move_game_is_recorded_once() {
    let dir = tempfile::tempdir().unwrap();
    let white = scripted_engine(dir.path(), "alpha", &["e2e4"]);
    let black = scripted_engine(dir.path(), "beta", &["e2e4"]);
    let out = dir.path().join("out");

    let summary = MatchOrchestrator::new(plan(&white, &black, 1, &out)).run().unwrap();

    assert_eq!(summary.totals.games_started, 1);
    assert_eq!(summary.totals.aborted, 1);
    assert_eq!(summary.totals.outcomes(), 1);

    let results = std::fs::read_to_string(out.join("alpha_vs_beta_results.txt")).unwrap();
    assert_eq!(results, render_summary("alpha", "beta", &summary.totals));
    assert!(results.contains("Games: 1"));

    let log = std::fs::read_to_string(out.join("alpha_vs_beta.pgn")).unwrap();
    assert_eq!(rounds(&log), vec![1]);
    assert!(log.contains("1. e2e4 {"));
    assert!(log.contains("[Result \"*\"]"));
    assert!(log.ends_with("\n\n"));
}

#[test]
fn test_parallel_games_keep_counters_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let white = fools_mate_engine(dir.path(), "fool");
    let black = fools_mate_engine(dir.path(), "mater");
    let out = dir.path().join("out");

    let mut plan = plan(&white, &black, 6, &out);
    plan.workers = 3;
    let summary = MatchOrchestrator::new(plan).run().unwrap();

    assert_eq!(summary.totals.games_started, 6);
    assert_eq!(summary.totals.black_wins, 6);
    assert_eq!(summary.totals.outcomes(), summary.totals.games_started);
    assert_eq!(summary.unplayed, 0);

    let log = std::fs::read_to_string(&summary.paths.records).unwrap();
    assert_eq!(rounds(&log), (1..=6).collect::<Vec<u64>>());
    assert_eq!(log.matches("1. f2f3 e7e5 2. g2g4 d8h4 0-1").count(), 6);
}

#[test]
fn test_both_sides_credits_engines_not_colors() {
    let dir = tempfile::tempdir().unwrap();
    let first = fools_mate_engine(dir.path(), "first");
    let second = fools_mate_engine(dir.path(), "second");
    let out = dir.path().join("out");

    let mut plan = plan(&first, &second, 2, &out);
    plan.both_sides = true;
    plan.workers = 2;
    let summary = MatchOrchestrator::new(plan).run().unwrap();

    // Black mates every game: `second` in the first pass, `first` after the swap.
    assert_eq!(summary.totals.games_started, 4);
    assert_eq!(summary.totals.white_wins, 2);
    assert_eq!(summary.totals.black_wins, 2);

    let log = std::fs::read_to_string(&summary.paths.records).unwrap();
    assert_eq!(log.matches("[White \"second\"]").count(), 2);
    assert_eq!(rounds(&log), vec![1, 2, 3, 4]);
}

#[test]
fn test_openings_window_and_json_records() {
    let dir = tempfile::tempdir().unwrap();
    let white = fools_mate_engine(dir.path(), "w");
    let black = fools_mate_engine(dir.path(), "b");
    let out = dir.path().join("out");

    let openings_path = dir.path().join("openings.txt");
    let lines = vec![uci::STARTING_FEN; 5].join("\n");
    std::fs::write(&openings_path, lines).unwrap();

    let mut plan = plan(&white, &black, 0, &out);
    plan.openings = versus::openings::load_openings(&openings_path, 2, 4).unwrap();
    plan.format = RecordFormat::Json;
    plan.match_number = 2;
    let summary = MatchOrchestrator::new(plan).run().unwrap();

    assert_eq!(summary.totals.games_started, 2);
    assert_eq!(summary.paths.records, out.join("w_vs_b_2.json"));

    let log = std::fs::read_to_string(&summary.paths.records).unwrap();
    let games: Vec<serde_json::Value> = log
        .split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| serde_json::from_str(block).unwrap())
        .collect();
    assert_eq!(games.len(), 2);
    assert!(games.iter().all(|g| g["result"] == "BlackWins"));
    assert!(games.iter().all(|g| g["termination"] == "checkmate"));
}

#[test]
fn test_no_records_writes_summary_only() {
    let dir = tempfile::tempdir().unwrap();
    let white = fools_mate_engine(dir.path(), "w");
    let black = fools_mate_engine(dir.path(), "b");
    let out = dir.path().join("out");

    let mut plan = plan(&white, &black, 1, &out);
    plan.write_records = false;
    let summary = MatchOrchestrator::new(plan).run().unwrap();

    assert!(!summary.paths.records.exists());
    assert!(summary.paths.summary.exists());
}

#[test]
fn test_crashing_engine_aborts_games_not_the_match() {
    let dir = tempfile::tempdir().unwrap();
    let white = fools_mate_engine(dir.path(), "steady");
    let black = write_engine(dir.path(), "crashy", "    go*) exit 1 ;;");
    let out = dir.path().join("out");

    let summary = MatchOrchestrator::new(plan(&white, &black, 3, &out)).run().unwrap();

    assert_eq!(summary.totals.games_started, 3);
    assert_eq!(summary.totals.aborted, 3);
    let log = std::fs::read_to_string(&summary.paths.records).unwrap();
    assert_eq!(log.matches("1. f2f3 {").count(), 3);
}

#[test]
fn test_engine_that_never_starts_leaves_positions_unplayed() {
    let dir = tempfile::tempdir().unwrap();
    let white = fools_mate_engine(dir.path(), "w");
    let black = write_engine(dir.path(), "mute", "");
    std::fs::write(&black, "#!/bin/sh\nwhile IFS= read -r line; do :; done\n").unwrap();
    let out = dir.path().join("out");

    let mut plan = plan(&white, &black, 3, &out);
    plan.engine.handshake_timeout = std::time::Duration::from_millis(200);
    let summary = MatchOrchestrator::new(plan).run().unwrap();

    assert_eq!(summary.totals.games_started, 0);
    assert_eq!(summary.unplayed, 3);
    let results = std::fs::read_to_string(&summary.paths.summary).unwrap();
    assert!(results.contains("Games: 0"));
}

#[test]
fn test_lost_worker_costs_only_its_current_game() {
    let dir = tempfile::tempdir().unwrap();
    let white = fools_mate_engine(dir.path(), "w");
    let black = fools_mate_engine(dir.path(), "b");
    let out = dir.path().join("out");

    // Accepts its setup, then dies on the first game it is sent.
    let worker = dir.path().join("dying-worker");
    std::fs::write(
        &worker,
        "#!/bin/sh\nread -r setup\necho '\"ready\"'\nread -r game\nexit 3\n",
    )
    .unwrap();
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&worker, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut plan = plan(&white, &black, 2, &out);
    plan.worker = WorkerCommand::new(&worker);
    let summary = MatchOrchestrator::new(plan).run().unwrap();

    assert_eq!(summary.totals.games_started, 1);
    assert_eq!(summary.totals.aborted, 1);
    assert_eq!(summary.unplayed, 1);
    let log = std::fs::read_to_string(&summary.paths.records).unwrap();
    assert!(log.contains("worker failure"));
}

#[test]
fn test_missing_worker_program_leaves_positions_unplayed() {
    let dir = tempfile::tempdir().unwrap();
    let white = fools_mate_engine(dir.path(), "w");
    let black = fools_mate_engine(dir.path(), "b");
    let out = dir.path().join("out");

    let mut plan = plan(&white, &black, 2, &out);
    plan.worker = WorkerCommand::new("/nonexistent/versus");
    let summary = MatchOrchestrator::new(plan).run().unwrap();

    assert_eq!(summary.totals.games_started, 0);
    assert_eq!(summary.unplayed, 2);
}

#[test]
fn test_missing_engine_fails_before_any_output() {
    let dir = tempfile::tempdir().unwrap();
    let white = fools_mate_engine(dir.path(), "w");
    let out = dir.path().join("out");

    let result = MatchOrchestrator::new(plan(&white, &PathBuf::from("/nonexistent/engine"), 1, &out)).run();

    assert!(matches!(result, Err(MatchError::MissingEngine(_))));
    assert!(!out.exists());
}
