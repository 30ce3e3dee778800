//! Mock UCI engines for integration tests.
//!
//! Each mock is a small POSIX shell script written into a temporary
//! directory. They answer the handshake, then reply to `go` from a script.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use versus::client::EngineSettings;

/// Writes an executable shell script whose loop body handles one input line.
///
/// `cases` are extra `case` arms; `uci`, `isready` and `quit` are handled.
pub fn write_engine(dir: &Path, name: &str, cases: &str) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
n=0
ply=0
while IFS= read -r line; do
  case "$line" in
    uci) echo "id name {name} mock"; echo "uciok" ;;
    isready) echo "readyok" ;;
    ucinewgame) n=0 ;;
    quit) exit 0 ;;
{cases}
  esac
done
"#
    );
    let path = dir.join(name);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Replies with the n-th move on the n-th `go` of a game, then `(none)`.
///
/// Every reply is preceded by an `info` line scoring it `10 * n` centipawns.
pub fn scripted_engine(dir: &Path, name: &str, moves: &[&str]) -> PathBuf {
    let mut arms = String::new();
    for (i, mv) in moves.iter().enumerate() {
        let n = i + 1;
        arms.push_str(&format!(
            "        {n}) echo \"info depth {n} score cp {score} nps 1000 pv {mv}\"; echo \"bestmove {mv}\" ;;\n",
            score = n * 10
        ));
    }
    let cases = format!(
        r#"    go*) n=$((n+1))
      case $n in
{arms}        *) echo "bestmove (none)" ;;
      esac ;;"#
    );
    write_engine(dir, name, &cases)
}

/// Replies with `moves[ply]`, where `ply` is the length of the move list in
/// the last `position` command, so the same script can play either color.
pub fn ply_engine(dir: &Path, name: &str, moves: &[&str]) -> PathBuf {
    let mut arms = String::new();
    for (ply, mv) in moves.iter().enumerate() {
        arms.push_str(&format!("        {ply}) echo \"bestmove {mv}\" ;;\n"));
    }
    let cases = format!(
        r#"    position*)
      set -- $line
      ply=0
      seen=0
      for word in "$@"; do
        if [ $seen -eq 1 ]; then ply=$((ply+1)); fi
        if [ "$word" = moves ]; then seen=1; fi
      done ;;
    go*)
      case $ply in
{arms}        *) echo "bestmove (none)" ;;
      esac ;;"#
    );
    write_engine(dir, name, &cases)
}

/// Fool's mate from either side: black mates on the fourth ply.
pub fn fools_mate_engine(dir: &Path, name: &str) -> PathBuf {
    ply_engine(dir, name, &["f2f3", "e7e5", "g2g4", "d8h4"])
}

/// Settings with short timeouts so failing tests fail fast.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        handshake_timeout: Duration::from_secs(5),
        quit_timeout: Duration::from_millis(200),
        options: Default::default(),
    }
}
