//! Versus - engine-versus-engine chess matches over UCI.
//!
//! This crate drives external UCI engines as subprocesses and plays large
//! batches of games between two of them in parallel, writing every game to a
//! record log and keeping a results summary up to date.
//!
//! # Modules
//!
//! - [`process`] - Ownership of one engine subprocess and its pipes
//! - [`client`] - UCI protocol client with a live evaluation stream
//! - [`referee`] - Chess rules used to adjudicate games
//! - [`game_runner`] - Game execution logic for a single game
//! - [`counters`] - Match-wide counters shared by workers
//! - [`record`] - Game log and results summary output
//! - [`orchestrator`] - Worker pool running a whole match
//! - [`worker`] - Worker processes and their pipe protocol
//! - [`openings`] - Starting position loading
//! - [`config`] - TOML configuration

pub mod client;
pub mod config;
pub mod counters;
pub mod game_runner;
pub mod openings;
pub mod orchestrator;
pub mod process;
pub mod record;
pub mod referee;
pub mod worker;
