// SPDX-License-Identifier: Apache-2.0
//! mycel front-end: binds the core substrate to stdin/stdout.
//!
//! stdin bytes stream into the engine's input ring from a reader
//! thread; the tick loop never blocks on input. stdout carries the raw
//! action byte stream; diagnostics go to stderr. Exit codes: 0 for
//! normal termination (EOF or signal), 2 for invalid arguments, 3 when
//! the state file is locked by another process, 4 for irrecoverable
//! capacity exhaustion.

use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use mycel_core::{Engine, EngineConfig, EngineError};
use tracing_subscriber::EnvFilter;

/// A continuously-running, self-organizing associative graph substrate.
#[derive(Debug, Parser)]
#[command(name = "mycel", version)]
struct Args {
    /// Vertex capacity of the arena.
    #[arg(long, default_value_t = 8192, value_parser = clap::value_parser!(u32).range(1..))]
    nodes: u32,

    /// Edge capacity of the arena.
    #[arg(long, default_value_t = 65536, value_parser = clap::value_parser!(u32).range(1..))]
    edges: u32,

    /// PRNG seed; defaults to a time-based seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Snapshot file path.
    #[arg(long, default_value = "./graph.state")]
    state: std::path::PathBuf,

    /// Disable the output-to-input feedback loop.
    #[arg(long = "no-self-observation")]
    no_self_observation: bool,

    /// Cooperative tick pacing in milliseconds (0 runs flat out).
    #[arg(long = "tick-ms", default_value_t = 50)]
    tick_ms: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "fatal");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let seed = args.seed.unwrap_or_else(time_seed);
    let config = EngineConfig {
        vertex_cap: args.nodes,
        edge_cap: args.edges,
        seed,
        state_path: Some(args.state.clone()),
        self_observe: !args.no_self_observation,
        ..EngineConfig::default()
    };

    let mut engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(EngineError::AlreadyRunning(path)) => {
            tracing::error!(lock = %path.display(), "state file locked by another process");
            return Ok(ExitCode::from(3));
        }
        Err(EngineError::InvalidConfig(reason)) => {
            tracing::error!(%reason, "invalid arguments");
            return Ok(ExitCode::from(2));
        }
        Err(err) => return Err(err.into()),
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .context("installing the shutdown handler")?;
    }

    let input = spawn_stdin_reader();
    let mut stdout = io::stdout().lock();
    let mut outbuf = Vec::new();
    let mut eof = false;
    let tick_budget = Duration::from_millis(args.tick_ms);

    loop {
        if shutdown.load(Ordering::SeqCst) {
            tracing::info!("shutdown signal received");
            break;
        }
        drain_input(&input, &mut engine, &mut eof);
        if eof && engine.idle() {
            break;
        }

        let started = Instant::now();
        match engine.tick() {
            Ok(()) => {}
            Err(EngineError::CapacityIrrecoverable) => {
                tracing::error!("capacity irrecoverably exhausted");
                let _ = engine.finalize();
                return Ok(ExitCode::from(4));
            }
            Err(err) => return Err(err.into()),
        }

        outbuf.clear();
        engine.drain_output(&mut outbuf);
        if !outbuf.is_empty()
            && stdout.write_all(&outbuf).and_then(|()| stdout.flush()).is_err()
        {
            // A closed consumer ends the run the same way EOF does.
            tracing::info!("stdout closed, terminating");
            break;
        }

        if args.tick_ms > 0 {
            let elapsed = started.elapsed();
            if elapsed < tick_budget {
                thread::sleep(tick_budget - elapsed);
            }
        }
    }

    let _ = engine.finalize();
    let stats = engine.stats();
    tracing::info!(
        tick = stats.tick,
        vertices = stats.vertex_count,
        edges = stats.edge_count,
        "terminated"
    );
    Ok(ExitCode::SUCCESS)
}

/// Streams stdin chunks into a channel so reads never block the tick
/// loop; the channel disconnects on EOF.
fn spawn_stdin_reader() -> Receiver<Vec<u8>> {
    let (tx, rx) = bounded::<Vec<u8>>(64);
    thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut buf = [0u8; 4096];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

fn drain_input(input: &Receiver<Vec<u8>>, engine: &mut Engine, eof: &mut bool) {
    loop {
        match input.try_recv() {
            Ok(chunk) => engine.push_input(&chunk),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                *eof = true;
                break;
            }
        }
    }
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0x9e37_79b9_7f4a_7c15, |d| d.as_nanos() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_interface_contract() {
        let args = Args::parse_from(["mycel"]);
        assert_eq!(args.nodes, 8192);
        assert_eq!(args.edges, 65536);
        assert_eq!(args.state, std::path::PathBuf::from("./graph.state"));
        assert_eq!(args.tick_ms, 50);
        assert!(!args.no_self_observation);
        assert!(args.seed.is_none());
    }

    #[test]
    fn zero_capacities_are_rejected_at_parse_time() {
        assert!(Args::try_parse_from(["mycel", "--nodes", "0"]).is_err());
        assert!(Args::try_parse_from(["mycel", "--edges", "0"]).is_err());
    }

    #[test]
    fn flags_parse() {
        let args = Args::parse_from([
            "mycel",
            "--nodes",
            "64",
            "--edges",
            "256",
            "--seed",
            "7",
            "--state",
            "/tmp/x.state",
            "--no-self-observation",
            "--tick-ms",
            "0",
        ]);
        assert_eq!(args.nodes, 64);
        assert_eq!(args.edges, 256);
        assert_eq!(args.seed, Some(7));
        assert!(args.no_self_observation);
        assert_eq!(args.tick_ms, 0);
    }
}
