//! sockhub echo server
//!
//! The engine runs on its own thread; `main` is the owner. Every Message is
//! echoed to its sender and every join is announced to the clients already
//! connected.
//!
//! Usage:
//!     cargo build --release -p sockhub-echo
//!     ./target/release/sockhub-echo [port] [max_clients]
//!
//! Test with:
//!     # One "PING" packet, expect it back:
//!     printf '\x04\x00PING' | nc -q1 localhost 4321 | xxd
//!
//! Environment:
//!     RUST_LOG=debug               log filter (default info)
//!     SOCKHUB_VALIDATE_ORDERS=1    reject malformed order/reply payloads
//!     SOCKHUB_*                    engine sizing, see EngineConfig::from_env

mod orders;

use std::net::TcpListener;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use sockhub_core::env::env_get_bool;
use sockhub_engine::{ClientId, Engine, EngineConfig, NetHandle, OwnedEvent, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::orders::OrderValidator;

const DEFAULT_PORT: u16 = 4321;
const IDLE_SLEEP: Duration = Duration::from_millis(1);
const STATS_INTERVAL: Duration = Duration::from_secs(5);

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_signal(_: i32) {
    RUNNING.store(false, Ordering::Relaxed);
}

fn install_signal_handlers() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler only stores to an atomic.
    unsafe {
        sigaction(Signal::SIGINT, &action)?;
        sigaction(Signal::SIGTERM, &action)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "sockhub-echo failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let port: u16 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_PORT);
    let mut config = EngineConfig::from_env();
    if let Some(max_clients) = args.get(2).and_then(|s| s.parse().ok()) {
        config = config.max_clients(max_clients);
    }

    install_signal_handlers()?;

    let listener = TcpListener::bind(("0.0.0.0", port))?;
    info!(port, max_clients = config.max_clients, "sockhub-echo starting");

    let (engine, mut handle) = Engine::new(listener, config)?;
    let engine = if env_get_bool("SOCKHUB_VALIDATE_ORDERS", false) {
        info!("order validation enabled");
        engine.with_validator(OrderValidator)
    } else {
        engine
    };
    let engine_thread = engine.spawn()?;

    let mut members: Vec<ClientId> = Vec::new();
    let mut shutdown_sent = false;
    let start = Instant::now();
    let mut last_stats = start;

    loop {
        if !RUNNING.load(Ordering::Relaxed) && !shutdown_sent {
            match handle.request_shutdown() {
                Ok(()) => {
                    info!(clients = members.len(), "signal received, draining");
                    shutdown_sent = true;
                }
                // Retried on the next pass.
                Err(err) if err.is_queue_full() => {}
                Err(err) => return Err(err),
            }
        }

        let handled = pump_events(&mut handle, &mut members)?;
        if engine_thread.is_finished() && handle.pending_events() == 0 {
            break;
        }
        if handled == 0 {
            thread::sleep(IDLE_SLEEP);
        }

        let now = Instant::now();
        if now.duration_since(last_stats) >= STATS_INTERVAL {
            info!(
                elapsed_secs = now.duration_since(start).as_secs(),
                clients = members.len(),
                stats = %handle.stats().snapshot(),
                "stats"
            );
            last_stats = now;
        }
    }

    match engine_thread.join() {
        Ok(result) => result?,
        Err(_) => error!("engine thread panicked"),
    }
    info!(stats = %handle.stats().snapshot(), "sockhub-echo done");
    Ok(())
}

/// Handle every queued event. Returns how many there were.
fn pump_events(handle: &mut NetHandle, members: &mut Vec<ClientId>) -> Result<usize> {
    let mut handled = 0;
    while let Some(event) = handle.poll_next()? {
        let event = event.into_owned();
        handled += 1;
        match event {
            OwnedEvent::Connect { client_id } => {
                if !members.is_empty() {
                    let note = format!("client {client_id} joined");
                    tolerate_full(handle.broadcast(members, note.as_bytes()))?;
                }
                members.push(client_id);
            }
            OwnedEvent::Disconnect { client_id } => members.retain(|&m| m != client_id),
            OwnedEvent::Message { client_id, payload } => {
                tolerate_full(handle.send(client_id, &payload))?;
            }
            OwnedEvent::Error { client_id, errno } => {
                warn!(client = %client_id, errno, "client socket error");
            }
        }
    }
    Ok(handled)
}

/// A full command queue costs one reply, not the server.
fn tolerate_full(result: Result<()>) -> Result<()> {
    match result {
        Err(err) if err.is_queue_full() => {
            warn!("command queue full, reply dropped");
            Ok(())
        }
        other => other,
    }
}
