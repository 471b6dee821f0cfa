//! # sockhub-engine — epoll network engine
//!
//! Accepts TCP clients, frames their byte streams into packets and hands
//! each packet to an owner thread as an event; carries owner commands
//! (send, broadcast, shutdown) back out to the sockets.
//!
//! ```text
//!   owner thread                         engine thread
//!   ────────────                         ─────────────
//!   NetHandle::send ──▶ command queue ──▶ Engine (epoll)
//!         │   notify ──▶ eventfd ───────▶   │  ▲
//!   NetHandle::poll_next ◀── event queue ◀──┘  │ client sockets
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::net::TcpListener;
//! use sockhub_engine::{Engine, EngineConfig, Event};
//!
//! let listener = TcpListener::bind("0.0.0.0:4321")?;
//! let (engine, mut handle) = Engine::new(listener, EngineConfig::from_env())?;
//! let engine_thread = engine.spawn()?;
//!
//! loop {
//!     match handle.poll_next()? {
//!         Some(Event::Message { client_id, payload }) => {
//!             let reply = payload.to_vec();
//!             handle.send(client_id, &reply)?;
//!         }
//!         Some(_) => {}
//!         None => std::thread::yield_now(),
//!     }
//! }
//! ```

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod config;
        pub mod engine;
        pub mod error;
        pub mod eventfd_notifier;
        pub mod handle;
        pub mod poller;
        pub mod stats;
        pub mod validate;

        pub use config::EngineConfig;
        pub use engine::{Engine, Mode};
        pub use error::{EngineError, Result};
        pub use eventfd_notifier::EventFdNotifier;
        pub use handle::NetHandle;
        pub use stats::{EngineStats, StatsSnapshot};
        pub use validate::{AcceptAll, FrameValidator, Rejection};

        pub use sockhub_core::{ClientId, Command, Event, OwnedEvent, Scope};
    } else {
        compile_error!("sockhub-engine needs epoll and eventfd (Linux only)");
    }
}
