#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dgfs_daemon` is the server side of the dgfs remote file service: a
//! blocking UDP serve loop that decodes request datagrams, dispatches them
//! through a configurable invocation-semantics strategy to the file engine,
//! and sends encoded replies back. Mutating operations additionally fan out
//! to the monitor registry, which delivers unsolicited callback datagrams to
//! subscribed clients.
//!
//! # Design
//!
//! - [`semantics::InvocationSemantics`] selects between at-least-once
//!   dispatch (every datagram executes, offered as a demonstration; unsafe
//!   for the non-idempotent write operations) and at-most-once dispatch
//!   backed by a [`semantics::ReplyCache`] keyed on request identifiers.
//! - [`dispatch::RequestDispatcher`] is the
//!   [`DatagramHandler`](dgfs_transport::DatagramHandler) the transport loop
//!   drives: decode, strategy, file engine, encode. Malformed
//!   datagrams are dropped without a reply; the client's retry machinery
//!   covers them.
//! - [`monitor::MonitorRegistry`] maps paths to subscriptions with lazy
//!   expiry, delivering best-effort callbacks through the transport's
//!   [`CallbackSink`].
//! - [`Daemon`] binds the transport and wires the pieces together;
//!   [`run`] adds the `dgfsd` command-line surface on top.
//!
//! # Invariants
//!
//! - Under at-most-once semantics a request identifier reaches the file
//!   engine at most once, however many duplicate datagrams arrive.
//! - A shutdown request terminates the serve loop after its acknowledgment
//!   is (probabilistically) sent; it is never cached.
//! - The daemon never aborts on bad input: malformed datagrams are logged
//!   and dropped, semantic failures become error replies.

pub mod dispatch;
pub mod monitor;
pub mod semantics;

mod config;
mod run;

pub use crate::config::DaemonConfig;
pub use crate::run::{exit_code_from, run};

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use dgfs_engine::FileStore;
use dgfs_transport::{CallbackSink, LossGate, ServerTransport};

use crate::dispatch::RequestDispatcher;
use crate::monitor::MonitorRegistry;
use crate::semantics::InvocationSemantics;

/// A bound daemon ready to serve.
///
/// Binding and serving are split so tests (and the CLI) can learn the
/// ephemeral port before entering the blocking loop.
pub struct Daemon {
    transport: ServerTransport,
    dispatcher: RequestDispatcher,
}

impl Daemon {
    /// Binds the serve socket and assembles the dispatcher.
    pub fn bind(config: &DaemonConfig) -> std::io::Result<Self> {
        let transport = ServerTransport::bind(
            config.port,
            LossGate::new(config.send_prob, config.recv_prob),
        )?;
        let registry = Arc::new(MonitorRegistry::new());
        let sink: Arc<dyn CallbackSink> = transport.callback_sink();
        let dispatcher = RequestDispatcher::new(
            config.semantics,
            FileStore::new(&config.root),
            registry,
            sink,
        );
        Ok(Self {
            transport,
            dispatcher,
        })
    }

    /// Address the daemon is reachable at.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the blocking serve loop until a shutdown request arrives.
    pub fn serve(&self) -> std::io::Result<()> {
        self.transport.serve(&self.dispatcher)
    }
}

/// Binds and serves until shutdown, logging lifecycle events.
pub fn serve(config: &DaemonConfig) -> std::io::Result<()> {
    let daemon = Daemon::bind(config)?;
    info!(
        addr = %daemon.local_addr()?,
        semantics = config.semantics.name(),
        root = %config.root.display(),
        "daemon listening"
    );
    if config.semantics == InvocationSemantics::AtLeastOnce {
        warn!(
            "at-least-once semantics re-execute duplicated write-insert and \
             write-delete requests; retries can corrupt files"
        );
    }
    daemon.serve()?;
    info!("daemon shut down");
    Ok(())
}

/// Writes the operator-facing at-least-once warning used by `run`.
fn write_semantics_warning<W: Write>(err: &mut W) {
    let _ = writeln!(
        err,
        "warning: at-least-once semantics are unsafe for write-insert and \
         write-delete under retries"
    );
}
