//! The generic command dispatch table.
//!
//! External code registers handlers per chat command word. Every inbound
//! message is offered to the table on the network worker before the
//! built-in control interpretation runs. The table does not filter: a
//! handler for `PRIVMSG` also sees sealed control-channel traffic.
//!
//! Handlers are isolated from each other and from the worker. An `Err`
//! is logged at `warn`, a panic is caught and logged at `error`, and the
//! remaining handlers still run.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use parley_transport::ChatMessage;
use tracing::{debug, error, warn};

/// Error a handler may report. Logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler returns.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&ChatMessage) -> HandlerResult + Send + Sync>;

/// Outcome of offering one message to the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that were called.
    pub invoked: usize,
    /// Of those, how many returned an error or panicked.
    pub failed: usize,
}

/// Append-only list of `(command, handler)` entries.
#[derive(Default)]
pub struct CommandDispatchTable {
    /// A `Vec` rather than a map keyed by command: registration order is
    /// the call order, and a handful of entries is scanned faster than
    /// it is hashed.
    ///
    /// Handlers are `Arc`s so `dispatch` can clone the matching ones out
    /// and release the lock before calling any of them.
    entries: RwLock<Vec<(String, Handler)>>,
}

impl CommandDispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for messages whose command equals `command`.
    ///
    /// Several handlers may share a command; all of them fire, in
    /// registration order.
    pub fn install<F>(&self, command: impl Into<String>, handler: F)
    where
        F: Fn(&ChatMessage) -> HandlerResult + Send + Sync + 'static,
    {
        let command = command.into();
        let mut entries = self.entries.write();
        debug!(%command, handlers = entries.len() + 1, "command handler installed");
        entries.push((command, Arc::new(handler)));
    }

    /// Invokes every handler registered for `msg.command`.
    ///
    /// The matching handlers are copied out first, so a handler may
    /// install further handlers without deadlocking.
    pub fn dispatch(&self, msg: &ChatMessage) -> DispatchReport {
        let handlers: Vec<Handler> = self
            .entries
            .read()
            .iter()
            .filter(|(command, _)| *command == msg.command)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        let mut report = DispatchReport::default();
        for handler in handlers {
            report.invoked += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| handler(msg))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(command = %msg.command, sender = %msg.sender, error = %e, "command handler failed");
                }
                Err(payload) => {
                    report.failed += 1;
                    error!(
                        command = %msg.command,
                        sender = %msg.sender,
                        panic = panic_message(payload.as_ref()),
                        "command handler panicked"
                    );
                }
            }
        }
        report
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for CommandDispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatchTable")
            .field("handlers", &self.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
