//! Message passing between the front end, the orchestrator and the LCD driver.
//!
//! Every actor owns one end of a [`Mailbox`] pair per peer and polls it once per
//! tick. A message is an [`Envelope`]: a command name plus positional JSON
//! arguments. Handlers are looked up in a per-actor [`CommandRegistry`]; their
//! outcome is sent back as a `"response"` or `"error"` envelope, or not at all
//! when the handler has nothing to say.
//!
//! Replies carry no correlation id. A caller may only have one request in
//! flight per mailbox and matches the reply by arrival order.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use log::{debug, error, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CommandError;

pub const RESPONSE: &str = "response";
pub const ERROR: &str = "error";

/// What a handler hands back: `Some` is replied to the caller, `None` is silent.
pub type CommandResult = Result<Option<Value>, CommandError>;

pub type Handler<A> = fn(&mut A, Vec<Value>) -> CommandResult;

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub command: String,
    pub args: Vec<Value>,
}

impl Envelope {
    pub fn new(command: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.command == RESPONSE || self.command == ERROR
    }

    fn into_reply(self) -> Result<Value, CommandError> {
        let first = self.args.into_iter().next();
        match self.command.as_str() {
            RESPONSE => Ok(first.unwrap_or(Value::Null)),
            ERROR => {
                let raw = first.unwrap_or(Value::Null);
                Err(serde_json::from_value(raw.clone())
                    .unwrap_or_else(|_| CommandError::Unexpected(raw.to_string())))
            }
            other => Err(CommandError::Unexpected(format!(
                "expected a reply, received command '{other}'"
            ))),
        }
    }
}

/// One end of a bidirectional channel between two actors.
pub struct Mailbox {
    peer: &'static str,
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
}

impl Mailbox {
    /// Creates a connected pair. The first mailbox belongs to `left` and talks
    /// to `right`; the second is the reverse.
    pub fn pair(left: &'static str, right: &'static str) -> (Mailbox, Mailbox) {
        let (left_tx, right_rx) = unbounded();
        let (right_tx, left_rx) = unbounded();
        (
            Mailbox {
                peer: right,
                tx: left_tx,
                rx: left_rx,
            },
            Mailbox {
                peer: left,
                tx: right_tx,
                rx: right_rx,
            },
        )
    }

    /// Name of the actor on the other end.
    pub fn peer(&self) -> &'static str {
        self.peer
    }

    pub fn send(&self, command: &str, args: Vec<Value>) -> Result<(), CommandError> {
        self.tx
            .send(Envelope::new(command, args))
            .map_err(|_| CommandError::Disconnected(self.peer.to_string()))
    }

    /// Non-blocking poll of the inbound side.
    pub fn try_recv(&self) -> Result<Option<Envelope>, CommandError> {
        match self.rx.try_recv() {
            Ok(envelope) => Ok(Some(envelope)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(CommandError::Disconnected(self.peer.to_string()))
            }
        }
    }

    /// Sends a handler outcome back to the peer.
    pub fn reply(&self, outcome: CommandResult) -> Result<(), CommandError> {
        match outcome {
            Ok(Some(value)) => self.send(RESPONSE, vec![value]),
            Ok(None) => Ok(()),
            Err(err) => {
                let value = serde_json::to_value(&err)
                    .unwrap_or_else(|_| Value::String(err.to_string()));
                self.send(ERROR, vec![value])
            }
        }
    }

    /// Synchronous round trip: send `command` and wait up to `timeout` for the
    /// reply. An `"error"` reply is returned as `Err`.
    ///
    /// Anything already waiting in the inbound queue is a reply to an earlier
    /// request that timed out; it is logged and dropped so it cannot be
    /// mistaken for the answer to this one.
    pub fn request(
        &self,
        command: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, CommandError> {
        while let Some(stale) = self.try_recv()? {
            warn!(
                "discarding stale '{}' from {} before sending '{command}'",
                stale.command, self.peer
            );
        }

        debug!("sending {command}{args:?} to {}", self.peer);
        self.send(command, args)?;

        match self.rx.recv_timeout(timeout) {
            Ok(envelope) => {
                let reply = envelope.into_reply();
                if let Err(err) = &reply {
                    error!("received error response from {}: {err}", self.peer);
                }
                reply
            }
            Err(RecvTimeoutError::Timeout) => Err(CommandError::Timeout {
                command: command.to_string(),
                timeout_ms: whole_millis(timeout),
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CommandError::Disconnected(self.peer.to_string()))
            }
        }
    }
}

/// Milliseconds in `timeout`, saturating at `u64::MAX`.
fn whole_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Command name to handler table, built once per actor instance.
pub struct CommandRegistry<A> {
    handlers: HashMap<&'static str, Handler<A>>,
}

impl<A> CommandRegistry<A> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn with(mut self, name: &'static str, handler: Handler<A>) -> Self {
        self.register(name, handler);
        self
    }

    pub fn register(&mut self, name: &'static str, handler: Handler<A>) {
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Handler<A>> {
        self.handlers.get(name).copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl<A> Default for CommandRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one envelope against `actor` and replies on `mailbox`.
///
/// This is the outermost boundary for a single command: unknown commands and
/// handler panics both turn into error replies. Only a failure to reply (the
/// peer is gone) is returned to the run loop.
pub fn dispatch<A>(
    actor: &mut A,
    handler: Option<Handler<A>>,
    envelope: Envelope,
    mailbox: &Mailbox,
) -> Result<(), CommandError> {
    let Envelope { command, args } = envelope;
    let Some(handler) = handler else {
        error!(
            "received unknown command '{command}' from {}",
            mailbox.peer()
        );
        return mailbox.reply(Err(CommandError::UnknownCommand(command)));
    };

    debug!("executing {command}{args:?}");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(actor, args)))
        .unwrap_or_else(|payload| {
            error!("handler for '{command}' panicked");
            Err(CommandError::Unexpected(panic_message(payload.as_ref())))
        });
    debug!("response {outcome:?}");
    mailbox.reply(outcome)
}

/// Decodes positional argument `index` into `T`.
pub fn arg<T: DeserializeOwned>(args: &[Value], index: usize, name: &str) -> Result<T, CommandError> {
    let value = args
        .get(index)
        .ok_or_else(|| CommandError::Validation(format!("missing argument '{name}'")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| CommandError::Validation(format!("invalid argument '{name}': {e}")))
}

/// Wraps a serializable value as a handler response.
pub fn respond<T: Serialize>(value: &T) -> CommandResult {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| CommandError::Unexpected(e.to_string()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
