//! Completion queue and Work completion.

mod wc;

use std::io;

pub use self::wc::*;

/// Completion queue.
///
/// A completion queue is a single-consumer, ordered stream of work
/// completions. Completions of one work queue are observed strictly in the
/// order their work requests were posted.
pub trait CompletionQueue: Send {
    /// Non-blockingly poll the completion queue for one work completion.
    /// Return `Ok(None)` if no completion is available.
    ///
    /// It is the caller's responsibility to check the status code of the
    /// returned work completion.
    fn try_poll(&mut self) -> io::Result<Option<Wc>>;

    /// Request an event notification for the next completion added to this
    /// queue. If `solicited_only` is set, only receive completions of
    /// solicited sends trigger the event.
    ///
    /// Completions that are already in the queue but not polled yet will also
    /// trigger the event, so arming after a full drain loses nothing.
    fn arm(&mut self, solicited_only: bool) -> io::Result<()>;
}

