//! Pending requests - the caller-facing half of a request/reply exchange.
//!
//! A `TypedFuture<T>` is the completion slot held by the registry; the paired
//! `PendingReply<T>` is what the caller awaits. The slot completes at most
//! once; later attempts are ignored and reported as `false`.

use crate::domain::error::RequestError;
use parking_lot::Mutex;
use shared_types::{InReplyTo, MessageContent, ReplyShape};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type Outcome<T> = Result<T, RequestError>;

/// How a reply result settled a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The result had the expected shape; the caller got it.
    Completed,
    /// The result had the wrong shape; the caller got `TypeMismatch`.
    Mismatched,
    /// The slot was already resolved; nothing changed.
    AlreadyResolved,
}

/// Type-erased completion slot, as stored in the registry.
pub(crate) trait PendingSlot: Send + Sync {
    /// Complete with a reply result.
    fn complete(&self, value: Option<MessageContent>) -> Completion;

    /// Fail with `cause`. Returns false if already resolved.
    fn fail(&self, cause: RequestError) -> bool;

    /// Name of the expected shape, for logs.
    fn shape(&self) -> &'static str;
}

/// Completion slot for a request expecting a reply of shape `T`.
pub struct TypedFuture<T: ReplyShape> {
    sender: Mutex<Option<oneshot::Sender<Outcome<T>>>>,
    _shape: PhantomData<fn() -> T>,
}

impl<T: ReplyShape> TypedFuture<T> {
    /// Create a slot and the future that observes it.
    #[must_use]
    pub fn channel(in_reply_to: InReplyTo) -> (Self, PendingReply<T>) {
        let (tx, rx) = oneshot::channel();
        let slot = Self {
            sender: Mutex::new(Some(tx)),
            _shape: PhantomData,
        };
        let reply = PendingReply {
            in_reply_to,
            receiver: rx,
        };
        (slot, reply)
    }

    /// Complete with a reply result.
    ///
    /// If `T` is `()`, any value is a type mismatch. Otherwise the value must
    /// convert into `T`; a missing value is a type mismatch too.
    pub fn complete(&self, value: Option<MessageContent>) -> Completion {
        let outcome = T::from_reply(value).map_err(RequestError::from);
        let mismatched = outcome.is_err();
        match (self.settle(outcome), mismatched) {
            (false, _) => Completion::AlreadyResolved,
            (true, false) => Completion::Completed,
            (true, true) => Completion::Mismatched,
        }
    }

    /// Fail with `cause`.
    pub fn fail(&self, cause: RequestError) -> bool {
        self.settle(Err(cause))
    }

    /// True once completed or failed.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.sender.lock().is_none()
    }

    fn settle(&self, outcome: Outcome<T>) -> bool {
        let Some(sender) = self.sender.lock().take() else {
            return false;
        };
        // A dropped receiver means the caller stopped waiting; the slot is
        // still resolved.
        let _ = sender.send(outcome);
        true
    }
}

impl<T: ReplyShape> PendingSlot for TypedFuture<T> {
    fn complete(&self, value: Option<MessageContent>) -> Completion {
        TypedFuture::complete(self, value)
    }

    fn fail(&self, cause: RequestError) -> bool {
        TypedFuture::fail(self, cause)
    }

    fn shape(&self) -> &'static str {
        T::SHAPE
    }
}

/// The caller's handle on an outstanding request.
///
/// Resolves to the reply value, or to the `RequestError` explaining why there
/// is none. Dropping it stops waiting but does not withdraw the registration.
#[must_use = "a pending reply does nothing unless awaited"]
pub struct PendingReply<T> {
    in_reply_to: InReplyTo,
    receiver: oneshot::Receiver<Outcome<T>>,
}

impl<T> PendingReply<T> {
    /// The correlation key the reply will carry.
    #[must_use]
    pub fn in_reply_to(&self) -> &InReplyTo {
        &self.in_reply_to
    }
}

impl<T> Future for PendingReply<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(RequestError::Abandoned)))
    }
}
