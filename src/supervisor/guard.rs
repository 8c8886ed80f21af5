//! Response guard serializing access to the response sink.
//!
//! # Design Decisions
//! - One async mutex per call guards the sink and the `finalized` flag together
//! - Every operation that touches the sink lives on the held lock, so an
//!   unguarded write does not type-check
//! - Release is the drop of [`Finalizer`], which also runs while unwinding

use axum::{body::Bytes, http::StatusCode};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::ContextError;
use crate::http::response::{ResponseSink, FAILURE_BODY};

/// Result of a `write_result` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// This call performed the finalizing write.
    Written,
    /// The response was already finalized; nothing was written.
    Suppressed,
}

struct ResponseSlot {
    sink: Box<dyn ResponseSink>,
    finalized: bool,
    timed_out: bool,
}

/// Mutual exclusion around the outbound response of one call.
pub struct ResponseGuard {
    slot: Mutex<ResponseSlot>,
}

impl ResponseGuard {
    pub fn new(sink: impl ResponseSink) -> Self {
        Self {
            slot: Mutex::new(ResponseSlot {
                sink: Box::new(sink),
                finalized: false,
                timed_out: false,
            }),
        }
    }

    /// Wait for exclusive ownership of the response.
    ///
    /// Handlers go through [`RequestContext::json`], which never holds the
    /// guard across an await point.
    ///
    /// [`RequestContext::json`]: crate::supervisor::RequestContext::json
    pub(crate) async fn acquire(&self) -> Finalizer<'_> {
        Finalizer {
            slot: self.slot.lock().await,
        }
    }

    /// Best-effort read of the finalized flag without waiting.
    ///
    /// Returns `None` while another path holds the guard.
    pub fn peek_finalized(&self) -> Option<bool> {
        self.slot.try_lock().ok().map(|slot| slot.finalized)
    }
}

impl std::fmt::Debug for ResponseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseGuard")
            .field("finalized", &self.peek_finalized())
            .finish()
    }
}

/// Exclusive access to the response, held for the duration of a write.
pub(crate) struct Finalizer<'a> {
    slot: MutexGuard<'a, ResponseSlot>,
}

impl Finalizer<'_> {
    pub fn is_finalized(&self) -> bool {
        self.slot.finalized
    }

    /// Set the finalized flag. Returns `false` if it was already set.
    pub fn mark_finalized(&mut self) -> bool {
        !std::mem::replace(&mut self.slot.finalized, true)
    }

    /// Record that the deadline won the race. One-way.
    pub fn mark_timed_out(&mut self) {
        self.slot.timed_out = true;
    }

    pub fn has_timed_out(&self) -> bool {
        self.slot.timed_out
    }

    /// Serialize `payload` and write it with `status`, unless the response
    /// is already finalized.
    ///
    /// A payload that fails to serialize is replaced with the generic
    /// failure payload at status 500; the response is still finalized.
    pub fn write_result<T: Serialize + ?Sized>(
        &mut self,
        status: StatusCode,
        payload: &T,
    ) -> Result<Finalization, ContextError> {
        if self.is_finalized() {
            return Ok(Finalization::Suppressed);
        }

        match serde_json::to_vec(payload) {
            Ok(body) => {
                self.mark_finalized();
                self.slot.sink.write(status, Bytes::from(body))?;
                Ok(Finalization::Written)
            }
            Err(e) => {
                self.mark_finalized();
                let fallback = serde_json::to_vec(&FAILURE_BODY)?;
                self.slot
                    .sink
                    .write(StatusCode::INTERNAL_SERVER_ERROR, Bytes::from(fallback))?;
                Err(ContextError::Serialize(e))
            }
        }
    }

    /// Relinquish the guard.
    pub fn release(self) {}
}
