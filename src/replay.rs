//! Bounding of extra round trips for one logical request.
//!
//! Intermediate requests (credential fetches, challenge round trips) and replays of the logical
//! request itself all draw from the same budget. Once the budget is spent, further attempts fail
//! with [`AuthError::ReplayLimitExceeded`] without sending anything.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::engine::{Executor, SendKind, SendPayload};
use crate::{AuthError, Request, Response, TransportError};

/// Number of extra requests already issued for a logical request.
///
/// Clones share the same counter, so nested or sibling requests handed the same state also share
/// the cap.
#[derive(Debug, Clone, Default)]
pub struct ReplayState {
    count: Arc<AtomicU32>,
}

impl ReplayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

pub struct ReplayController<'a> {
    executor: &'a dyn Executor,
    state: ReplayState,
    max: u32,
    used: u32,
}

impl<'a> ReplayController<'a> {
    pub fn new(executor: &'a dyn Executor, state: ReplayState, max: u32) -> Self {
        Self {
            executor,
            state,
            max,
            used: 0,
        }
    }

    /// Extra requests issued through this controller.
    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn state(&self) -> &ReplayState {
        &self.state
    }

    /// Take one unit of the budget. Returns the new count.
    pub fn reserve(&mut self) -> Result<u32, AuthError> {
        let max = self.max;
        let previous = self
            .state
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < max).then_some(count + 1)
            })
            .map_err(|_| AuthError::ReplayLimitExceeded)?;
        self.used += 1;
        Ok(previous + 1)
    }

    /// Send a request without drawing from the budget.
    pub async fn dispatch(
        &self,
        request: Request,
        kind: SendKind,
    ) -> Result<Response, TransportError> {
        let payload = SendPayload {
            request,
            kind,
            attempt: self.state.count(),
        };
        self.executor.send(payload).await
    }

    /// Send an extra request.
    ///
    /// The outer error is only ever [`AuthError::ReplayLimitExceeded`], in which case nothing was
    /// sent. Transport failures of the request itself are handed back in the inner result for the
    /// handler to deal with.
    pub async fn request_replay(
        &mut self,
        request: Request,
        kind: SendKind,
    ) -> Result<Result<Response, TransportError>, AuthError> {
        let count = self.reserve()?;
        debug!(count, max = self.max, ?kind, url = %request.url, "sending extra request");
        Ok(self.dispatch(request, kind).await)
    }
}
