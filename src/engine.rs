//! Control flow for one logical request.
//!
//! The engine moves a handler through an explicit state machine:
//!
//! ```text
//! Validating ──ready──▶ Signing ──▶ Sent ──▶ Verifying ──success──▶ Done
//!   │  ▲   └──skip──────────────────▲                 │
//!   │  └── init ◀── intermediate    │                 └──retry──▶ Replaying ──▶ Validating
//! ```
//!
//! Every transition is awaited in sequence, so no two phases of one logical request overlap.
//! Handler failures in `pre`, `post`, `sign` and `init` (including panics) are logged and
//! degrade the request instead of failing it. Only the replay cap on intermediate requests and
//! transport failures of the logical request itself end it with an error.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, warn, Instrument};

use crate::params::RequestAuth;
use crate::registry::{self, HandlerRegistry, RegisteredHandler};
use crate::replay::{ReplayController, ReplayState};
use crate::{AuthError, AuthView, EngineConfig, PreOutcome, Request, Response, TransportError};

/// Sends one concrete HTTP request.
///
/// Implementations must return the response to exactly the request they were given, since that
/// response is what the handler verifies against its own signature.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn send(&self, payload: SendPayload) -> Result<Response, TransportError>;
}

/// Why a request is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    /// First send of the logical request.
    Original,
    /// Auxiliary request asked for by a handler's `pre`.
    Intermediate,
    /// The logical request again, after `post` asked for a retry.
    Replay,
}

#[derive(Debug)]
pub struct SendPayload {
    pub request: Request,
    pub kind: SendKind,
    /// Extra requests already issued for the logical request when this one was sent.
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validating,
    Signing,
    Sent,
    Verifying,
    Replaying,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Validating => "validating",
            Phase::Signing => "signing",
            Phase::Sent => "sent",
            Phase::Verifying => "verifying",
            Phase::Replaying => "replaying",
            Phase::Done => "done",
        })
    }
}

/// Outcome of a logical request.
#[derive(Debug)]
pub struct Exchange {
    /// The request as last sent, including any credentials added by the handler.
    pub request: Request,
    /// Response to `request`. Responses to intermediate requests are never surfaced here.
    pub response: Response,
    /// Extra round trips (intermediate requests and replays) used.
    pub round_trips: u32,
    /// Errors recovered from along the way.
    pub diagnostics: Vec<AuthError>,
}

enum State {
    Validating { kind: SendKind },
    Signing { kind: SendKind },
    Sent { request: Request, kind: SendKind },
    Verifying { request: Request, response: Response },
    Replaying { request: Request, response: Response },
    Done { request: Request, response: Response },
}

impl State {
    fn phase(&self) -> Phase {
        match self {
            State::Validating { .. } => Phase::Validating,
            State::Signing { .. } => Phase::Signing,
            State::Sent { .. } => Phase::Sent,
            State::Verifying { .. } => Phase::Verifying,
            State::Replaying { .. } => Phase::Replaying,
            State::Done { .. } => Phase::Done,
        }
    }
}

pub struct AuthEngine<E> {
    executor: E,
    registry: Arc<HandlerRegistry>,
    config: EngineConfig,
}

impl<E: Executor> AuthEngine<E> {
    /// An engine using the global handler registry and default configuration.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            registry: registry::global(),
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one logical request with a fresh replay budget.
    pub async fn execute(
        &self,
        request: Request,
        auth: Option<&mut RequestAuth>,
    ) -> Result<Exchange, AuthError> {
        self.execute_with_state(request, auth, ReplayState::new())
            .await
    }

    /// Run one logical request drawing from an existing replay budget.
    pub async fn execute_with_state(
        &self,
        request: Request,
        auth: Option<&mut RequestAuth>,
        state: ReplayState,
    ) -> Result<Exchange, AuthError> {
        let mut controller =
            ReplayController::new(&self.executor, state, self.config.max_replay_count);

        let Some(auth) = auth else {
            return send_unauthorized(request, &controller, Vec::new()).await;
        };
        let Some(handler) = self.registry.get_handler(&auth.auth_type) else {
            if self.config.warn_on_unknown_scheme {
                warn!(auth_type = %auth.auth_type, "no handler registered, sending unsigned");
            }
            let diagnostics = vec![AuthError::UnknownScheme(auth.auth_type.clone())];
            return send_unauthorized(request, &controller, diagnostics).await;
        };

        let span = tracing::debug_span!("auth", scheme = %handler.name());
        drive(&handler, &mut auth.view, request, &mut controller)
            .instrument(span)
            .await
    }
}

async fn send_unauthorized(
    request: Request,
    controller: &ReplayController<'_>,
    diagnostics: Vec<AuthError>,
) -> Result<Exchange, AuthError> {
    let response = controller
        .dispatch(request.clone(), SendKind::Original)
        .await?;
    Ok(Exchange {
        request,
        response,
        round_trips: 0,
        diagnostics,
    })
}

async fn drive(
    registered: &RegisteredHandler,
    auth: &mut AuthView,
    request: Request,
    controller: &mut ReplayController<'_>,
) -> Result<Exchange, AuthError> {
    let handler = registered.handler();
    let mut diagnostics = Vec::new();
    debug!(interactive = handler.interactive(), "starting logical request");

    let mut state = State::Validating {
        kind: SendKind::Original,
    };
    loop {
        debug!(phase = %state.phase(), "auth transition");
        state = match state {
            State::Validating { kind } => match guard(Phase::Validating, handler.pre(auth)).await {
                Ok(PreOutcome::Ready) => State::Signing { kind },
                Ok(PreOutcome::Skip) => State::Sent {
                    request: request.clone(),
                    kind,
                },
                Ok(PreOutcome::Intermediate(intermediate)) => {
                    // Running out of budget here fails the logical request.
                    let result = controller
                        .request_replay(intermediate, SendKind::Intermediate)
                        .await?;
                    if let Err(error) = &result {
                        warn!(%error, "intermediate request failed");
                    }
                    match guard(Phase::Validating, handler.init(auth, Some(result.as_ref()))).await
                    {
                        Ok(()) => State::Validating { kind },
                        Err(error) => {
                            warn!(%error, "init failed, sending unsigned");
                            diagnostics.push(error);
                            State::Sent {
                                request: request.clone(),
                                kind,
                            }
                        }
                    }
                }
                Err(error) => {
                    warn!(%error, "pre failed, sending unsigned");
                    diagnostics.push(error);
                    State::Sent {
                        request: request.clone(),
                        kind,
                    }
                }
            },
            State::Signing { kind } => {
                let mut signed = request.clone();
                let mut scratch = auth.clone();
                match guard(Phase::Signing, handler.sign(&mut scratch, &mut signed)).await {
                    Ok(()) => {
                        auth.absorb(scratch);
                        State::Sent {
                            request: signed,
                            kind,
                        }
                    }
                    Err(error) => {
                        if error.is_unsupported() {
                            error!(%error, "scheme cannot sign this request, sending unsigned");
                        } else {
                            warn!(%error, "signing failed, sending unsigned");
                        }
                        diagnostics.push(error);
                        State::Sent {
                            request: request.clone(),
                            kind,
                        }
                    }
                }
            }
            State::Sent {
                request: outgoing,
                kind,
            } => {
                let response = controller.dispatch(outgoing.clone(), kind).await?;
                debug!(status = %response.status, ?kind, "response received");
                State::Verifying {
                    request: outgoing,
                    response,
                }
            }
            State::Verifying {
                request: sent,
                response,
            } => match guard(Phase::Verifying, handler.post(auth, &response)).await {
                Ok(true) => State::Done {
                    request: sent,
                    response,
                },
                Ok(false) => State::Replaying {
                    request: sent,
                    response,
                },
                Err(error) => {
                    warn!(%error, "post failed, not retrying");
                    diagnostics.push(error);
                    State::Done {
                        request: sent,
                        response,
                    }
                }
            },
            State::Replaying {
                request: sent,
                response,
            } => match controller.reserve() {
                Ok(count) => {
                    debug!(count, "replaying request");
                    State::Validating {
                        kind: SendKind::Replay,
                    }
                }
                Err(error) => {
                    warn!(%error, "not replaying request");
                    diagnostics.push(error);
                    State::Done {
                        request: sent,
                        response,
                    }
                }
            },
            State::Done {
                request: sent,
                response,
            } => {
                return Ok(Exchange {
                    request: sent,
                    response,
                    round_trips: controller.used(),
                    diagnostics,
                })
            }
        };
    }
}

/// Await a handler phase, turning a panic into an error.
async fn guard<T>(
    phase: Phase,
    future: impl Future<Output = Result<T, AuthError>>,
) -> Result<T, AuthError> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(AuthError::HandlerPanicked {
            phase,
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
