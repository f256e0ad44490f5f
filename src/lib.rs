//! # authflow
//!
//! Authorize HTTP requests declared by a collection.
//!
//! Authentication schemes differ wildly in how they work. Some only add a header. Some need an
//! intermediate request to fetch a credential before the real request can be signed. Some expect
//! the first attempt to fail with a challenge, and only succeed when the request is replayed with
//! a response to that challenge.
//!
//! `authflow` gives every scheme the same lifecycle, described by the [`AuthHandler`] trait:
//!
//! - `pre` checks that the scheme has what it needs. It can ask for an intermediate request.
//! - `init` receives the response of that intermediate request.
//! - `sign` adds the credentials to the outgoing request.
//! - `post` inspects the response and can ask for the request to be replayed.
//!
//! The [`engine::AuthEngine`] drives a handler through this lifecycle for one logical request. All
//! extra round trips (intermediate requests and replays) are counted by a
//! [`replay::ReplayController`] against a single cap, so a misbehaving server or handler can never
//! cause an unbounded retry loop.
//!
//! ```ignore
//! let engine = AuthEngine::new(ReqwestExecutor::new(reqwest::Client::new()));
//!
//! let mut auth = RequestAuth::new("digest")
//!     .with_param("username", "postman")
//!     .with_param("password", "password");
//!
//! let request = Request::get("https://postman-echo.com/digest-auth")?;
//! let exchange = engine.execute(request, Some(&mut auth)).await?;
//!
//! // The first attempt returned a 401 challenge, the replay was signed.
//! assert_eq!(exchange.round_trips, 1);
//! assert_eq!(exchange.response.status, StatusCode::OK);
//! ```
//!
//! Handlers are looked up by name in a [`registry::HandlerRegistry`]. The built-in schemes are
//! registered in [`registry::global()`], and further handlers can be added or removed at runtime.

use thiserror::Error;

pub mod canonical;
pub mod config;
pub mod engine;
pub mod manifest;
pub mod params;
pub mod primitives;
pub mod registry;
pub mod replay;
pub mod request;
pub mod scheme;
pub mod sensitive;

#[cfg(feature = "reqwest")]
pub mod reqwest;

pub use config::EngineConfig;
pub use engine::{AuthEngine, Exchange, Executor, Phase, SendKind, SendPayload};
pub use manifest::{HandlerManifest, UpdateLocation};
pub use params::{AuthParameters, AuthView, RequestAuth};
pub use registry::HandlerRegistry;
pub use replay::{ReplayController, ReplayState};
pub use request::{Body, Request, Response};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("maximum intermediate request limit exceeded")]
    ReplayLimitExceeded,
    #[error("Missing auth parameter {0:?}")]
    MissingParameter(&'static str),
    #[error("Invalid auth parameter {name:?}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("{0}")]
    Unsupported(String),
    #[error("Invalid challenge: {0}")]
    InvalidChallenge(String),
    #[error("No handler registered for auth type {0:?}")]
    UnknownScheme(String),
    #[error("Handler panicked while {phase}: {message}")]
    HandlerPanicked { phase: Phase, message: String },
    #[error("Invalid header value")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("Invalid header name")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("Signing key error")]
    Key(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// Errors that point at a configuration the user must fix, rather than a transient failure.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, AuthError::Unsupported(_))
    }
}

/// Failure reported by an [`Executor`] while sending a request.
#[derive(Error, Debug)]
#[error("Transport error: {0}")]
pub struct TransportError(#[source] Box<dyn std::error::Error + Send + Sync + 'static>);

impl TransportError {
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self(error.into())
    }
}

/// Result of the `pre` phase.
#[derive(Debug)]
pub enum PreOutcome {
    /// The scheme has everything it needs. Sign the request.
    Ready,
    /// Send the request as-is, without signing.
    Skip,
    /// Send this request first, feed its response to `init`, then call `pre` again.
    Intermediate(Request),
}

/// Lifecycle contract implemented by every authentication scheme.
///
/// A handler is shared by all logical requests using its scheme, so it must not keep per-request
/// state on `self`. Anything that has to survive between phases of one logical request (nonce
/// counters, handshake progress) belongs in the [`AuthView`], either as a parameter or as a typed
/// value in [`AuthView::extensions_mut`].
#[async_trait::async_trait]
pub trait AuthHandler: Send + Sync {
    /// Static description of what the handler may write to a request.
    fn manifest(&self) -> &HandlerManifest;

    /// Whether the scheme needs live round trips (challenges, intermediate fetches) to complete.
    ///
    /// This only describes the handler. The engine drives every scheme through the same phases
    /// with the same replay budget, and records this flag on its trace events.
    fn interactive(&self) -> bool {
        false
    }

    /// Receive the outcome of an intermediate request, or `None` if none was sent.
    async fn init(
        &self,
        _auth: &mut AuthView,
        _response: Option<Result<&Response, &TransportError>>,
    ) -> Result<(), AuthError> {
        Ok(())
    }

    /// Check that the scheme can sign the request.
    async fn pre(&self, _auth: &mut AuthView) -> Result<PreOutcome, AuthError> {
        Ok(PreOutcome::Ready)
    }

    /// Inspect the response. Returning `Ok(false)` asks for the request to be replayed.
    async fn post(&self, _auth: &mut AuthView, _response: &Response) -> Result<bool, AuthError> {
        Ok(true)
    }

    /// Add credentials to the request.
    ///
    /// Signing may happen more than once for one logical request, so implementations remove
    /// anything they previously added before adding it again.
    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError>;
}
