mod support;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use authflow::registry::HandlerRegistry;
use authflow::{
    AuthEngine, AuthError, AuthHandler, AuthView, EngineConfig, HandlerManifest, Phase,
    PreOutcome, Request, RequestAuth, Response, SendKind, TransportError, UpdateLocation,
};
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::StatusCode;
use support::ScriptedExecutor;

/// Asks for a credential fetch on every `pre`, never becoming ready.
struct AlwaysIntermediate {
    manifest: HandlerManifest,
    signs: AtomicUsize,
    posts: AtomicUsize,
}

impl AlwaysIntermediate {
    fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("always-intermediate", "1.0.0"),
            signs: AtomicUsize::new(0),
            posts: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl AuthHandler for AlwaysIntermediate {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn pre(&self, _auth: &mut AuthView) -> Result<PreOutcome, AuthError> {
        Ok(PreOutcome::Intermediate(
            Request::get("https://auth.example.com/token").unwrap(),
        ))
    }

    async fn post(&self, _auth: &mut AuthView, _response: &Response) -> Result<bool, AuthError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn sign(&self, _auth: &mut AuthView, _request: &mut Request) -> Result<(), AuthError> {
        self.signs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fetches a bearer token with an intermediate request before signing.
struct FetchToken {
    manifest: HandlerManifest,
    fetch_failed: AtomicBool,
}

impl FetchToken {
    fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("fetch-token", "1.0.0")
                .update("Authorization", UpdateLocation::Header)
                .update("token", UpdateLocation::Auth),
            fetch_failed: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl AuthHandler for FetchToken {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn init(
        &self,
        auth: &mut AuthView,
        response: Option<Result<&Response, &TransportError>>,
    ) -> Result<(), AuthError> {
        match response {
            Some(Ok(response)) => {
                let token = String::from_utf8_lossy(&response.body).into_owned();
                auth.set("token", token);
                Ok(())
            }
            Some(Err(error)) => {
                self.fetch_failed.store(true, Ordering::SeqCst);
                Err(AuthError::Other(format!("token fetch failed: {error}")))
            }
            None => Ok(()),
        }
    }

    async fn pre(&self, auth: &mut AuthView) -> Result<PreOutcome, AuthError> {
        if auth.non_empty("token").is_some() {
            return Ok(PreOutcome::Ready);
        }
        Ok(PreOutcome::Intermediate(
            Request::get("https://auth.example.com/token").unwrap(),
        ))
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let value = format!("Bearer {}", auth.require("token")?);
        request.headers.insert(AUTHORIZATION, value.parse().unwrap());
        Ok(())
    }
}

/// Never satisfied with a response.
struct AlwaysRetry {
    manifest: HandlerManifest,
}

#[async_trait::async_trait]
impl AuthHandler for AlwaysRetry {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn post(&self, _auth: &mut AuthView, _response: &Response) -> Result<bool, AuthError> {
        Ok(false)
    }

    async fn sign(&self, _auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        request.headers.insert("x-signed", "yes".parse().unwrap());
        Ok(())
    }
}

/// Panics while signing.
struct Panicking {
    manifest: HandlerManifest,
}

#[async_trait::async_trait]
impl AuthHandler for Panicking {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn sign(&self, _auth: &mut AuthView, _request: &mut Request) -> Result<(), AuthError> {
        panic!("signing key exploded");
    }
}

fn registry_with(name: &str, handler: Arc<dyn AuthHandler>) -> Arc<HandlerRegistry> {
    let registry = HandlerRegistry::new();
    registry.add_handler(handler, name).unwrap();
    Arc::new(registry)
}

#[tokio::test]
async fn test_intermediate_requests_are_capped() {
    let handler = Arc::new(AlwaysIntermediate::new());
    let engine = AuthEngine::new(ScriptedExecutor::default())
        .with_registry(registry_with("always-intermediate", handler.clone()));

    let mut auth = RequestAuth::new("always-intermediate");
    let request = Request::get("https://api.example.com/").unwrap();
    let result = engine.execute(request, Some(&mut auth)).await;

    assert!(matches!(result, Err(AuthError::ReplayLimitExceeded)));
    assert_eq!(
        engine.executor().kinds(),
        [SendKind::Intermediate, SendKind::Intermediate, SendKind::Intermediate]
    );
    assert_eq!(handler.signs.load(Ordering::SeqCst), 0);
    assert_eq!(handler.posts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_configured_cap() {
    let handler = Arc::new(AlwaysIntermediate::new());
    let engine = AuthEngine::new(ScriptedExecutor::default())
        .with_registry(registry_with("always-intermediate", handler))
        .with_config(EngineConfig::default().with_max_replay_count(1));

    let mut auth = RequestAuth::new("always-intermediate");
    let request = Request::get("https://api.example.com/").unwrap();
    let result = engine.execute(request, Some(&mut auth)).await;

    assert!(matches!(result, Err(AuthError::ReplayLimitExceeded)));
    assert_eq!(engine.executor().sent().len(), 1);
}

#[tokio::test]
async fn test_replay_cap_returns_last_response() {
    let handler = Arc::new(AlwaysRetry {
        manifest: HandlerManifest::new("always-retry", "1.0.0")
            .update("x-signed", UpdateLocation::Header),
    });
    let executor = ScriptedExecutor::new((0..4).map(|_| Response::new(StatusCode::UNAUTHORIZED)));
    let engine =
        AuthEngine::new(executor).with_registry(registry_with("always-retry", handler));

    let mut auth = RequestAuth::new("always-retry");
    let request = Request::get("https://api.example.com/").unwrap();
    let exchange = engine.execute(request, Some(&mut auth)).await.unwrap();

    assert_eq!(exchange.response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(exchange.round_trips, 3);
    assert!(matches!(
        exchange.diagnostics.as_slice(),
        [AuthError::ReplayLimitExceeded]
    ));
    assert_eq!(
        engine.executor().kinds(),
        [SendKind::Original, SendKind::Replay, SendKind::Replay, SendKind::Replay]
    );
    assert_eq!(exchange.request.header_str("x-signed"), Some("yes"));
}

#[tokio::test]
async fn test_unknown_scheme_sends_unsigned() {
    let engine = AuthEngine::new(ScriptedExecutor::default())
        .with_registry(Arc::new(HandlerRegistry::with_builtins()));

    let mut auth = RequestAuth::new("kerberos").with_param("token", "t");
    let request = Request::get("https://api.example.com/").unwrap();
    let exchange = engine.execute(request, Some(&mut auth)).await.unwrap();

    assert_eq!(exchange.response.status, StatusCode::OK);
    assert!(exchange.request.headers.is_empty());
    assert!(matches!(
        exchange.diagnostics.as_slice(),
        [AuthError::UnknownScheme(name)] if name == "kerberos"
    ));
}

#[tokio::test]
async fn test_no_auth_block_sends_request_as_is() {
    let engine = AuthEngine::new(ScriptedExecutor::default());
    let request = Request::get("https://api.example.com/").unwrap();
    let exchange = engine.execute(request, None).await.unwrap();

    assert_eq!(exchange.round_trips, 0);
    assert!(exchange.diagnostics.is_empty());
    assert_eq!(engine.executor().kinds(), [SendKind::Original]);
}

#[tokio::test]
async fn test_handler_panic_is_contained() {
    let handler = Arc::new(Panicking {
        manifest: HandlerManifest::new("panicking", "1.0.0"),
    });
    let engine = AuthEngine::new(ScriptedExecutor::default())
        .with_registry(registry_with("panicking", handler));

    let mut auth = RequestAuth::new("panicking");
    let request = Request::get("https://api.example.com/").unwrap();
    let exchange = engine.execute(request, Some(&mut auth)).await.unwrap();

    assert_eq!(exchange.response.status, StatusCode::OK);
    assert!(matches!(
        exchange.diagnostics.as_slice(),
        [AuthError::HandlerPanicked { phase: Phase::Signing, message }]
            if message == "signing key exploded"
    ));
}

#[tokio::test]
async fn test_transport_error_fails_request() {
    let engine = AuthEngine::new(ScriptedExecutor::failing("connection refused"))
        .with_registry(Arc::new(HandlerRegistry::with_builtins()));

    let mut auth = RequestAuth::new("bearer").with_param("token", "abc");
    let request = Request::get("https://api.example.com/").unwrap();
    let result = engine.execute(request, Some(&mut auth)).await;

    assert!(matches!(result, Err(AuthError::Transport(_))));
}

#[tokio::test]
async fn test_unsupported_sign_sends_unsigned() {
    let engine = AuthEngine::new(ScriptedExecutor::default())
        .with_registry(Arc::new(HandlerRegistry::with_builtins()));

    let mut auth = RequestAuth::new("digest")
        .with_param("username", "postman")
        .with_param("password", "password")
        .with_param("realm", "Users")
        .with_param("nonce", "ni1LiL0O37PRRhofWdCLmwFsnEtH1lew")
        .with_param("qop", "auth-int");
    let request = Request::get("https://postman-echo.com/digest-auth").unwrap();
    let exchange = engine.execute(request, Some(&mut auth)).await.unwrap();

    assert!(exchange.request.headers.get(AUTHORIZATION).is_none());
    assert!(exchange.diagnostics[0].is_unsupported());
}

#[tokio::test]
async fn test_shared_replay_state() {
    let handler = Arc::new(AlwaysRetry {
        manifest: HandlerManifest::new("always-retry", "1.0.0"),
    });
    let engine = AuthEngine::new(ScriptedExecutor::default())
        .with_registry(registry_with("always-retry", handler));
    let state = authflow::ReplayState::new();

    let mut auth = RequestAuth::new("always-retry");
    let request = Request::get("https://api.example.com/").unwrap();
    let first = engine
        .execute_with_state(request.clone(), Some(&mut auth), state.clone())
        .await
        .unwrap();
    assert_eq!(first.round_trips, 3);

    let mut auth = RequestAuth::new("always-retry");
    let second = engine
        .execute_with_state(request, Some(&mut auth), state.clone())
        .await
        .unwrap();
    assert_eq!(second.round_trips, 0);
    assert_eq!(state.count(), 3);
}

#[tokio::test]
async fn test_registry_hot_swap() {
    let registry = Arc::new(HandlerRegistry::new());
    let engine = AuthEngine::new(ScriptedExecutor::default()).with_registry(registry.clone());
    let request = Request::get("https://api.example.com/").unwrap();

    let mut auth = RequestAuth::new("custom").with_param("token", "abc");
    let exchange = engine
        .execute(request.clone(), Some(&mut auth))
        .await
        .unwrap();
    assert!(matches!(
        exchange.diagnostics.as_slice(),
        [AuthError::UnknownScheme(_)]
    ));

    registry
        .add_handler(Arc::new(authflow::scheme::Bearer::new()), "custom")
        .unwrap();
    let exchange = engine.execute(request.clone(), Some(&mut auth)).await.unwrap();
    assert_eq!(exchange.request.header_str(AUTHORIZATION), Some("Bearer abc"));

    registry.remove_handler("custom");
    let exchange = engine.execute(request, Some(&mut auth)).await.unwrap();
    assert!(exchange.request.headers.get(AUTHORIZATION).is_none());
}

#[tokio::test]
async fn test_intermediate_credential_then_signed_send() {
    let mut token = Response::new(StatusCode::OK);
    token.body = Bytes::from_static(b"fetched");
    let engine = AuthEngine::new(ScriptedExecutor::new([token, Response::new(StatusCode::OK)]))
        .with_registry(registry_with("fetch-token", Arc::new(FetchToken::new())));

    let mut auth = RequestAuth::new("fetch-token");
    let request = Request::get("https://api.example.com/").unwrap();
    let exchange = engine.execute(request, Some(&mut auth)).await.unwrap();

    assert_eq!(
        engine.executor().kinds(),
        [SendKind::Intermediate, SendKind::Original]
    );
    assert_eq!(exchange.request.header_str(AUTHORIZATION), Some("Bearer fetched"));
    assert_eq!(exchange.round_trips, 1);
    assert!(exchange.diagnostics.is_empty());
    assert_eq!(auth.view.string("token"), "fetched");

    let sent = engine.executor().sent();
    assert_eq!(sent[0].1.url.as_str(), "https://auth.example.com/token");
    assert!(sent[0].1.headers.get(AUTHORIZATION).is_none());
}

#[tokio::test]
async fn test_intermediate_transport_error_reaches_init() {
    let handler = Arc::new(FetchToken::new());
    let engine = AuthEngine::new(ScriptedExecutor::failing("connection reset"))
        .with_registry(registry_with("fetch-token", handler.clone()));

    let mut auth = RequestAuth::new("fetch-token");
    let request = Request::get("https://api.example.com/").unwrap();
    let exchange = engine.execute(request, Some(&mut auth)).await.unwrap();

    assert!(handler.fetch_failed.load(Ordering::SeqCst));
    assert_eq!(
        engine.executor().kinds(),
        [SendKind::Intermediate, SendKind::Original]
    );
    assert_eq!(exchange.response.status, StatusCode::OK);
    assert!(exchange.request.headers.get(AUTHORIZATION).is_none());
    assert_eq!(exchange.round_trips, 1);
    assert!(matches!(
        exchange.diagnostics.as_slice(),
        [AuthError::Other(message)] if message.contains("connection reset")
    ));
}
