#![cfg(feature = "reqwest")]

use ::reqwest::Client;
use authflow::reqwest::ReqwestExecutor;
use authflow::{AuthEngine, Request, RequestAuth};
use http::StatusCode;

/// Basic authentication, passing the username and password on the first request.
#[::tokio::test]
async fn test_basic_authentication(
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let engine = AuthEngine::new(ReqwestExecutor::new(Client::new()));

    let mut auth = RequestAuth::new("basic")
        .with_param("username", "username")
        .with_param("password", "password");
    let request = Request::get("https://httpbin.org/basic-auth/username/password")?;

    let exchange = engine.execute(request, Some(&mut auth)).await?;

    dbg!(&exchange);

    assert_eq!(exchange.response.status, StatusCode::OK);
    assert_eq!(exchange.round_trips, 0);

    Ok(())
}

/// Digest authentication, answering the 401 challenge with a replay.
#[::tokio::test]
async fn test_digest_challenge() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>
{
    let engine = AuthEngine::new(ReqwestExecutor::new(Client::new()));

    let mut auth = RequestAuth::new("digest")
        .with_param("username", "username")
        .with_param("password", "password");
    let request = Request::get("https://httpbin.org/digest-auth/auth/username/password")?;

    let exchange = engine.execute(request, Some(&mut auth)).await?;

    dbg!(&exchange);

    assert_eq!(exchange.response.status, StatusCode::OK);
    assert_eq!(exchange.round_trips, 1);

    Ok(())
}
