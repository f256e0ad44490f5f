use std::sync::Arc;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use tracing::{debug, warn};

use crate::sensitive::SetSensitiveHeader;
use crate::{AuthError, AuthHandler, AuthView, HandlerManifest, PreOutcome, Request, UpdateLocation};

const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Source of fresh access tokens, consulted before every signing.
///
/// Returning `Ok(None)` keeps the current token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, auth: &AuthView) -> Result<Option<String>, AuthError>;
}

/// OAuth 2.0 bearer access tokens.
///
/// The token goes in the `Authorization` header with `headerPrefix` (default `Bearer`), or in the
/// `access_token` query parameter when `addTokenTo` is `queryParams`.
pub struct OAuth2 {
    manifest: HandlerManifest,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl OAuth2 {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("oauth2", "1.0.0")
                .update("Authorization", UpdateLocation::Header)
                .update(ACCESS_TOKEN_PARAM, UpdateLocation::UrlParam),
            refresher: None,
        }
    }

    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }
}

impl Default for OAuth2 {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for OAuth2 {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn pre(&self, auth: &mut AuthView) -> Result<PreOutcome, AuthError> {
        if let Some(refresher) = &self.refresher {
            if let Some(token) = refresher.refresh(auth).await? {
                debug!("refreshed OAuth 2.0 access token");
                auth.set("accessToken", token);
            }
        }
        Ok(PreOutcome::Ready)
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let Some(token) = auth.non_empty("accessToken") else {
            return Ok(());
        };
        if auth.string("tokenType").eq_ignore_ascii_case("mac") {
            warn!("OAuth 2.0 MAC tokens are not supported, request left unsigned");
            return Ok(());
        }

        request.retain_query_params(|key| key != ACCESS_TOKEN_PARAM);
        match auth.non_empty("addTokenTo").as_deref() {
            Some("queryParams") => {
                request.append_query_param(ACCESS_TOKEN_PARAM, &token);
                Ok(())
            }
            None | Some("header") => {
                let prefix = auth
                    .get_str("headerPrefix")
                    .map_or_else(|| "Bearer".to_owned(), |prefix| prefix.trim().to_owned());
                let value = if prefix.is_empty() {
                    token
                } else {
                    format!("{prefix} {token}")
                };
                request.headers.set_sensitive_header(AUTHORIZATION, &value)
            }
            Some(other) => Err(AuthError::InvalidParameter {
                name: "addTokenTo",
                reason: format!("unknown location {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl TokenRefresher for Fixed {
        async fn refresh(&self, _auth: &AuthView) -> Result<Option<String>, AuthError> {
            Ok(Some(self.0.to_owned()))
        }
    }

    #[tokio::test]
    async fn test_header_prefix() {
        let mut auth = AuthView::new(
            [("accessToken", "abc"), ("headerPrefix", " Token ")]
                .into_iter()
                .collect(),
        );
        let mut request = Request::get("https://example.com/").unwrap();
        OAuth2::new().sign(&mut auth, &mut request).await.unwrap();
        assert_eq!(request.header_str(AUTHORIZATION), Some("Token abc"));
    }

    #[tokio::test]
    async fn test_query_token_replaced() {
        let mut auth = AuthView::new(
            [("accessToken", "abc"), ("addTokenTo", "queryParams")]
                .into_iter()
                .collect(),
        );
        let mut request = Request::get("https://example.com/?access_token=old").unwrap();
        let handler = OAuth2::new();
        handler.sign(&mut auth, &mut request).await.unwrap();
        handler.sign(&mut auth, &mut request).await.unwrap();
        assert_eq!(request.url.query(), Some("access_token=abc"));
        assert!(request.headers.is_empty());
    }

    #[tokio::test]
    async fn test_header_mode_leaves_query_untouched() {
        let mut auth = AuthView::new([("accessToken", "abc")].into_iter().collect());
        let mut request = Request::get("https://example.com/search?flag&q=a%20b&path=%2Fx").unwrap();
        OAuth2::new().sign(&mut auth, &mut request).await.unwrap();
        assert_eq!(
            request.url.as_str(),
            "https://example.com/search?flag&q=a%20b&path=%2Fx"
        );
        assert_eq!(request.header_str(AUTHORIZATION), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_mac_tokens_unsigned() {
        let mut auth = AuthView::new(
            [("accessToken", "abc"), ("tokenType", "mac")]
                .into_iter()
                .collect(),
        );
        let mut request = Request::get("https://example.com/").unwrap();
        OAuth2::new().sign(&mut auth, &mut request).await.unwrap();
        assert!(request.headers.is_empty());
    }

    #[tokio::test]
    async fn test_refresher_fills_missing_token_only() {
        let handler = OAuth2::new().with_refresher(Arc::new(Fixed("fresh")));

        let mut auth = AuthView::default();
        handler.pre(&mut auth).await.unwrap();
        assert_eq!(auth.string("accessToken"), "fresh");

        let mut auth = AuthView::new([("accessToken", json!("user"))].into_iter().collect());
        handler.pre(&mut auth).await.unwrap();
        assert_eq!(auth.string("accessToken"), "user");
    }
}
