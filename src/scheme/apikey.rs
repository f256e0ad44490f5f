use async_trait::async_trait;
use http::header::HeaderName;

use crate::sensitive::SetSensitiveHeader;
use crate::{AuthError, AuthHandler, AuthView, HandlerManifest, Request, UpdateLocation};

/// A static key sent as a header (`in` = `header`, the default) or a query parameter
/// (`in` = `query`).
pub struct ApiKey {
    manifest: HandlerManifest,
}

impl ApiKey {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("apikey", "1.0.0")
                .update("*", UpdateLocation::Header)
                .update("*", UpdateLocation::UrlParam),
        }
    }
}

impl Default for ApiKey {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for ApiKey {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let Some(key) = auth.non_empty("key") else {
            return Ok(());
        };
        let value = auth.string("value");

        match auth.non_empty("in").as_deref() {
            None | Some("header") => {
                let name = HeaderName::try_from(key.as_str())?;
                request.headers.set_sensitive_header(name, &value)
            }
            Some("query") => {
                request.retain_query_params(|name| name != key);
                request.append_query_param(&key, &value);
                Ok(())
            }
            Some(other) => Err(AuthError::InvalidParameter {
                name: "in",
                reason: format!("unknown location {other:?}"),
            }),
        }
    }
}
