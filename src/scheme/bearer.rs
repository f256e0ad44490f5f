use async_trait::async_trait;
use http::header::AUTHORIZATION;

use crate::sensitive::SetSensitiveHeader;
use crate::{AuthError, AuthHandler, AuthView, HandlerManifest, Request, UpdateLocation};

/// Bearer token in the `Authorization` header. An empty `token` leaves the request untouched.
pub struct Bearer {
    manifest: HandlerManifest,
}

impl Bearer {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("bearer", "1.0.0")
                .update("Authorization", UpdateLocation::Header),
        }
    }
}

impl Default for Bearer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for Bearer {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        match auth.non_empty("token") {
            Some(token) => request
                .headers
                .set_sensitive_header(AUTHORIZATION, &format!("Bearer {}", token.trim())),
            None => Ok(()),
        }
    }
}
