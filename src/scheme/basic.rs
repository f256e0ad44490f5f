use async_trait::async_trait;
use http::header::AUTHORIZATION;

use crate::sensitive::SetSensitiveHeader;
use crate::{AuthError, AuthHandler, AuthView, HandlerManifest, Request, UpdateLocation};

/// HTTP Basic authentication.
///
/// Missing `username` or `password` parameters are treated as empty strings.
pub struct Basic {
    manifest: HandlerManifest,
}

impl Basic {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("basic", "1.0.0")
                .update("Authorization", UpdateLocation::Header),
        }
    }
}

impl Default for Basic {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for Basic {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let value =
            ::http_auth::basic::encode_credentials(&auth.string("username"), &auth.string("password"));
        request.headers.set_sensitive_header(AUTHORIZATION, &value)
    }
}
