use async_trait::async_trait;

use crate::{AuthError, AuthHandler, AuthView, HandlerManifest, Request};

/// Explicitly unauthenticated requests.
pub struct NoAuth {
    manifest: HandlerManifest,
}

impl NoAuth {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("noauth", "1.0.0"),
        }
    }
}

impl Default for NoAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for NoAuth {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn sign(&self, _auth: &mut AuthView, _request: &mut Request) -> Result<(), AuthError> {
        Ok(())
    }
}
