//! NTLM authentication, driven entirely by `post`.
//!
//! The handshake is three round trips on one logical request: an unsigned attempt that draws a
//! challenge, a Type 1 message, and a Type 3 message answering the server's Type 2. Progress is
//! kept in the request's [`AuthView`] extensions, so concurrent requests never see each other's
//! handshakes.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use rand::Rng;
use tracing::debug;

use crate::sensitive::SetSensitiveHeader;
use crate::{AuthError, AuthHandler, AuthView, HandlerManifest, Request, Response, UpdateLocation};

mod message;

use message::{authenticate_message, filetime_now, negotiate_message, ChallengeMessage, Credentials};

/// Handshake progress. Only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum NtlmStage {
    #[default]
    Initialized,
    Type1Created,
    Type3Created,
}

#[derive(Debug, Clone, Default)]
struct Handshake {
    stage: NtlmStage,
    /// Base64 message to send with the next signing.
    message: Option<String>,
}

impl Handshake {
    fn advance(&mut self, stage: NtlmStage, message: Vec<u8>) {
        debug_assert!(stage > self.stage);
        self.stage = stage;
        self.message = Some(STANDARD.encode(message));
    }
}

fn offers_ntlm(response: &Response) -> bool {
    response.header_values(WWW_AUTHENTICATE).any(|value| {
        value.split(',').any(|challenge| {
            let scheme = challenge.trim().split(' ').next().unwrap_or_default();
            scheme.eq_ignore_ascii_case("NTLM") || scheme.eq_ignore_ascii_case("Negotiate")
        })
    })
}

/// The Type 2 message carried in a `WWW-Authenticate: NTLM <base64>` header.
fn type2_message(response: &Response) -> Option<Vec<u8>> {
    response.header_values(WWW_AUTHENTICATE).find_map(|value| {
        value.split(',').find_map(|challenge| {
            let (scheme, token) = challenge.trim().split_once(' ')?;
            if scheme.eq_ignore_ascii_case("NTLM") || scheme.eq_ignore_ascii_case("Negotiate") {
                STANDARD.decode(token.trim()).ok()
            } else {
                None
            }
        })
    })
}

pub struct Ntlm {
    manifest: HandlerManifest,
}

impl Ntlm {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("ntlm", "1.0.0")
                .update("Authorization", UpdateLocation::Header),
        }
    }

    /// Handshake stage reached by a logical request.
    pub fn stage(auth: &AuthView) -> NtlmStage {
        auth.extensions()
            .get::<Handshake>()
            .map(|handshake| handshake.stage)
            .unwrap_or_default()
    }
}

impl Default for Ntlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for Ntlm {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    fn interactive(&self) -> bool {
        true
    }

    async fn post(&self, auth: &mut AuthView, response: &Response) -> Result<bool, AuthError> {
        let mut handshake = auth
            .extensions()
            .get::<Handshake>()
            .cloned()
            .unwrap_or_default();

        match handshake.stage {
            NtlmStage::Initialized => {
                if !response.is_challenge() || !offers_ntlm(response) {
                    return Ok(true);
                }
                handshake.advance(NtlmStage::Type1Created, negotiate_message());
            }
            NtlmStage::Type1Created => {
                let bytes = type2_message(response).ok_or_else(|| {
                    AuthError::InvalidChallenge("response carries no NTLM type 2 message".into())
                })?;
                let challenge = ChallengeMessage::parse(&bytes)?;
                let credentials = Credentials::new(
                    &auth.string("username"),
                    &auth.string("password"),
                    &auth.string("domain"),
                    &auth.string("workstation"),
                );
                let client_challenge: [u8; 8] = rand::thread_rng().gen();
                let timestamp = challenge.timestamp().unwrap_or_else(filetime_now);
                let message =
                    authenticate_message(&credentials, &challenge, client_challenge, timestamp)?;
                handshake.advance(NtlmStage::Type3Created, message);
            }
            NtlmStage::Type3Created => return Ok(true),
        }

        debug!(stage = ?handshake.stage, "advancing NTLM handshake");
        auth.extensions_mut().insert(handshake);
        Ok(false)
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let message = auth
            .extensions()
            .get::<Handshake>()
            .and_then(|handshake| handshake.message.clone());
        match message {
            Some(message) => request
                .headers
                .set_sensitive_header(AUTHORIZATION, &format!("NTLM {message}")),
            None => Ok(()),
        }
    }
}
