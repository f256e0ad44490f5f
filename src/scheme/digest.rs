//! HTTP Digest access authentication.
//!
//! The first attempt goes out unsigned. A `401`/`403` carrying a `Digest` challenge stores the
//! server's nonce, realm, opaque and qop, and asks for the request to be replayed, this time
//! signed.

use async_trait::async_trait;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use tracing::debug;

use crate::canonical::escape_quoted;
use crate::primitives::{md5, random_hex, sha256, sha512_256};
use crate::sensitive::SetSensitiveHeader;
use crate::{
    AuthError, AuthHandler, AuthView, HandlerManifest, PreOutcome, Request, Response,
    UpdateLocation,
};

const DEFAULT_NONCE_COUNT: &str = "00000001";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Md5,
    Sha256,
    Sha512_256,
}

impl Algorithm {
    /// Parse an algorithm name, returning it with whether it is a session variant.
    fn parse(name: &str) -> Result<(Self, bool), AuthError> {
        let upper = name.to_ascii_uppercase();
        let (base, session) = match upper.strip_suffix("-SESS") {
            Some(base) => (base, true),
            None => (upper.as_str(), false),
        };
        let algorithm = match base {
            "MD5" => Algorithm::Md5,
            "SHA-256" => Algorithm::Sha256,
            "SHA-512-256" => Algorithm::Sha512_256,
            _ => {
                return Err(AuthError::Unsupported(format!(
                    "Digest algorithm {name:?} is not supported"
                )))
            }
        };
        Ok((algorithm, session))
    }

    fn hash(self, data: &str) -> String {
        let digest = match self {
            Algorithm::Md5 => md5(data.as_bytes()),
            Algorithm::Sha256 => sha256(data.as_bytes()),
            Algorithm::Sha512_256 => sha512_256(data.as_bytes()),
        };
        hex::encode(digest)
    }
}

/// Values needed to compute a digest response.
pub(crate) struct DigestInput<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub realm: &'a str,
    pub nonce: &'a str,
    pub method: &'a str,
    pub uri: &'a str,
    pub algorithm: &'a str,
    pub qop: &'a str,
    pub nonce_count: &'a str,
    pub client_nonce: &'a str,
}

pub(crate) fn digest_response(input: &DigestInput<'_>) -> Result<String, AuthError> {
    let (algorithm, session) = Algorithm::parse(input.algorithm)?;

    let mut ha1 = algorithm.hash(&format!(
        "{}:{}:{}",
        input.username, input.realm, input.password
    ));
    if session {
        ha1 = algorithm.hash(&format!("{}:{}:{}", ha1, input.nonce, input.client_nonce));
    }
    let ha2 = algorithm.hash(&format!("{}:{}", input.method, input.uri));

    let response = if input.qop.is_empty() {
        algorithm.hash(&format!("{}:{}:{}", ha1, input.nonce, ha2))
    } else {
        algorithm.hash(&format!(
            "{}:{}:{}:{}:{}:{}",
            ha1, input.nonce, input.nonce_count, input.client_nonce, input.qop, ha2
        ))
    };
    Ok(response)
}

/// Pick the qop to answer with from a challenge's comma-separated list, preferring `auth`.
fn choose_qop(offered: &str) -> String {
    let options: Vec<&str> = offered
        .split(',')
        .map(str::trim)
        .filter(|option| !option.is_empty())
        .collect();
    if options.iter().any(|option| option.eq_ignore_ascii_case("auth")) {
        "auth".to_owned()
    } else {
        options.first().map(|option| (*option).to_owned()).unwrap_or_default()
    }
}

/// Parameters of the first `Digest` challenge in the `WWW-Authenticate` headers.
fn digest_challenge(response: &Response) -> Option<Vec<(String, String)>> {
    for value in response.header_values(WWW_AUTHENTICATE) {
        for challenge in ::http_auth::ChallengeParser::new(value) {
            let Ok(challenge) = challenge else {
                break;
            };
            if challenge.scheme.eq_ignore_ascii_case("Digest") {
                return Some(
                    challenge
                        .params
                        .iter()
                        .map(|(name, value)| (name.to_ascii_lowercase(), value.to_unescaped()))
                        .collect(),
                );
            }
        }
    }
    None
}

pub struct Digest {
    manifest: HandlerManifest,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("digest", "1.0.0")
                .update("Authorization", UpdateLocation::Header)
                .update("nonce", UpdateLocation::Auth)
                .update("realm", UpdateLocation::Auth),
        }
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for Digest {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    fn interactive(&self) -> bool {
        true
    }

    async fn pre(&self, auth: &mut AuthView) -> Result<PreOutcome, AuthError> {
        if auth.non_empty("nonce").is_some() && auth.non_empty("realm").is_some() {
            Ok(PreOutcome::Ready)
        } else {
            Ok(PreOutcome::Skip)
        }
    }

    async fn post(&self, auth: &mut AuthView, response: &Response) -> Result<bool, AuthError> {
        if auth.flag("disableRetryRequest") || !response.is_challenge() {
            return Ok(true);
        }
        let Some(params) = digest_challenge(response) else {
            return Ok(true);
        };

        let lookup = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };
        let (Some(nonce), Some(realm)) = (lookup("nonce"), lookup("realm")) else {
            return Err(AuthError::InvalidChallenge(
                "Digest challenge without nonce or realm".into(),
            ));
        };
        debug!(%realm, "received digest challenge");

        auth.set("nonce", nonce).set("realm", realm);
        if let Some(opaque) = lookup("opaque") {
            auth.set("opaque", opaque);
        }
        if let Some(qop) = lookup("qop") {
            auth.set("qop", choose_qop(&qop));
        }
        if let Some(algorithm) = lookup("algorithm") {
            auth.set("algorithm", algorithm);
        }
        Ok(false)
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let qop = auth.string("qop");
        if qop.eq_ignore_ascii_case("auth-int") {
            return Err(AuthError::Unsupported(
                "Digest Auth with \"qop\": \"auth-int\" is not supported.".into(),
            ));
        }

        let username = auth.string("username");
        let password = auth.string("password");
        let realm = auth.require("realm")?;
        let nonce = auth.require("nonce")?;
        let opaque = auth.string("opaque");
        let algorithm = auth.non_empty("algorithm");
        let nonce_count = auth
            .non_empty("nonceCount")
            .unwrap_or_else(|| DEFAULT_NONCE_COUNT.to_owned());
        let client_nonce = match auth.non_empty("clientNonce") {
            Some(client_nonce) => client_nonce,
            None => {
                let client_nonce = random_hex(8);
                auth.set("clientNonce", client_nonce.clone());
                client_nonce
            }
        };
        let uri = request.path_and_query();

        let response = digest_response(&DigestInput {
            username: &username,
            password: &password,
            realm: &realm,
            nonce: &nonce,
            method: request.method.as_str(),
            uri: &uri,
            algorithm: algorithm.as_deref().unwrap_or("MD5"),
            qop: &qop,
            nonce_count: &nonce_count,
            client_nonce: &client_nonce,
        })?;

        let mut fields = vec![
            format!("username=\"{}\"", escape_quoted(&username)),
            format!("realm=\"{}\"", escape_quoted(&realm)),
            format!("nonce=\"{}\"", escape_quoted(&nonce)),
            format!("uri=\"{}\"", escape_quoted(&uri)),
        ];
        if let Some(algorithm) = &algorithm {
            fields.push(format!("algorithm={algorithm}"));
        }
        if !qop.is_empty() {
            fields.push(format!("qop={qop}"));
            fields.push(format!("nc={nonce_count}"));
            fields.push(format!("cnonce=\"{client_nonce}\""));
        }
        fields.push(format!("response=\"{response}\""));
        fields.push(format!("opaque=\"{}\"", escape_quoted(&opaque)));

        request
            .headers
            .set_sensitive_header(AUTHORIZATION, &format!("Digest {}", fields.join(", ")))
    }
}
