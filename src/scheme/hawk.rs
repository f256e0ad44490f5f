//! Hawk HTTP authentication.

use async_trait::async_trait;
use http::header::AUTHORIZATION;

use crate::canonical::escape_quoted;
use crate::primitives::{base64, hmac_sha1, hmac_sha256, random_string, sha1, sha256};
use crate::sensitive::SetSensitiveHeader;
use crate::{AuthError, AuthHandler, AuthView, HandlerManifest, PreOutcome, Request, UpdateLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HawkAlgorithm {
    Sha1,
    Sha256,
}

impl HawkAlgorithm {
    fn parse(name: Option<&str>) -> Result<Self, AuthError> {
        match name.map(str::to_ascii_lowercase).as_deref() {
            None | Some("sha256") => Ok(Self::Sha256),
            Some("sha1") => Ok(Self::Sha1),
            Some(other) => Err(AuthError::Unsupported(format!(
                "Hawk algorithm {other:?} is not supported"
            ))),
        }
    }

    fn hash(self, data: &[u8]) -> String {
        match self {
            Self::Sha1 => base64(sha1(data)),
            Self::Sha256 => base64(sha256(data)),
        }
    }

    fn mac(self, key: &[u8], data: &[u8]) -> String {
        match self {
            Self::Sha1 => base64(hmac_sha1(key, data)),
            Self::Sha256 => base64(hmac_sha256(key, data)),
        }
    }
}

/// Values covered by a Hawk MAC.
pub(crate) struct Artifacts<'a> {
    pub ts: &'a str,
    pub nonce: &'a str,
    pub method: &'a str,
    pub resource: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub hash: Option<&'a str>,
    pub ext: Option<&'a str>,
    pub app: Option<&'a str>,
    pub dlg: Option<&'a str>,
}

fn normalized_string(artifacts: &Artifacts<'_>) -> String {
    let ext = artifacts
        .ext
        .map(|ext| ext.replace('\\', "\\\\").replace('\n', "\\n"))
        .unwrap_or_default();
    let mut normalized = format!(
        "hawk.1.header\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n",
        artifacts.ts,
        artifacts.nonce,
        artifacts.method.to_ascii_uppercase(),
        artifacts.resource,
        artifacts.host.to_ascii_lowercase(),
        artifacts.port,
        artifacts.hash.unwrap_or_default(),
        ext
    );
    if let Some(app) = artifacts.app {
        normalized.push_str(&format!("{}\n{}\n", app, artifacts.dlg.unwrap_or_default()));
    }
    normalized
}

/// The `Authorization` header value for `artifacts`.
fn header_value(
    id: &str,
    key: &str,
    algorithm: HawkAlgorithm,
    artifacts: &Artifacts<'_>,
) -> String {
    let mac = algorithm.mac(key.as_bytes(), normalized_string(artifacts).as_bytes());

    let mut header = format!(
        "Hawk id=\"{}\", ts=\"{}\", nonce=\"{}\"",
        id, artifacts.ts, artifacts.nonce
    );
    if let Some(hash) = artifacts.hash {
        header.push_str(&format!(", hash=\"{hash}\""));
    }
    if let Some(ext) = artifacts.ext.filter(|ext| !ext.is_empty()) {
        header.push_str(&format!(", ext=\"{}\"", escape_quoted(ext)));
    }
    header.push_str(&format!(", mac=\"{mac}\""));
    if let Some(app) = artifacts.app {
        header.push_str(&format!(", app=\"{app}\""));
        if let Some(dlg) = artifacts.dlg {
            header.push_str(&format!(", dlg=\"{dlg}\""));
        }
    }
    header
}

fn payload_hash(algorithm: HawkAlgorithm, content_type: &str, payload: &[u8]) -> String {
    let mut data = format!("hawk.1.payload\n{content_type}\n").into_bytes();
    data.extend_from_slice(payload);
    data.push(b'\n');
    algorithm.hash(&data)
}

pub struct Hawk {
    manifest: HandlerManifest,
}

impl Hawk {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("hawk", "1.0.0")
                .update("Authorization", UpdateLocation::Header)
                .update("nonce", UpdateLocation::Auth)
                .update("timestamp", UpdateLocation::Auth),
        }
    }
}

impl Default for Hawk {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for Hawk {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn pre(&self, auth: &mut AuthView) -> Result<PreOutcome, AuthError> {
        if auth.non_empty("nonce").is_none() {
            auth.set("nonce", random_string(6));
        }
        if auth.non_empty("timestamp").is_none() {
            auth.set("timestamp", chrono::Utc::now().timestamp().to_string());
        }
        Ok(PreOutcome::Ready)
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let id = auth.require("authId")?;
        let key = auth.require("authKey")?;
        let algorithm = HawkAlgorithm::parse(auth.non_empty("algorithm").as_deref())?;
        let nonce = auth.require("nonce")?;
        let ts = auth.require("timestamp")?;
        let ext = auth.non_empty("ext");
        let app = auth.non_empty("app");
        let dlg = auth.non_empty("dlg");

        let hash = if auth.flag("includePayloadHash") {
            let content_type = request.content_type().unwrap_or_default();
            Some(payload_hash(algorithm, &content_type, &request.body.to_bytes()))
        } else {
            None
        };

        let host = request.require_host()?.to_owned();
        let port = request.url.port_or_known_default().unwrap_or(80);
        let resource = request.path_and_query();
        let artifacts = Artifacts {
            ts: &ts,
            nonce: &nonce,
            method: request.method.as_str(),
            resource: &resource,
            host: &host,
            port,
            hash: hash.as_deref(),
            ext: ext.as_deref(),
            app: app.as_deref(),
            dlg: dlg.as_deref(),
        };
        let value = header_value(&id, &key, algorithm, &artifacts);
        request.headers.set_sensitive_header(AUTHORIZATION, &value)
    }
}
