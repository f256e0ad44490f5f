//! Oracle Cloud Infrastructure request signatures (draft-cavage HTTP signatures, version 1).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, HOST};
use http::Method;
use jsonwebtoken::Algorithm;

use crate::primitives::{base64, rsa_sign, sha256};
use crate::sensitive::SetSensitiveHeader;
use crate::{AuthError, AuthHandler, AuthView, HandlerManifest, PreOutcome, Request, UpdateLocation};

const X_CONTENT_SHA256: &str = "x-content-sha256";
const DEFAULT_CONTENT_TYPE: &str = "application/json";
const REQUIRED: [&str; 4] = ["tenancy", "user", "fingerprint", "privateKey"];

pub(crate) struct OciKey<'a> {
    pub tenancy: &'a str,
    pub user: &'a str,
    pub fingerprint: &'a str,
    pub private_key: &'a str,
}

fn has_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Sign `request` as of `now`, filling in any header the signature needs.
pub(crate) fn sign_at(request: &mut Request, key: &OciKey<'_>, now: DateTime<Utc>) -> Result<(), AuthError> {
    request.headers.remove(AUTHORIZATION);
    if !request.headers.contains_key(DATE) {
        let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        request.headers.set_header(DATE, &date)?;
    }
    let host = request.host_with_port();
    request.headers.set_header(HOST, &host)?;

    let mut signed = vec!["date", "(request-target)", "host"];
    if has_body(&request.method) {
        let body = request.body.to_bytes();
        request
            .headers
            .set_header(X_CONTENT_SHA256, &base64(sha256(&body)))?;
        request
            .headers
            .set_header(CONTENT_LENGTH, &body.len().to_string())?;
        if !request.headers.contains_key(CONTENT_TYPE) {
            request.headers.set_header(CONTENT_TYPE, DEFAULT_CONTENT_TYPE)?;
        }
        signed.extend(["content-length", "content-type", X_CONTENT_SHA256]);
    }

    let target = format!(
        "{} {}",
        request.method.as_str().to_ascii_lowercase(),
        request.path_and_query()
    );
    let lines = signed
        .iter()
        .map(|name| {
            let value = match *name {
                "(request-target)" => target.clone(),
                name => request.header_str(name).unwrap_or_default().to_owned(),
            };
            format!("{name}: {value}")
        })
        .collect::<Vec<_>>()
        .join("\n");

    let signature = base64(rsa_sign(key.private_key, Algorithm::RS256, lines.as_bytes())?);
    let authorization = format!(
        "Signature version=\"1\",keyId=\"{}/{}/{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
        key.tenancy,
        key.user,
        key.fingerprint,
        signed.join(" "),
        signature
    );
    request
        .headers
        .set_sensitive_header(AUTHORIZATION, &authorization)
}

pub struct Oci {
    manifest: HandlerManifest,
}

impl Oci {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("oci-v1", "1.0.0")
                .update("authorization", UpdateLocation::Header)
                .update("date", UpdateLocation::Header)
                .update("host", UpdateLocation::Header)
                .update("content-length", UpdateLocation::Header)
                .update("content-type", UpdateLocation::Header)
                .update(X_CONTENT_SHA256, UpdateLocation::Header),
        }
    }
}

impl Default for Oci {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for Oci {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn pre(&self, auth: &mut AuthView) -> Result<PreOutcome, AuthError> {
        let ready = REQUIRED.iter().all(|key| auth.non_empty(key).is_some());
        Ok(if ready {
            PreOutcome::Ready
        } else {
            PreOutcome::Skip
        })
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let tenancy = auth.require("tenancy")?;
        let user = auth.require("user")?;
        let fingerprint = auth.require("fingerprint")?;
        let private_key = auth.require("privateKey")?;
        let key = OciKey {
            tenancy: &tenancy,
            user: &user,
            fingerprint: &fingerprint,
            private_key: &private_key,
        };
        sign_at(request, &key, Utc::now())
    }
}
