//! Akamai EdgeGrid (`EG1-HMAC-SHA256`) authentication.

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::Method;
use url::Url;

use crate::canonical::collapse_whitespace;
use crate::primitives::{base64, hmac_sha256, sha256};
use crate::sensitive::SetSensitiveHeader;
use crate::{AuthError, AuthHandler, AuthView, HandlerManifest, PreOutcome, Request, UpdateLocation};

const DEFAULT_MAX_BODY_SIZE: usize = 131_072;
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H:%M:%S+0000";

pub(crate) struct EdgeGridInput<'a> {
    pub client_token: &'a str,
    pub client_secret: &'a str,
    pub access_token: &'a str,
    pub timestamp: &'a str,
    pub nonce: &'a str,
    pub headers_to_sign: &'a [String],
    pub max_body_size: usize,
}

/// Compute the `Authorization` header value for `request`, addressed at `url`.
pub(crate) fn authorization(
    input: &EdgeGridInput<'_>,
    request: &Request,
    url: &Url,
) -> Result<String, AuthError> {
    let prefix = format!(
        "EG1-HMAC-SHA256 client_token={};access_token={};timestamp={};nonce={};",
        input.client_token, input.access_token, input.timestamp, input.nonce
    );

    let canonical_headers = input
        .headers_to_sign
        .iter()
        .filter_map(|name| {
            let value = request.header_str(name.as_str())?;
            Some(format!(
                "{}:{}",
                name.to_ascii_lowercase(),
                collapse_whitespace(value)
            ))
        })
        .collect::<Vec<_>>()
        .join("\t");

    let body_hash = if request.method == Method::POST && !request.body.is_empty() {
        let body = request.body.to_bytes();
        let len = body.len().min(input.max_body_size);
        base64(sha256(&body[..len]))
    } else {
        String::new()
    };

    let path = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_owned(),
    };
    let host = url
        .host_str()
        .ok_or_else(|| AuthError::Other(format!("URL {url} has no host")))?;
    let data = [
        request.method.as_str(),
        url.scheme(),
        host,
        path.as_str(),
        canonical_headers.as_str(),
        body_hash.as_str(),
        prefix.as_str(),
    ]
    .join("\t");

    let signing_key = base64(hmac_sha256(
        input.client_secret.as_bytes(),
        input.timestamp.as_bytes(),
    ));
    let signature = base64(hmac_sha256(signing_key.as_bytes(), data.as_bytes()));
    Ok(format!("{prefix}signature={signature}"))
}

pub struct EdgeGrid {
    manifest: HandlerManifest,
}

impl EdgeGrid {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("edgegrid", "1.0.0")
                .update("Authorization", UpdateLocation::Header),
        }
    }
}

impl Default for EdgeGrid {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for EdgeGrid {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn pre(&self, auth: &mut AuthView) -> Result<PreOutcome, AuthError> {
        let ready = ["accessToken", "clientToken", "clientSecret"]
            .iter()
            .all(|key| auth.non_empty(key).is_some());
        Ok(if ready {
            PreOutcome::Ready
        } else {
            PreOutcome::Skip
        })
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let client_token = auth.require("clientToken")?;
        let client_secret = auth.require("clientSecret")?;
        let access_token = auth.require("accessToken")?;
        let timestamp = auth
            .non_empty("timestamp")
            .unwrap_or_else(|| chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string());
        let nonce = auth
            .non_empty("nonce")
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let headers_to_sign: Vec<String> = auth
            .string("headersToSign")
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect();
        let max_body_size = match auth.get_str("maxBodySize") {
            Some(size) => size.parse().map_err(|_| AuthError::InvalidParameter {
                name: "maxBodySize",
                reason: format!("{size:?} is not a byte count"),
            })?,
            None => DEFAULT_MAX_BODY_SIZE,
        };

        let mut url = request.url.clone();
        if let Some(base) = auth.non_empty("baseURL") {
            let base = Url::parse(&base).map_err(|error| AuthError::InvalidParameter {
                name: "baseURL",
                reason: error.to_string(),
            })?;
            url.set_scheme(base.scheme())
                .and_then(|()| url.set_host(base.host_str()).map_err(|_| ()))
                .and_then(|()| url.set_port(base.port()))
                .map_err(|()| AuthError::InvalidParameter {
                    name: "baseURL",
                    reason: format!("cannot address {base}"),
                })?;
        }

        let value = authorization(
            &EdgeGridInput {
                client_token: &client_token,
                client_secret: &client_secret,
                access_token: &access_token,
                timestamp: &timestamp,
                nonce: &nonce,
                headers_to_sign: &headers_to_sign,
                max_body_size,
            },
            request,
            &url,
        )?;
        request.headers.set_sensitive_header(AUTHORIZATION, &value)
    }
}
