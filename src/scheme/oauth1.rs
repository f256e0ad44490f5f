//! OAuth 1.0a request signing (RFC 5849).

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::Method;
use jsonwebtoken::Algorithm;

use crate::canonical::{base_url, encode, sorted_param_string};
use crate::primitives::{
    base64, hmac_sha1, hmac_sha256, hmac_sha512, random_string, rsa_sign, sha1, sha256, sha512,
};
use crate::sensitive::SetSensitiveHeader;
use crate::{AuthError, AuthHandler, AuthView, Body, HandlerManifest, Request, UpdateLocation};

const OAUTH_PREFIX: &str = "oauth_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignatureMethod {
    HmacSha1,
    HmacSha256,
    HmacSha512,
    RsaSha256,
    RsaSha512,
    Plaintext,
}

impl SignatureMethod {
    fn parse(name: &str) -> Result<Self, AuthError> {
        match name.to_ascii_uppercase().as_str() {
            "HMAC-SHA1" => Ok(Self::HmacSha1),
            "HMAC-SHA256" => Ok(Self::HmacSha256),
            "HMAC-SHA512" => Ok(Self::HmacSha512),
            "RSA-SHA256" => Ok(Self::RsaSha256),
            "RSA-SHA512" => Ok(Self::RsaSha512),
            "PLAINTEXT" => Ok(Self::Plaintext),
            _ => Err(AuthError::Unsupported(format!(
                "OAuth 1.0 signature method {name:?} is not supported"
            ))),
        }
    }

    fn body_hash(self, body: &[u8]) -> String {
        match self {
            Self::HmacSha1 | Self::Plaintext => base64(sha1(body)),
            Self::HmacSha256 | Self::RsaSha256 => base64(sha256(body)),
            Self::HmacSha512 | Self::RsaSha512 => base64(sha512(body)),
        }
    }
}

/// Values defining one OAuth 1.0 signature.
pub(crate) struct OAuthInput<'a> {
    pub method: &'a str,
    pub consumer_secret: &'a str,
    pub token_secret: &'a str,
    pub private_key: &'a str,
}

/// Compute `oauth_signature` over a signature base string.
pub(crate) fn signature(input: &OAuthInput<'_>, base_string: &str) -> Result<String, AuthError> {
    let key = format!("{}&{}", encode(input.consumer_secret), encode(input.token_secret));
    let signature = match SignatureMethod::parse(input.method)? {
        SignatureMethod::HmacSha1 => base64(hmac_sha1(key.as_bytes(), base_string.as_bytes())),
        SignatureMethod::HmacSha256 => base64(hmac_sha256(key.as_bytes(), base_string.as_bytes())),
        SignatureMethod::HmacSha512 => base64(hmac_sha512(key.as_bytes(), base_string.as_bytes())),
        SignatureMethod::RsaSha256 => {
            base64(rsa_sign(input.private_key, Algorithm::RS256, base_string.as_bytes())?)
        }
        SignatureMethod::RsaSha512 => {
            base64(rsa_sign(input.private_key, Algorithm::RS512, base_string.as_bytes())?)
        }
        SignatureMethod::Plaintext => key,
    };
    Ok(signature)
}

/// Remove everything a previous signing added.
fn strip_oauth(request: &mut Request) {
    let previous = request
        .header_str(AUTHORIZATION)
        .is_some_and(|value| value.trim_start().starts_with("OAuth "));
    if previous {
        request.headers.remove(AUTHORIZATION);
    }
    request.retain_query_params(|key| !key.starts_with(OAUTH_PREFIX));
    request.remove_body_params(|key| key.starts_with(OAUTH_PREFIX));
}

pub struct OAuth1 {
    manifest: HandlerManifest,
}

impl OAuth1 {
    pub fn new() -> Self {
        let mut manifest = HandlerManifest::new("oauth1", "1.0.0")
            .update("Authorization", UpdateLocation::Header);
        for property in [
            "oauth_consumer_key",
            "oauth_token",
            "oauth_signature_method",
            "oauth_timestamp",
            "oauth_nonce",
            "oauth_version",
            "oauth_signature",
        ] {
            manifest = manifest
                .update(property, UpdateLocation::UrlParam)
                .update(property, UpdateLocation::BodyUrlEncoded);
        }
        Self { manifest }
    }
}

impl Default for OAuth1 {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for OAuth1 {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let Some(consumer_key) = auth.non_empty("consumerKey") else {
            return Ok(());
        };
        let method_name = auth
            .non_empty("signatureMethod")
            .unwrap_or_else(|| "HMAC-SHA1".to_owned());
        let method = SignatureMethod::parse(&method_name)?;
        let add_empty = auth.flag("addEmptyParamsToSign");

        strip_oauth(request);

        let timestamp = auth
            .non_empty("timestamp")
            .unwrap_or_else(|| chrono::Utc::now().timestamp().to_string());
        let nonce = auth.non_empty("nonce").unwrap_or_else(|| random_string(11));
        let version = auth.get_str("version").map_or_else(|| "1.0".to_owned(), |v| v.into_owned());

        let mut oauth_params: Vec<(&str, String)> = vec![
            ("oauth_consumer_key", consumer_key),
            ("oauth_token", auth.string("token")),
            ("oauth_signature_method", method_name.clone()),
            ("oauth_timestamp", timestamp),
            ("oauth_nonce", nonce),
            ("oauth_version", version),
            ("oauth_callback", auth.string("callback")),
            ("oauth_verifier", auth.string("verifier")),
        ];
        let hash_body = auth.flag("includeBodyHash")
            && !matches!(request.body, Body::UrlEncoded(_))
            && request.method != Method::GET
            && request.method != Method::HEAD;
        if hash_body {
            oauth_params.push(("oauth_body_hash", method.body_hash(&request.body.to_bytes())));
        }
        oauth_params.retain(|(key, value)| {
            !value.is_empty()
                || (add_empty && matches!(*key, "oauth_token" | "oauth_version"))
        });

        let query = request.query_pairs();
        let body_params = match &request.body {
            Body::UrlEncoded(pairs) => pairs.clone(),
            _ => Vec::new(),
        };
        let param_string = sorted_param_string(
            oauth_params
                .iter()
                .map(|(key, value)| (*key, value.as_str()))
                .chain(query.iter().map(|(key, value)| (key.as_str(), value.as_str())))
                .chain(body_params.iter().map(|(key, value)| (key.as_str(), value.as_str()))),
        );
        let base_string = format!(
            "{}&{}&{}",
            request.method.as_str().to_ascii_uppercase(),
            encode(&base_url(&request.url)),
            encode(&param_string)
        );

        let oauth_signature = signature(
            &OAuthInput {
                method: &method_name,
                consumer_secret: &auth.string("consumerSecret"),
                token_secret: &auth.string("tokenSecret"),
                private_key: &auth.string("privateKey"),
            },
            &base_string,
        )?;
        oauth_params.push(("oauth_signature", oauth_signature));

        let to_header = auth.get("addParamsToHeader").is_none() || auth.flag("addParamsToHeader");
        if to_header {
            let mut fields = Vec::with_capacity(oauth_params.len() + 1);
            if let Some(realm) = auth.non_empty("realm") {
                fields.push(format!("realm=\"{}\"", encode(&realm)));
            }
            fields.extend(
                oauth_params
                    .iter()
                    .map(|(key, value)| format!("{key}=\"{}\"", encode(value))),
            );
            request
                .headers
                .set_sensitive_header(AUTHORIZATION, &format!("OAuth {}", fields.join(", ")))
        } else {
            let into_body =
                request.method != Method::GET && matches!(request.body, Body::UrlEncoded(_));
            match &mut request.body {
                Body::UrlEncoded(pairs) if into_body => pairs.extend(
                    oauth_params
                        .into_iter()
                        .map(|(key, value)| (key.to_owned(), value)),
                ),
                _ => {
                    for (key, value) in &oauth_params {
                        request.url.query_pairs_mut().append_pair(key, value);
                    }
                }
            }
            Ok(())
        }
    }
}
