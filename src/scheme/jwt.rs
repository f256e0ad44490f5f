use std::str::FromStr;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;

use crate::sensitive::SetSensitiveHeader;
use crate::{AuthError, AuthHandler, AuthView, HandlerManifest, Request, UpdateLocation};

const DEFAULT_HEADER_PREFIX: &str = "Bearer";
const DEFAULT_QUERY_PARAM: &str = "token";

/// A JSON object parameter, given either as an object or as a string holding one.
fn json_object(auth: &AuthView, name: &'static str) -> Result<serde_json::Map<String, Value>, AuthError> {
    let invalid = |reason: String| AuthError::InvalidParameter { name, reason };
    let value = match auth.get(name) {
        None | Some(Value::Null) => return Ok(serde_json::Map::new()),
        Some(Value::String(text)) if text.trim().is_empty() => return Ok(serde_json::Map::new()),
        Some(Value::String(text)) => {
            serde_json::from_str(text).map_err(|error| invalid(error.to_string()))?
        }
        Some(value) => value.clone(),
    };
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid("expected a JSON object".into())),
    }
}

fn encoding_key(auth: &AuthView, algorithm: Algorithm) -> Result<EncodingKey, AuthError> {
    let key = match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            let secret = auth.string("secret");
            if auth.flag("isSecretBase64Encoded") {
                let decoded = STANDARD
                    .decode(secret.trim())
                    .map_err(|error| AuthError::InvalidParameter {
                        name: "secret",
                        reason: error.to_string(),
                    })?;
                EncodingKey::from_secret(&decoded)
            } else {
                EncodingKey::from_secret(secret.as_bytes())
            }
        }
        Algorithm::ES256 | Algorithm::ES384 => {
            EncodingKey::from_ec_pem(auth.require("privateKey")?.as_bytes())?
        }
        Algorithm::EdDSA => EncodingKey::from_ed_pem(auth.require("privateKey")?.as_bytes())?,
        _ => EncodingKey::from_rsa_pem(auth.require("privateKey")?.as_bytes())?,
    };
    Ok(key)
}

/// JSON Web Token generated per request and sent as a bearer credential.
pub struct Jwt {
    manifest: HandlerManifest,
}

impl Jwt {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("jwt", "1.0.0")
                .update("Authorization", UpdateLocation::Header)
                .update("*", UpdateLocation::UrlParam),
        }
    }
}

impl Default for Jwt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for Jwt {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let algorithm_name = auth
            .non_empty("algorithm")
            .unwrap_or_else(|| "HS256".to_owned());
        let algorithm = Algorithm::from_str(&algorithm_name).map_err(|_| {
            AuthError::Unsupported(format!("JWT algorithm {algorithm_name:?} is not supported"))
        })?;

        let mut header = serde_json::to_value(Header::new(algorithm))
            .map_err(|error| AuthError::Other(error.to_string()))?;
        if let Value::Object(fields) = &mut header {
            fields.extend(json_object(auth, "header")?);
            fields.insert("alg".into(), Value::String(algorithm_name.clone()));
        }
        let header: Header = serde_json::from_value(header).map_err(|error| {
            AuthError::InvalidParameter {
                name: "header",
                reason: error.to_string(),
            }
        })?;
        let payload = json_object(auth, "payload")?;
        let token = jsonwebtoken::encode(&header, &payload, &encoding_key(auth, algorithm)?)?;

        match auth.non_empty("addTokenTo").as_deref() {
            None | Some("header") => {
                let prefix = auth
                    .get_str("headerPrefix")
                    .map_or_else(|| DEFAULT_HEADER_PREFIX.to_owned(), |prefix| prefix.trim().to_owned());
                let value = if prefix.is_empty() {
                    token
                } else {
                    format!("{prefix} {token}")
                };
                request.headers.set_sensitive_header(AUTHORIZATION, &value)
            }
            Some("queryParam") => {
                let key = auth
                    .non_empty("queryParamKey")
                    .unwrap_or_else(|| DEFAULT_QUERY_PARAM.to_owned());
                request.retain_query_params(|name| name != key);
                request.append_query_param(&key, &token);
                Ok(())
            }
            Some(other) => Err(AuthError::InvalidParameter {
                name: "addTokenTo",
                reason: format!("unknown location {other:?}"),
            }),
        }
    }
}
