//! AWS Signature Version 4.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST};

use crate::canonical::{aws_canonical_headers, aws_canonical_query, aws_canonical_uri};
use crate::primitives::{hmac_sha256, sha256};
use crate::sensitive::SetSensitiveHeader;
use crate::{AuthError, AuthHandler, AuthView, Body, HandlerManifest, Request, UpdateLocation};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const DEFAULT_SERVICE: &str = "execute-api";
const DEFAULT_REGION: &str = "us-east-1";

const X_AMZ_DATE: &str = "x-amz-date";
const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";
const X_AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

/// Credentials and scope of one signature.
pub(crate) struct AwsCredentials<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub session_token: Option<&'a str>,
    pub service: &'a str,
    pub region: &'a str,
}

/// Sign `request` as of `now`.
pub(crate) fn sign_at(
    request: &mut Request,
    credentials: &AwsCredentials<'_>,
    now: DateTime<Utc>,
) -> Result<(), AuthError> {
    let s3 = credentials.service == "s3";
    for name in ["authorization", X_AMZ_DATE, X_AMZ_SECURITY_TOKEN, X_AMZ_CONTENT_SHA256] {
        request.headers.remove(name);
    }

    if !request.body.is_empty() && !request.headers.contains_key(CONTENT_TYPE) {
        let content_type = match request.body {
            Body::UrlEncoded(_) => "application/x-www-form-urlencoded",
            Body::FormData(_) => "multipart/form-data",
            _ => "application/x-www-form-urlencoded; charset=utf-8",
        };
        request.headers.set_header(CONTENT_TYPE, content_type)?;
    }

    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let host = request.host_with_port();
    request.headers.set_header(HOST, &host)?;
    request.headers.set_header(X_AMZ_DATE, &amz_date)?;
    if let Some(token) = credentials.session_token {
        request
            .headers
            .set_sensitive_header(X_AMZ_SECURITY_TOKEN, token)?;
    }

    let payload_hash = hex::encode(sha256(&request.body.to_bytes()));
    if s3 {
        request
            .headers
            .set_header(X_AMZ_CONTENT_SHA256, &payload_hash)?;
    }

    let (canonical_headers, signed_headers) = aws_canonical_headers(&request.headers);
    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method.as_str(),
        aws_canonical_uri(request.url.path(), s3),
        aws_canonical_query(&request.query_pairs(), s3),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let scope = format!(
        "{}/{}/{}/aws4_request",
        date, credentials.region, credentials.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(sha256(canonical_request.as_bytes()))
    );

    let key_date = hmac_sha256(
        format!("AWS4{}", credentials.secret_key).as_bytes(),
        date.as_bytes(),
    );
    let key_region = hmac_sha256(&key_date, credentials.region.as_bytes());
    let key_service = hmac_sha256(&key_region, credentials.service.as_bytes());
    let key_signing = hmac_sha256(&key_service, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&key_signing, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.access_key
    );
    request
        .headers
        .set_sensitive_header(AUTHORIZATION, &authorization)
}

pub struct AwsV4 {
    manifest: HandlerManifest,
}

impl AwsV4 {
    pub fn new() -> Self {
        Self {
            manifest: HandlerManifest::new("awsv4", "1.0.0")
                .update("Authorization", UpdateLocation::Header)
                .update("Host", UpdateLocation::Header)
                .update("Content-Type", UpdateLocation::Header)
                .update("X-Amz-Date", UpdateLocation::Header)
                .update("X-Amz-Security-Token", UpdateLocation::Header)
                .update("X-Amz-Content-Sha256", UpdateLocation::Header),
        }
    }
}

impl Default for AwsV4 {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for AwsV4 {
    fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }

    async fn sign(&self, auth: &mut AuthView, request: &mut Request) -> Result<(), AuthError> {
        let access_key = auth.require("accessKey")?;
        let secret_key = auth.require("secretKey")?;
        let session_token = auth.non_empty("sessionToken");
        let service = auth
            .non_empty("service")
            .unwrap_or_else(|| DEFAULT_SERVICE.to_owned());
        let region = auth
            .non_empty("region")
            .unwrap_or_else(|| DEFAULT_REGION.to_owned());

        let credentials = AwsCredentials {
            access_key: &access_key,
            secret_key: &secret_key,
            session_token: session_token.as_deref(),
            service: &service,
            region: &region,
        };
        sign_at(request, &credentials, Utc::now())
    }
}
