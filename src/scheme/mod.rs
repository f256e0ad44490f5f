//! Built-in authentication schemes.
//!
//! Each scheme is a stateless [`AuthHandler`]. Per-request values live in the
//! [`AuthView`](crate::AuthView) handed to every phase.

use std::sync::Arc;

use crate::AuthHandler;

mod apikey;
mod awsv4;
mod basic;
mod bearer;
mod digest;
mod edgegrid;
mod hawk;
mod jwt;
mod noauth;
mod ntlm;
mod oauth1;
mod oauth2;
mod oci;

pub use apikey::ApiKey;
pub use awsv4::AwsV4;
pub use basic::Basic;
pub use bearer::Bearer;
pub use digest::Digest;
pub use edgegrid::EdgeGrid;
pub use hawk::Hawk;
pub use jwt::Jwt;
pub use noauth::NoAuth;
pub use ntlm::{Ntlm, NtlmStage};
pub use oauth1::OAuth1;
pub use oauth2::{OAuth2, TokenRefresher};
pub use oci::Oci;

/// Every built-in handler with the name it is registered under.
pub fn builtin_handlers() -> Vec<(&'static str, Arc<dyn AuthHandler>)> {
    vec![
        ("noauth", Arc::new(NoAuth::new())),
        ("basic", Arc::new(Basic::new())),
        ("bearer", Arc::new(Bearer::new())),
        ("apikey", Arc::new(ApiKey::new())),
        ("digest", Arc::new(Digest::new())),
        ("ntlm", Arc::new(Ntlm::new())),
        ("oauth1", Arc::new(OAuth1::new())),
        ("oauth2", Arc::new(OAuth2::new())),
        ("awsv4", Arc::new(AwsV4::new())),
        ("hawk", Arc::new(Hawk::new())),
        ("edgegrid", Arc::new(EdgeGrid::new())),
        ("oci-v1", Arc::new(Oci::new())),
        ("jwt", Arc::new(Jwt::new())),
    ]
}
