//! Hashing, MAC and signature helpers shared by the schemes.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, EncodingKey};
use md4::Md4;
use md5::Md5;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512, Sha512_256};

use crate::AuthError;

fn mac<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <M as KeyInit>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn hmac_md5(key: &[u8], data: &[u8]) -> Vec<u8> {
    mac::<Hmac<Md5>>(key, data)
}

pub fn hmac_sha1(key: &[u8], data: &[u8]) -> Vec<u8> {
    mac::<Hmac<Sha1>>(key, data)
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    mac::<Hmac<Sha256>>(key, data)
}

pub fn hmac_sha512(key: &[u8], data: &[u8]) -> Vec<u8> {
    mac::<Hmac<Sha512>>(key, data)
}

pub fn md4(data: &[u8]) -> Vec<u8> {
    Md4::digest(data).to_vec()
}

pub fn md5(data: &[u8]) -> Vec<u8> {
    Md5::digest(data).to_vec()
}

pub fn sha1(data: &[u8]) -> Vec<u8> {
    Sha1::digest(data).to_vec()
}

pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

pub fn sha512(data: &[u8]) -> Vec<u8> {
    Sha512::digest(data).to_vec()
}

pub fn sha512_256(data: &[u8]) -> Vec<u8> {
    Sha512_256::digest(data).to_vec()
}

pub fn base64(data: impl AsRef<[u8]>) -> String {
    STANDARD.encode(data)
}

/// Sign `message` with an RSA private key in PEM form (PKCS#1 or PKCS#8).
///
/// `algorithm` picks the digest and padding, e.g. `RS256` for RSASSA-PKCS1-v1_5 over SHA-256.
pub fn rsa_sign(private_key_pem: &str, algorithm: Algorithm, message: &[u8]) -> Result<Vec<u8>, AuthError> {
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())?;
    let signature = jsonwebtoken::crypto::sign(message, &key, algorithm)?;
    URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|error| AuthError::Other(format!("Malformed RSA signature: {error}")))
}

/// Random ASCII alphanumeric string, for nonces.
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Random bytes, hex encoded.
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_sha256_rfc4231_case_2() {
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_md4_nt_hash() {
        let utf16: Vec<u8> = "Password"
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        assert_eq!(hex::encode(md4(&utf16)), "a4f49c406510bdcab6824ee7c30fd852");
    }

    #[test]
    fn test_rsa_signature_verifies() {
        let private_key = include_str!("../tests/fixtures/rsa_private.pem");
        let public_key = include_str!("../tests/fixtures/rsa_public.pem");
        let signature = rsa_sign(private_key, Algorithm::RS256, b"message").unwrap();
        assert_eq!(signature.len(), 256);

        let key = jsonwebtoken::DecodingKey::from_rsa_pem(public_key.as_bytes()).unwrap();
        let verified = jsonwebtoken::crypto::verify(
            &URL_SAFE_NO_PAD.encode(&signature),
            b"message",
            &key,
            Algorithm::RS256,
        )
        .unwrap();
        assert!(verified);
    }

    #[test]
    fn test_random_string() {
        let nonce = random_string(16);
        assert_eq!(nonce.len(), 16);
        assert!(nonce.bytes().all(|b| b.is_ascii_alphanumeric()));
        assert_eq!(random_hex(8).len(), 16);
    }
}
