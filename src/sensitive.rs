use http::header::IntoHeaderName;
use http::{HeaderMap, HeaderValue};

use crate::AuthError;

/// Header writes used by handlers. Both replace every existing value of the header, so signing
/// a request twice never leaves duplicates behind.
pub trait SetSensitiveHeader {
    /// Set a header carrying a secret. The value is marked sensitive so it is redacted from
    /// `Debug` output and never compressed into HPACK tables.
    fn set_sensitive_header<K: IntoHeaderName>(
        &mut self,
        key: K,
        value: &str,
    ) -> Result<(), AuthError>;

    fn set_header<K: IntoHeaderName>(&mut self, key: K, value: &str) -> Result<(), AuthError>;
}

impl SetSensitiveHeader for HeaderMap {
    fn set_sensitive_header<K: IntoHeaderName>(
        &mut self,
        key: K,
        value: &str,
    ) -> Result<(), AuthError> {
        let mut header_value = HeaderValue::try_from(value)?;
        header_value.set_sensitive(true);
        self.insert(key, header_value);
        Ok(())
    }

    fn set_header<K: IntoHeaderName>(&mut self, key: K, value: &str) -> Result<(), AuthError> {
        self.insert(key, HeaderValue::try_from(value)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use http::header::AUTHORIZATION;

    use super::*;

    #[test]
    fn test_sensitive_value_is_redacted() {
        let mut headers = HeaderMap::new();
        headers.set_sensitive_header(AUTHORIZATION, "Bearer secret").unwrap();
        headers.set_sensitive_header(AUTHORIZATION, "Bearer other").unwrap();
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert!(!format!("{headers:?}").contains("other"));
    }

    #[test]
    fn test_reject_invalid_value() {
        let mut headers = HeaderMap::new();
        let result = headers.set_header("x-custom", "line\nbreak");
        assert!(matches!(result, Err(AuthError::InvalidHeaderValue(_))));
    }
}
