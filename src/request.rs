//! Request and response types passed between the engine, handlers and executors.

use bytes::Bytes;
use http::header::{AsHeaderName, HeaderName};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use url::Url;

use crate::AuthError;

/// Request body, tagged by how it is encoded on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    Empty,
    Raw(String),
    UrlEncoded(Vec<(String, String)>),
    /// Multipart form fields. Encoding is left to the executor.
    FormData(Vec<(String, String)>),
    File(Bytes),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Raw(raw) => raw.is_empty(),
            Body::UrlEncoded(pairs) | Body::FormData(pairs) => pairs.is_empty(),
            Body::File(bytes) => bytes.is_empty(),
        }
    }

    /// Bytes of the body as used for content hashes.
    ///
    /// Multipart boundaries are chosen by the executor, so form data hashes as empty.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Body::Empty | Body::FormData(_) => Bytes::new(),
            Body::Raw(raw) => Bytes::copy_from_slice(raw.as_bytes()),
            Body::UrlEncoded(pairs) => Bytes::from(
                url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish(),
            ),
            Body::File(bytes) => bytes.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    pub fn post(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::POST, Url::parse(url)?))
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Path plus query string, as sent in the request line.
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_owned(),
        }
    }

    /// Host as sent in the `Host` header: the port is only included when it is not the default.
    pub fn host_with_port(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }

    /// Decoded query parameters, in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url.query_pairs().into_owned().collect()
    }

    /// Keep only the query parameters whose key passes `keep`.
    ///
    /// Kept parameters stay byte for byte as they were. The query is left alone when nothing
    /// matches.
    pub fn retain_query_params(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let Some(query) = self.url.query() else {
            return;
        };
        let mut removed = false;
        let kept: Vec<&str> = query
            .split('&')
            .filter(|segment| {
                let drop = url::form_urlencoded::parse(segment.as_bytes())
                    .next()
                    .is_some_and(|(key, _)| !keep(&key));
                removed |= drop;
                !drop
            })
            .collect();
        if !removed {
            return;
        }
        let kept = kept.join("&");
        if kept.is_empty() {
            self.url.set_query(None);
        } else {
            self.url.set_query(Some(&kept));
        }
    }

    pub fn append_query_param(&mut self, key: &str, value: &str) {
        self.url.query_pairs_mut().append_pair(key, value);
    }

    /// Remove urlencoded body fields whose key passes `remove`. Other body modes are untouched.
    pub fn remove_body_params(&mut self, mut remove: impl FnMut(&str) -> bool) {
        if let Body::UrlEncoded(pairs) = &mut self.body {
            pairs.retain(|(key, _)| !remove(key));
        }
    }

    /// Media type of the body, lower-cased and without parameters.
    pub fn content_type(&self) -> Option<String> {
        self.header_str(http::header::CONTENT_TYPE).map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    pub(crate) fn require_host(&self) -> Result<&str, AuthError> {
        self.url
            .host_str()
            .ok_or_else(|| AuthError::Other(format!("URL {} has no host", self.url)))
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.append(name, HeaderValue::from_static(value));
        self
    }

    /// All values of a header that are valid strings.
    pub fn header_values<'a, K: AsHeaderName>(&'a self, name: K) -> impl Iterator<Item = &'a str> {
        self.headers
            .get_all(name)
            .into_iter()
            .filter_map(|value| value.to_str().ok())
    }

    /// `401 Unauthorized` or `403 Forbidden`, the statuses that carry authentication challenges.
    pub fn is_challenge(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED || self.status == StatusCode::FORBIDDEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retain_query_params_drops_empty_query() {
        let mut request = Request::get("https://example.com/path?oauth_token=a").unwrap();
        request.retain_query_params(|key| !key.starts_with("oauth_"));
        assert_eq!(request.url.as_str(), "https://example.com/path");
    }

    #[test]
    fn test_retain_query_params_keeps_others() {
        let mut request = Request::get("https://example.com/?a=1&access_token=x&b=2").unwrap();
        request.retain_query_params(|key| key != "access_token");
        assert_eq!(request.url.query(), Some("a=1&b=2"));
    }

    #[test]
    fn test_retain_query_params_keeps_raw_segments() {
        let mut request = Request::get("https://example.com/?flag&q=a%20b&access_token=x").unwrap();
        request.retain_query_params(|key| key != "access_token");
        assert_eq!(request.url.query(), Some("flag&q=a%20b"));

        request.retain_query_params(|key| key != "access_token");
        assert_eq!(request.url.query(), Some("flag&q=a%20b"));
    }

    #[test]
    fn test_retain_query_params_matches_decoded_key() {
        let mut request = Request::get("https://example.com/?oauth%5Ftoken=a&path=%2Fx").unwrap();
        request.retain_query_params(|key| !key.starts_with("oauth_"));
        assert_eq!(request.url.query(), Some("path=%2Fx"));
    }

    #[test]
    fn test_host_with_port() {
        let request = Request::get("http://example.com:8000/resource").unwrap();
        assert_eq!(request.host_with_port(), "example.com:8000");
        let request = Request::get("https://example.com:443/").unwrap();
        assert_eq!(request.host_with_port(), "example.com");
    }

    #[test]
    fn test_urlencoded_body_bytes() {
        let body = Body::UrlEncoded(vec![("a".into(), "b c".into())]);
        assert_eq!(&body.to_bytes()[..], b"a=b+c");
    }
}
