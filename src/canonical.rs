//! String canonicalization used by the signature schemes.

use http::HeaderMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Everything except the RFC 3986 unreserved characters.
pub const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode everything but unreserved characters.
pub fn encode(value: &str) -> String {
    utf8_percent_encode(value, RFC3986).to_string()
}

/// Trim and fold internal whitespace runs to a single space.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `scheme://host[:port]/path`, with the port only when it is not the default.
pub fn base_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    };
    format!("{}://{}{}", url.scheme(), authority, url.path())
}

/// Encode each pair, sort by key then value, and join as `k=v&k=v`.
pub fn sorted_param_string<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut encoded: Vec<(String, String)> = pairs
        .into_iter()
        .map(|(key, value)| (encode(key), encode(value)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Canonical URI for AWS Signature Version 4.
///
/// Other services get a normalized path whose segments are encoded a second time. S3 paths are
/// decoded and encoded once, and keep literal slashes.
pub fn aws_canonical_uri(path: &str, s3: bool) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    let mut segments: Vec<String> = Vec::new();
    for segment in path.split('/') {
        if s3 {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            segments.push(encode(&decoded));
            continue;
        }
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(encode(segment)),
        }
    }

    let mut uri = segments.join("/");
    if s3 {
        uri = uri.replace("%2F", "/");
    } else if path.ends_with('/') && !uri.is_empty() {
        uri.push('/');
    }
    if !uri.starts_with('/') {
        uri.insert(0, '/');
    }
    uri
}

/// Canonical query string for AWS Signature Version 4. S3 only uses the first value of a key.
pub fn aws_canonical_query(pairs: &[(String, String)], s3: bool) -> String {
    let mut encoded: Vec<(String, String)> = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        let key = encode(key);
        if s3 && encoded.iter().any(|(seen, _)| *seen == key) {
            continue;
        }
        encoded.push((key, encode(value)));
    }
    encoded.sort();
    encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Headers never included in an AWS signature.
const AWS_UNSIGNABLE: [&str; 7] = [
    "authorization",
    "connection",
    "x-amzn-trace-id",
    "user-agent",
    "expect",
    "presigned-expires",
    "range",
];

/// Canonical header block and signed-header list for AWS Signature Version 4.
pub fn aws_canonical_headers(headers: &HeaderMap) -> (String, String) {
    let mut names: Vec<&str> = headers
        .keys()
        .map(|name| name.as_str())
        .filter(|name| !AWS_UNSIGNABLE.contains(name))
        .collect();
    names.sort_unstable();
    names.dedup();

    let canonical = names
        .iter()
        .map(|name| {
            let values = headers
                .get_all(*name)
                .iter()
                .map(|value| collapse_whitespace(&String::from_utf8_lossy(value.as_bytes())))
                .collect::<Vec<_>>()
                .join(",");
            format!("{name}:{values}\n")
        })
        .collect::<String>();
    (canonical, names.join(";"))
}

/// Escape `value` for use inside an HTTP quoted-string.
pub fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
