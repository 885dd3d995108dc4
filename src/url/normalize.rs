use ::url::Url;

use crate::{UrlError, UrlResult};

/// Tracking query keys removed during canonicalization
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid"];

/// Schemes that are navigation traps rather than fetchable documents
const TRAP_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Canonicalizes a URL, resolving relatives against `base`
///
/// # Canonical form
///
/// 1. Scheme and host lowercased; only `http`/`https` accepted
/// 2. Default ports (80/443) stripped
/// 3. Fragment removed
/// 4. `.`/`..` path segments resolved, duplicate slashes collapsed
/// 5. Trailing slash stripped except at the root
/// 6. Unreserved percent-escapes decoded in the path
/// 7. Tracking query keys (`utm_*`, `fbclid`, `gclid`) removed
/// 8. Remaining query keys sorted lexicographically
///
/// Two URLs are equal iff their canonical strings are byte-equal, and the
/// function is idempotent: `canonicalize(canonicalize(u)) == canonicalize(u)`.
///
/// # Errors
///
/// Rejects empty input, fragment-only links, trap schemes (`javascript:`,
/// `mailto:`, `tel:`, `data:`), non-http(s) schemes, and URLs without a host.
pub fn canonicalize(raw: &str, base: Option<&Url>) -> UrlResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Malformed("empty URL".to_string()));
    }
    if trimmed.starts_with('#') {
        return Err(UrlError::Malformed("fragment-only link".to_string()));
    }

    let lower = trimmed.to_ascii_lowercase();
    for scheme in TRAP_SCHEMES {
        if lower.starts_with(scheme) {
            return Err(UrlError::InvalidScheme(
                scheme.trim_end_matches(':').to_string(),
            ));
        }
    }

    let mut url = match base {
        Some(base) => base
            .join(trimmed)
            .map_err(|e| UrlError::Parse(e.to_string()))?,
        None => Url::parse(trimmed).map_err(|e| UrlError::Parse(e.to_string()))?,
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingHost),
    }

    url.set_fragment(None);

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    if url.query().is_some() {
        let params = filter_and_sort_query(&url);
        url.set_query(None);
        if !params.is_empty() {
            let mut serializer = url.query_pairs_mut();
            for (key, value) in &params {
                serializer.append_pair(key, value);
            }
        }
    }

    Ok(url)
}

/// Normalizes a path: dot segments, duplicate slashes, trailing slash,
/// unreserved percent-escapes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<String> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(decode_unreserved(segment)),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Decodes `%XX` escapes whose byte is an unreserved character
///
/// Percent-encoded paths from a parsed Url are pure ASCII, so byte-wise
/// reassembly is safe here.
fn decode_unreserved(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                let decoded = hi * 16 + lo;
                if decoded.is_ascii_alphanumeric() || matches!(decoded, b'-' | b'.' | b'_' | b'~') {
                    out.push(decoded as char);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }

    out
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Filters out tracking parameters and sorts the remainder by key
fn filter_and_sort_query(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
