//! URI helpers for the acquire engine.
//!
//! The engine treats URIs as strings and only ever needs a handful of
//! structural operations: the access scheme, the site label used in
//! descriptions, and percent re-encoding of the path component for
//! methods that do not speak encoded URIs. A full URL parser would
//! normalise strings we must pass through byte-for-byte, so this stays a
//! small splitter instead.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Everything outside unreserved characters and `/` is escaped when
/// re-encoding a path.
const PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// The access scheme, i.e. everything before the first `:`.
pub fn scheme(uri: &str) -> Option<&str> {
    let (scheme, _) = uri.split_once(':')?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
    {
        return None;
    }
    Some(scheme)
}

/// `scheme://host:port` without credentials, path or query.
///
/// URIs without an authority component (`file:/x`) reduce to `scheme:`.
pub fn site_only(uri: &str) -> String {
    let Some(scheme) = scheme(uri) else {
        return String::new();
    };
    let rest = &uri[scheme.len() + 1..];
    let Some(authority) = rest.strip_prefix("//") else {
        return format!("{scheme}:");
    };
    let authority = authority.split(['/', '?', '#']).next().unwrap_or("");
    // Strip userinfo; the site label never carries credentials.
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    format!("{scheme}://{host_port}")
}

/// Host name alone, for per-host configuration lookups.
pub fn host_of(uri: &str) -> &str {
    let Some(scheme) = scheme(uri) else {
        return "";
    };
    let rest = &uri[scheme.len() + 1..];
    let Some(authority) = rest.strip_prefix("//") else {
        return "";
    };
    let authority = authority.split(['/', '?', '#']).next().unwrap_or("");
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    host_port.rsplit_once(':').map_or(host_port, |(h, _)| h)
}

/// Site plus path, without a trailing slash; the label stored as a used
/// mirror when a redirect switches hosts.
pub fn archive_only(uri: &str) -> String {
    uri.trim_end_matches('/').to_string()
}

/// Split a URI into its prefix (scheme plus authority) and path suffix.
fn split_path(uri: &str) -> (&str, &str) {
    let Some(scheme) = scheme(uri) else {
        return (uri, "");
    };
    let after = scheme.len() + 1;
    let rest = &uri[after..];
    if let Some(authority) = rest.strip_prefix("//") {
        match authority.find('/') {
            Some(slash) => uri.split_at(after + 2 + slash),
            None => (uri, ""),
        }
    } else {
        uri.split_at(after)
    }
}

/// Percent-encode the path component, leaving scheme and authority alone.
pub fn encode_path(uri: &str) -> String {
    let (prefix, path) = split_path(uri);
    if path.is_empty() {
        return uri.to_string();
    }
    format!("{prefix}{}", utf8_percent_encode(path, PATH_ESCAPE))
}

/// Percent-decode the path component, leaving scheme and authority alone.
pub fn decode_path(uri: &str) -> String {
    let (prefix, path) = split_path(uri);
    if path.is_empty() {
        return uri.to_string();
    }
    format!("{prefix}{}", percent_decode_str(path).decode_utf8_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_extraction() {
        assert_eq!(scheme("http://a/x"), Some("http"));
        assert_eq!(scheme("tor+https://a/x"), Some("tor+https"));
        assert_eq!(scheme("copy:/x"), Some("copy"));
        assert_eq!(scheme("no-colon-here"), None);
    }

    #[test]
    fn site_only_strips_path_and_credentials() {
        assert_eq!(site_only("http://host:8080/pool/x"), "http://host:8080");
        assert_eq!(site_only("https://user:pw@host/x"), "https://host");
        assert_eq!(site_only("file:/var/lib/x"), "file:");
    }

    #[test]
    fn host_lookup() {
        assert_eq!(host_of("http://mirror.example:3142/a"), "mirror.example");
        assert_eq!(host_of("https://u@mirror.example/a"), "mirror.example");
        assert_eq!(host_of("file:/a"), "");
    }

    #[test]
    fn path_encoding_round_trip() {
        let decoded = "http://a/dists/sid/main/binary amd64/x.deb";
        let encoded = "http://a/dists/sid/main/binary%20amd64/x.deb";
        assert_eq!(encode_path(decoded), encoded);
        assert_eq!(decode_path(encoded), decoded);
    }

    #[test]
    fn encoding_leaves_authority_untouched() {
        assert_eq!(encode_path("http://a:80"), "http://a:80");
        assert_eq!(
            encode_path("http://user@a/b c"),
            "http://user@a/b%20c"
        );
    }

    #[test]
    fn re_encoding_escapes_percent_signs() {
        // A decoded path containing a literal percent must not survive
        // re-encoding unescaped.
        assert_eq!(encode_path("http://a/100% done"), "http://a/100%25%20done");
    }

    #[test]
    fn archive_only_trims_trailing_slash() {
        assert_eq!(archive_only("http://a/debian/"), "http://a/debian");
    }
}
