//! Request fingerprinting.
//!
//! Two requests get the same fingerprint when they hit the same endpoint with
//! the same parameter names, whatever the parameter values are. The proxy
//! therefore reports each URL/parameter *shape* once instead of every
//! concrete request.
//!
//! ```text
//! GET  https://a.com/api?id=1&sort=asc        -> GEThttps://a.com/api?idsort
//! POST https://a.com/login  user=x&pass=y     -> POSThttps://a.com/loginuserpass
//! GET  https://a.com/#/admin/users            -> https://a.com/#/admin/users
//! ```

use mime::Mime;
use url::{Position, Url};

use crate::features::{json_feature, multipart_feature, parameter_names, xml_feature};

/// XML media types whose tag names form the body feature.
const XML_MEDIA_TYPES: [&str; 4] = [
    "text/xml",
    "application/xml",
    "application/xhtml+xml",
    "application/atom+xml",
];

/// Builds the canonical fingerprint of a request.
///
/// `content_type` is the raw `Content-Type` header value, if any. With
/// `ignore_case` the URL part is lower-cased; that form feeds the dedup
/// digest while the case-preserving form is for display.
///
/// Client-side routed URLs (`/#/...`) are returned verbatim: they are
/// application entry points, not parameterized endpoints.
pub fn canonicalize(
    method: &str,
    link: &str,
    content_type: Option<&str>,
    body: &str,
    ignore_case: bool,
) -> String {
    if is_hash_route(link) {
        return link.to_string();
    }

    let url = match Url::parse(link) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("Cannot fingerprint unparseable URL {:?}: {}", link, e);
            return String::new();
        }
    };

    let mut base = base_string(&url, link);

    if !body.is_empty() {
        if let Some(feature) = body_feature(content_type, body) {
            base.push_str(&feature);
        }
    }

    let method = method.to_uppercase();
    if ignore_case {
        method + &base.to_lowercase()
    } else {
        method + &base
    }
}

/// MD5 hex digest of a fingerprint.
pub fn digest(fingerprint: &str) -> String {
    format!("{:x}", md5::compute(fingerprint.as_bytes()))
}

/// Detects single-page-app routes such as `https://a.com/#/users/1`.
///
/// The URL must contain a literal `/#/` and must be exactly
/// `scheme://host/path#fragment` (no query), compared ignoring case.
/// A percent-encoded `%23` is read as `#`.
pub fn is_hash_route(link: &str) -> bool {
    if link.is_empty() {
        return false;
    }

    let decoded = decode_hash_marks(link);
    let url = match Url::parse(&decoded) {
        Ok(url) => url,
        Err(_) => return false,
    };

    let rebuilt = format!(
        "{}://{}{}#{}",
        url.scheme(),
        &url[Position::BeforeHost..Position::AfterPort],
        url.path(),
        url.fragment().unwrap_or_default()
    );

    rebuilt.eq_ignore_ascii_case(url.as_str()) && url.as_str().contains("/#/")
}

/// `scheme://host[:port]/path`, plus `?names` when a query is present.
///
/// Scheme and host are lower-cased only in the query branch; the path gets
/// a `/` default only in the query-less branch.
fn base_string(url: &Url, link: &str) -> String {
    let (scheme, authority) = raw_origin(link).unwrap_or_else(|| {
        (url.scheme(), &url[Position::BeforeHost..Position::AfterPort])
    });

    match url.query().filter(|q| !q.is_empty()) {
        None => {
            let path = if url.path().is_empty() { "/" } else { url.path() };
            format!("{}://{}{}", scheme, authority, path)
        }
        Some(query) => format!(
            "{}://{}{}?{}",
            scheme.to_lowercase(),
            authority.to_lowercase(),
            url.path(),
            parameter_names(query)
        ),
    }
}

/// Scheme and `host[:port]` exactly as written in `link`.
///
/// `Url` lower-cases the host and drops default ports, which would hide
/// the case of the query-less form.
fn raw_origin(link: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = link.trim().split_once("://")?;
    let end = rest
        .find(|c| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    let authority = &rest[..end];
    let authority = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);
    (!scheme.is_empty() && !authority.is_empty()).then_some((scheme, authority))
}

/// Feature contributed by a POST body, selected by media type.
///
/// A body without a `Content-Type` contributes nothing. An unparseable
/// `Content-Type`, an unknown media type, or a broken multipart/XML payload
/// contributes the raw body. Malformed JSON contributes nothing.
fn body_feature(content_type: Option<&str>, body: &str) -> Option<String> {
    let content_type = content_type?.trim();

    let media: Mime = match content_type.parse() {
        Ok(media) => media,
        Err(_) => return Some(body.to_string()),
    };
    let essence = media.essence_str().to_ascii_lowercase();

    match essence.as_str() {
        "application/x-www-form-urlencoded" | "text/plain" => Some(parameter_names(body)),
        "application/json" | "application/hal+json" => json_feature(body),
        _ if media.type_() == mime::MULTIPART => {
            let boundary = media
                .get_param(mime::BOUNDARY)
                .map(|b| b.as_str().to_string())
                .unwrap_or_default();
            Some(multipart_feature(body, &boundary).unwrap_or_else(|| body.to_string()))
        }
        ct if XML_MEDIA_TYPES.contains(&ct) => {
            Some(xml_feature(body).unwrap_or_else(|| body.to_string()))
        }
        _ => Some(body.to_string()),
    }
}

fn decode_hash_marks(link: &str) -> String {
    link.replace("%23", "#")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: Option<&str> = Some("application/x-www-form-urlencoded");
    const JSON: Option<&str> = Some("application/json; charset=utf-8");

    fn fp(method: &str, link: &str) -> String {
        canonicalize(method, link, None, "", true)
    }

    #[test]
    fn get_without_query() {
        assert_eq!(
            canonicalize("get", "https://Example.com/Api", None, "", false),
            "GEThttps://Example.com/Api"
        );
        assert_eq!(fp("GET", "https://example.com"), "GEThttps://example.com/");
    }

    #[test]
    fn host_case_and_port_kept_only_without_query() {
        assert_eq!(
            canonicalize("GET", "HTTPS://Example.com:443/Api", None, "", false),
            "GETHTTPS://Example.com:443/Api"
        );
        assert_eq!(
            canonicalize("GET", "HTTPS://Example.com:443/Api?Id=1", None, "", false),
            "GEThttps://example.com:443/Api?Id"
        );
        assert_eq!(
            canonicalize("GET", "https://user@Example.com/Api", None, "", false),
            "GEThttps://Example.com/Api"
        );
        assert_eq!(
            fp("GET", "HTTPS://Example.com:443/Api"),
            "GEThttps://example.com:443/api"
        );
    }

    #[test]
    fn query_values_are_dropped() {
        assert_eq!(
            fp("GET", "https://example.com/api?id=1&id=2"),
            "GEThttps://example.com/api?idid"
        );
        assert_eq!(
            digest(&fp("GET", "https://example.com/api?id=1&name=x")),
            digest(&fp("GET", "https://example.com/api?id=42&name=y"))
        );
    }

    #[test]
    fn query_name_order_matters() {
        assert_ne!(
            fp("GET", "https://example.com/api?a=1&b=2"),
            fp("GET", "https://example.com/api?b=2&a=1")
        );
    }

    #[test]
    fn empty_query_contributes_nothing() {
        assert_eq!(fp("GET", "https://example.com/api?"), fp("GET", "https://example.com/api"));
    }

    #[test]
    fn port_is_part_of_the_host() {
        assert_eq!(
            fp("GET", "http://example.com:8080/x?a=1"),
            "GEThttp://example.com:8080/x?a"
        );
    }

    #[test]
    fn case_sensitive_form_keeps_path_case() {
        let link = "https://example.com/Api/Users?Id=1";
        assert_eq!(
            canonicalize("POST", link, None, "", false),
            "POSThttps://example.com/Api/Users?Id"
        );
        assert_eq!(
            canonicalize("POST", link, None, "", true),
            "POSThttps://example.com/api/users?id"
        );
    }

    #[test]
    fn method_distinguishes_fingerprints() {
        assert_ne!(fp("GET", "https://a.com/x"), fp("POST", "https://a.com/x"));
    }

    #[test]
    fn form_bodies_with_different_values_match() {
        let a = canonicalize("POST", "https://a.com/login", FORM, "user=alice&pass=secret", true);
        let b = canonicalize("POST", "https://a.com/login", FORM, "user=bob&pass=hunter2", true);
        assert_eq!(a, b);
        assert_eq!(a, "POSThttps://a.com/loginuserpass");
    }

    #[test]
    fn text_plain_uses_parameter_names() {
        let fp = canonicalize("POST", "https://a.com/p", Some("text/plain"), "k=v&z=1", true);
        assert_eq!(fp, "POSThttps://a.com/pkz");
    }

    #[test]
    fn json_body_feature() {
        let fp = canonicalize("POST", "https://a.com/api", JSON, r#"{"user":"x"}"#, true);
        assert_eq!(fp, "POSThttps://a.com/apiuser");

        let hal = canonicalize(
            "POST",
            "https://a.com/api",
            Some("application/hal+json"),
            r#"{"a":{"b":1}}"#,
            true,
        );
        assert_eq!(hal, "POSThttps://a.com/apia{}b");
    }

    #[test]
    fn malformed_json_contributes_nothing() {
        let fp = canonicalize("POST", "https://a.com/api", JSON, "{broken", true);
        assert_eq!(fp, "POSThttps://a.com/api");
    }

    #[test]
    fn multipart_body_feature() {
        let body = "--b1\r\nContent-Disposition: form-data; name=\"avatar\"\r\n\r\nxx\r\n--b1--\r\n";
        let fp = canonicalize(
            "POST",
            "https://a.com/upload",
            Some("multipart/form-data; boundary=b1"),
            body,
            true,
        );
        assert_eq!(fp, "POSThttps://a.com/uploadavatar");
    }

    #[test]
    fn multipart_without_boundary_falls_back_to_raw() {
        let fp = canonicalize("POST", "https://a.com/u", Some("multipart/form-data"), "RAW", false);
        assert_eq!(fp, "POSThttps://a.com/uRAW");
    }

    #[test]
    fn xml_body_feature() {
        let fp = canonicalize(
            "POST",
            "https://a.com/soap",
            Some("text/xml"),
            "<Envelope><Body>1</Body></Envelope>",
            false,
        );
        assert_eq!(fp, "POSThttps://a.com/soapEnvelopeBodyBodyEnvelope");
    }

    #[test]
    fn unknown_media_type_appends_raw_body() {
        let fp = canonicalize(
            "POST",
            "https://a.com/bin",
            Some("application/octet-stream"),
            "a=1&b=2",
            false,
        );
        assert_eq!(fp, "POSThttps://a.com/bina=1&b=2");
    }

    #[test]
    fn unparseable_content_type_appends_raw_body() {
        let fp = canonicalize("POST", "https://a.com/x", Some("???"), "payload", false);
        assert_eq!(fp, "POSThttps://a.com/xpayload");
    }

    #[test]
    fn body_without_content_type_is_dropped() {
        let fp = canonicalize("POST", "https://a.com/x", None, "user=a", true);
        assert_eq!(fp, "POSThttps://a.com/x");
    }

    #[test]
    fn hash_routes_are_returned_verbatim() {
        assert!(is_hash_route("https://a.b/#/x/y"));
        assert!(is_hash_route("https://a.b/%23/x/y"));
        assert_eq!(fp("GET", "https://a.b/#/x/y"), "https://a.b/#/x/y");
        assert_eq!(fp("GET", "https://a.b/%23/x/y"), "https://a.b/%23/x/y");
    }

    #[test]
    fn fragments_without_route_marker_are_not_hash_routes() {
        assert!(!is_hash_route("https://a.b/page#section"));
        assert!(!is_hash_route("https://a.b/?q=1#/x"));
        assert!(!is_hash_route("https://a.b/x/y"));
        assert!(!is_hash_route(""));
    }

    #[test]
    fn unparseable_url_yields_empty_fingerprint() {
        assert_eq!(fp("GET", "not a url"), "");
    }

    #[test]
    fn digest_is_md5_hex() {
        assert_eq!(digest(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(digest("GEThttps://a.com/").len(), 32);
    }
}
