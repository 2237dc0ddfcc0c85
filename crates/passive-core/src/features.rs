//! Body feature strings.
//!
//! A feature string keeps the *shape* of a payload (parameter names, JSON
//! keys, XML tags, multipart field names) and drops every value, so two
//! requests that differ only in their data produce the same string.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

/// Concatenates the parameter names of an `a=1&b=2` style string.
///
/// Names keep their original order; surrounding whitespace is trimmed.
pub fn parameter_names(raw: &str) -> String {
    raw.split('&')
        .map(|pair| pair.split('=').next().unwrap_or_default().trim())
        .collect()
}

/// Feature string of a JSON object body.
///
/// Keys are emitted depth-first. A key holding an object is followed by
/// `{}` and its own keys; a key holding an array is followed by `[]` and is
/// not descended into. Returns `None` when the body is not a JSON object.
pub fn json_feature(body: &str) -> Option<String> {
    let map: Map<String, Value> = serde_json::from_str(body).ok()?;
    let mut out = String::new();
    walk_json(&map, &mut out);
    Some(out)
}

fn walk_json(map: &Map<String, Value>, out: &mut String) {
    for (key, value) in map {
        out.push_str(key);
        match value {
            Value::Object(inner) => {
                out.push_str("{}");
                walk_json(inner, out);
            }
            Value::Array(_) => out.push_str("[]"),
            _ => {}
        }
    }
}

/// Feature string of an XML body: every start and end tag's local name in
/// document order. Self-closing elements count as both.
///
/// Parsing stops at the first error. Returns `None` when the document is
/// broken before any tag could be read.
pub fn xml_feature(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    let mut out = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) => {
                out.push_str(&String::from_utf8_lossy(tag.local_name().as_ref()));
            }
            Ok(Event::End(tag)) => {
                out.push_str(&String::from_utf8_lossy(tag.local_name().as_ref()));
            }
            Ok(Event::Empty(tag)) => {
                let name = String::from_utf8_lossy(tag.local_name().as_ref()).into_owned();
                out.push_str(&name);
                out.push_str(&name);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("XML body parse stopped: {}", e);
                if out.is_empty() {
                    return None;
                }
                break;
            }
        }
    }

    Some(out)
}

/// Feature string of a multipart body: the `name` parameter of every part's
/// `Content-Disposition` header, concatenated.
///
/// Returns `None` when no part can be found for `boundary`.
pub fn multipart_feature(body: &str, boundary: &str) -> Option<String> {
    if boundary.is_empty() {
        return None;
    }

    let delimiter = format!("--{}", boundary);
    let mut out = String::new();
    let mut parts = 0usize;

    // First chunk is the preamble
    for part in body.split(delimiter.as_str()).skip(1) {
        if part.starts_with("--") {
            break;
        }
        let part = part.trim_start_matches("\r\n").trim_start_matches('\n');
        let headers = match part.split_once("\r\n\r\n").or_else(|| part.split_once("\n\n")) {
            Some((headers, _)) => headers,
            None => continue,
        };
        parts += 1;

        if let Some(name) = headers.lines().find_map(disposition_name) {
            out.push_str(&name);
        }
    }

    if parts == 0 {
        None
    } else {
        Some(out)
    }
}

/// Extracts `name` from a `Content-Disposition: form-data; name="x"` line.
fn disposition_name(line: &str) -> Option<String> {
    let (header, value) = line.split_once(':')?;
    if !header.trim().eq_ignore_ascii_case("content-disposition") {
        return None;
    }
    value.split(';').skip(1).find_map(|param| {
        let (key, val) = param.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("name")
            .then(|| val.trim().trim_matches('"').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_names_drop_values() {
        assert_eq!(parameter_names("user=alice&pass=secret"), "userpass");
        assert_eq!(parameter_names("id=1&id=2"), "idid");
        assert_eq!(parameter_names("flag&x="), "flagx");
        assert_eq!(parameter_names(" a =1& b=2"), "ab");
        assert_eq!(parameter_names(""), "");
    }

    #[test]
    fn json_nested_object_and_array() {
        let feature = json_feature(r#"{"a":{"b":1},"c":[1,2]}"#).unwrap();
        // Object keys are walked in map order; assert on the tokens.
        assert!(feature.contains("a{}b"));
        assert!(feature.contains("c[]"));
        assert_eq!(feature.len(), "a{}b".len() + "c[]".len());
    }

    #[test]
    fn json_array_contents_are_not_walked() {
        let feature = json_feature(r#"{"items":[{"hidden":1}]}"#).unwrap();
        assert_eq!(feature, "items[]");
    }

    #[test]
    fn json_values_do_not_matter() {
        assert_eq!(
            json_feature(r#"{"user":"alice","age":3}"#),
            json_feature(r#"{"user":"bob","age":99}"#)
        );
    }

    #[test]
    fn json_rejects_non_objects() {
        assert!(json_feature("{not json").is_none());
        assert!(json_feature("[1,2,3]").is_none());
        assert!(json_feature("").is_none());
    }

    #[test]
    fn xml_tags_in_document_order() {
        let body = r#"<?xml version="1.0"?><req><user>a</user><ns:pass>b</ns:pass></req>"#;
        assert_eq!(xml_feature(body).unwrap(), "requseruserpasspassreq");
    }

    #[test]
    fn xml_self_closing_counts_twice() {
        assert_eq!(xml_feature("<a><b/></a>").unwrap(), "abba");
    }

    #[test]
    fn xml_partial_on_error() {
        assert_eq!(xml_feature("<a><b></c>").unwrap(), "ab");
    }

    #[test]
    fn multipart_field_names() {
        let body = "--XyZ\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            hello\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            data\r\n\
            --XyZ--\r\n";
        assert_eq!(multipart_feature(body, "XyZ").unwrap(), "titlefile");
    }

    #[test]
    fn multipart_without_parts() {
        assert!(multipart_feature("just text", "XyZ").is_none());
        assert!(multipart_feature("--XyZ\r\nbroken", "").is_none());
    }
}
