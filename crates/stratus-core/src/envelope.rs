//! Root-wrapper JSON envelopes.
//!
//! Request and response bodies nest their payload under a single top-level
//! key naming the resource (`{"server": {...}}`, `{"volumes": [...]}`). The
//! key is always passed in as a value.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Default name of the sibling links array for a collection key.
#[must_use]
pub fn links_key_for(collection_key: &str) -> String {
    format!("{collection_key}_links")
}

/// Parse a response body into a JSON document.
///
/// Returns `Ok(None)` for an empty (or whitespace-only) body.
///
/// # Errors
///
/// Returns [`Error::Deserialization`] when the body is not valid JSON.
pub fn parse_document(body: &[u8]) -> Result<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body).map(Some).map_err(Error::from)
}

/// Unwrap the payload stored under `key` and convert it to `T`.
///
/// # Errors
///
/// Returns [`Error::Deserialization`] when the body is empty, is not JSON, is
/// missing `key`, or the payload does not match `T`.
pub fn decode<T>(body: &[u8], key: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    decode_optional(body, key)?.ok_or_else(|| {
        Error::Deserialization(format!("missing required envelope key `{key}`"))
    })
}

/// Unwrap the payload stored under `key`, treating absence as no data.
///
/// An empty body, a JSON `null` document, a missing key, or a `null` value
/// under the key all yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`Error::Deserialization`] when the body is not JSON or the
/// payload does not match `T`.
pub fn decode_optional<T>(body: &[u8], key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    let Some(mut document) = parse_document(body)? else {
        return Ok(None);
    };
    take_optional(&mut document, key)
}

/// Remove and convert the payload under `key` from an already parsed document.
///
/// # Errors
///
/// Returns [`Error::Deserialization`] when the payload does not match `T`.
pub fn take_optional<T>(document: &mut Value, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    match document.as_object_mut().and_then(|root| root.remove(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(payload) => serde_json::from_value(payload)
            .map(Some)
            .map_err(|err| Error::Deserialization(format!("invalid `{key}` payload: {err}"))),
    }
}

/// Wrap `value` as `{ key: value }`.
///
/// # Errors
///
/// Returns [`Error::Deserialization`] when `value` cannot be represented as JSON.
pub fn encode<T>(key: &str, value: &T) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_value(value)?;
    let mut root = Map::with_capacity(1);
    root.insert(key.to_string(), payload);
    Ok(Value::Object(root))
}

/// Find the `href` of the link whose `rel` is `next` (ASCII case-insensitive).
///
/// A missing links array, a non-array value, or entries without string
/// `rel`/`href` fields are skipped rather than treated as errors.
#[must_use]
pub fn next_link(document: &Value, links_key: &str) -> Option<String> {
    document
        .get(links_key)?
        .as_array()?
        .iter()
        .filter(|link| {
            link.get("rel")
                .and_then(Value::as_str)
                .is_some_and(|rel| rel.eq_ignore_ascii_case("next"))
        })
        .find_map(|link| link.get("href").and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Flavor {
        id: String,
        ram: u32,
    }

    #[test]
    fn decode_unwraps_root_key() {
        let body = br#"{"flavor": {"id": "m1.small", "ram": 2048}}"#;
        let flavor: Flavor = decode(body, "flavor").unwrap();
        assert_eq!(
            flavor,
            Flavor {
                id: "m1.small".to_string(),
                ram: 2048
            }
        );
    }

    #[test]
    fn decode_requires_the_key() {
        let err = decode::<Flavor>(br#"{"server": {}}"#, "flavor").unwrap_err();
        assert!(matches!(err, Error::Deserialization(ref msg) if msg.contains("flavor")));

        let err = decode::<Flavor>(b"", "flavor").unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn decode_rejects_malformed_json() {
        let err = decode::<Flavor>(b"{not json", "flavor").unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn decode_optional_degrades_to_none() {
        assert_eq!(decode_optional::<Vec<Flavor>>(b"", "flavors").unwrap(), None);
        assert_eq!(decode_optional::<Vec<Flavor>>(b"  \n", "flavors").unwrap(), None);
        assert_eq!(decode_optional::<Vec<Flavor>>(b"null", "flavors").unwrap(), None);
        assert_eq!(
            decode_optional::<Vec<Flavor>>(br#"{"servers": []}"#, "flavors").unwrap(),
            None
        );
        assert_eq!(
            decode_optional::<Vec<Flavor>>(br#"{"flavors": null}"#, "flavors").unwrap(),
            None
        );
    }

    #[test]
    fn decode_optional_reports_shape_mismatch() {
        let err = decode_optional::<Vec<Flavor>>(br#"{"flavors": 3}"#, "flavors").unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn encode_wraps_payload() {
        let flavor = Flavor {
            id: "m1.tiny".to_string(),
            ram: 512,
        };
        let wrapped = encode("flavor", &flavor).unwrap();
        assert_eq!(wrapped, json!({"flavor": {"id": "m1.tiny", "ram": 512}}));
    }

    #[test]
    fn next_link_matches_rel_case_insensitively() {
        let doc = json!({
            "servers": [],
            "servers_links": [
                {"rel": "self", "href": "http://api/servers"},
                {"rel": "NEXT", "href": "http://api/servers?marker=abc"}
            ]
        });
        assert_eq!(
            next_link(&doc, "servers_links").as_deref(),
            Some("http://api/servers?marker=abc")
        );
    }

    #[test]
    fn next_link_tolerates_missing_or_malformed_links() {
        assert_eq!(next_link(&json!({"servers": []}), "servers_links"), None);
        assert_eq!(
            next_link(&json!({"servers_links": "oops"}), "servers_links"),
            None
        );
        assert_eq!(
            next_link(
                &json!({"servers_links": [{"rel": "next"}, 5, {"href": "x"}]}),
                "servers_links"
            ),
            None
        );
    }

    #[test]
    fn next_link_skips_entries_without_href() {
        let doc = json!({
            "servers_links": [
                {"rel": "next"},
                {"rel": "next", "href": 7},
                {"rel": "next", "href": "http://api/servers?marker=def"}
            ]
        });
        assert_eq!(
            next_link(&doc, "servers_links").as_deref(),
            Some("http://api/servers?marker=def")
        );
    }

    #[test]
    fn links_key_defaults_to_suffix() {
        assert_eq!(links_key_for("volumes"), "volumes_links");
    }
}
