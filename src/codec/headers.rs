use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use super::case_variants;
use super::value_as_text;
use crate::models::error::BridgeError;

/// Ordered header multimap.
///
/// Lookup ignores case; storage keeps the casing of the first occurrence of
/// each name. Values under one name keep their arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMultiMap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMultiMap {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Collects `(name, value)` pairs, grouping repeated names.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Self::new();
        for (name, value) in pairs {
            map.append(name, value);
        }
        map
    }

    /// Decodes a gateway `headers` object (one value per name).
    #[must_use]
    pub fn from_single_value(headers: &Map<String, Value>) -> Self {
        let mut map = Self::new();
        for (name, value) in headers {
            if let Some(text) = value_as_text(value) {
                map.append(name.as_str(), text);
            }
        }
        map
    }

    /// Decodes a gateway `multiValueHeaders` object (a list per name).
    /// A bare scalar is accepted as a one-element list.
    #[must_use]
    pub fn from_multi_value(headers: &Map<String, Value>) -> Self {
        let mut map = Self::new();
        for (name, values) in headers {
            match values {
                Value::Array(items) => {
                    for text in items.iter().filter_map(value_as_text) {
                        map.append(name.as_str(), text);
                    }
                }
                scalar => {
                    if let Some(text) = value_as_text(scalar) {
                        map.append(name.as_str(), text);
                    }
                }
            }
        }
        map
    }

    /// Decodes a flat response map produced by [`encode_flat`](Self::encode_flat):
    /// case variants of one name fold back into a single entry.
    #[must_use]
    pub fn from_flat(headers: &FlatHeaders) -> Self {
        Self::from_pairs(headers.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Replaces every value stored under `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1 = vec![value],
            None => self.entries.push((name, vec![value])),
        }
    }

    /// First value under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    #[must_use]
    pub fn get_all(&self, name: &str) -> &[String] {
        self.position(name)
            .map_or(&[] as &[String], |index| self.entries[index].1.as_slice())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Number of distinct names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Folds an HTTP API `cookies` array into the `Cookie` header.
    pub fn merge_cookies(&mut self, cookies: &[String]) {
        if cookies.is_empty() {
            return;
        }
        let mut parts: Vec<String> = self.get_all("Cookie").to_vec();
        parts.extend(cookies.iter().cloned());
        self.insert("Cookie", parts.join("; "));
    }

    /// Encodes for a single-value response shape.
    ///
    /// A name that occurs once keeps its casing. A name that occurs N times
    /// is emitted under N distinct case variants of the name, in value order.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TooManyDuplicateHeaders`] when a name has more
    /// values than it has unused case variants.
    pub fn encode_flat(&self) -> Result<FlatHeaders, BridgeError> {
        let mut flat = FlatHeaders::default();
        for (name, values) in self.iter() {
            if let [value] = values {
                flat.push(name, value);
                continue;
            }

            let mut variants = case_variants(name);
            for value in values {
                let Some(variant) = variants.find(|variant| !flat.contains_key(variant)) else {
                    return Err(BridgeError::TooManyDuplicateHeaders {
                        name: name.to_string(),
                        values: values.len(),
                        available: case_variants(name).total(),
                    });
                };
                flat.push(variant, value);
            }
        }
        Ok(flat)
    }

    /// Encodes for a multi-value response shape.
    #[must_use]
    pub fn encode_multi_value(&self) -> MultiValueHeaders {
        MultiValueHeaders(self.entries.clone())
    }
}

/// Single-value response headers, serialized as a JSON object in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatHeaders(Vec<(String, String)>);

impl FlatHeaders {
    fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Exact (case-sensitive) key lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for FlatHeaders {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Multi-value response headers, serialized as `{"name": ["v1", "v2"]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiValueHeaders(Vec<(String, Vec<String>)>);

impl MultiValueHeaders {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for MultiValueHeaders {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, values) in &self.0 {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: &Value) -> &Map<String, Value> {
        value.as_object().unwrap()
    }

    #[test]
    fn test_lookup_is_case_insensitive_and_storage_preserves_case() {
        let headers = json!({"Content-Type": "text/html", "x-forwarded-port": "443"});
        let map = HeaderMultiMap::from_single_value(object(&headers));

        assert_eq!(map.get("content-type"), Some("text/html"));
        assert_eq!(map.get("X-Forwarded-Port"), Some("443"));
        let names: Vec<&str> = map.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Content-Type", "x-forwarded-port"]);
    }

    #[test]
    fn test_multi_value_decode_keeps_order() {
        let headers = json!({"Accept": ["text/html", "application/json"], "Host": "example.com"});
        let map = HeaderMultiMap::from_multi_value(object(&headers));

        assert_eq!(map.get_all("accept"), ["text/html", "application/json"]);
        assert_eq!(map.get("host"), Some("example.com"));
    }

    #[test]
    fn test_null_values_are_dropped() {
        let headers = json!({"X-Empty": null, "X-Num": 5});
        let map = HeaderMultiMap::from_single_value(object(&headers));

        assert!(!map.contains("X-Empty"));
        assert_eq!(map.get("x-num"), Some("5"));
    }

    #[test]
    fn test_merge_cookies() {
        let mut map = HeaderMultiMap::new();
        map.merge_cookies(&["a=1".to_string(), "b=2".to_string()]);
        assert_eq!(map.get("Cookie"), Some("a=1; b=2"));

        map.merge_cookies(&["c=3".to_string()]);
        assert_eq!(map.get_all("cookie"), ["a=1; b=2; c=3"]);
    }

    #[test]
    fn test_flat_encoding_without_duplicates_is_identity() {
        let headers = json!({"Content-Type": "text/plain", "X-Request-Id": "abc"});
        let map = HeaderMultiMap::from_single_value(object(&headers));
        let flat = map.encode_flat().unwrap();

        assert_eq!(serde_json::to_value(&flat).unwrap(), headers);
        assert_eq!(HeaderMultiMap::from_flat(&flat), map);
    }

    #[test]
    fn test_flat_encoding_is_identity_for_generated_maps() {
        let names = ["X-Custom-ID", "content-TYPE", "123", "404-x", "ETAG", "x"];
        let values = ["", "abc", "text/html; charset=utf-8", "0"];

        for size in 0..=names.len() {
            for offset in 0..values.len() {
                let map = HeaderMultiMap::from_pairs(
                    names
                        .iter()
                        .take(size)
                        .zip(values.iter().cycle().skip(offset))
                        .map(|(name, value)| (*name, *value)),
                );
                let flat = map.encode_flat().unwrap();

                assert_eq!(flat.len(), size);
                for (name, value) in map.iter() {
                    assert_eq!(flat.get(name), value.first().map(String::as_str));
                }
                assert_eq!(HeaderMultiMap::from_flat(&flat), map);
            }
        }
    }

    #[test]
    fn test_flat_encoding_spreads_duplicates_over_case_variants() {
        let map = HeaderMultiMap::from_pairs([
            ("Content-Type", "text/plain"),
            ("Set-Cookie", "CUSTOMER=WILE_E_COYOTE; Path=/"),
            ("Set-Cookie", "PART_NUMBER=ROCKET_LAUNCHER_0002; Path=/"),
            ("Set-Cookie", "LOT_NUMBER=42; Path=/"),
        ]);
        let flat = map.encode_flat().unwrap();

        assert_eq!(
            serde_json::to_value(&flat).unwrap(),
            json!({
                "Content-Type": "text/plain",
                "set-cookie": "CUSTOMER=WILE_E_COYOTE; Path=/",
                "Set-cookie": "PART_NUMBER=ROCKET_LAUNCHER_0002; Path=/",
                "sEt-cookie": "LOT_NUMBER=42; Path=/",
            })
        );

        let decoded = HeaderMultiMap::from_flat(&flat);
        assert_eq!(
            decoded.get_all("set-cookie"),
            [
                "CUSTOMER=WILE_E_COYOTE; Path=/",
                "PART_NUMBER=ROCKET_LAUNCHER_0002; Path=/",
                "LOT_NUMBER=42; Path=/",
            ]
        );
    }

    #[test]
    fn test_flat_encoding_rejects_more_values_than_variants() {
        let map = HeaderMultiMap::from_pairs([("X-1", "a"), ("x-1", "b"), ("X-1", "c")]);
        let err = map.encode_flat().unwrap_err();

        assert!(matches!(
            err,
            BridgeError::TooManyDuplicateHeaders {
                ref name,
                values: 3,
                available: 2,
            } if name == "X-1"
        ));
    }

    #[test]
    fn test_numeric_name_with_two_values_fails() {
        let map = HeaderMultiMap::from_pairs([("123", "a"), ("123", "b")]);
        assert!(map.encode_flat().is_err());
    }

    #[test]
    fn test_multi_value_encoding_groups_by_name() {
        let map = HeaderMultiMap::from_pairs([
            ("Set-Cookie", "a=1"),
            ("Content-Length", "16"),
            ("set-cookie", "b=2"),
        ]);
        let encoded = map.encode_multi_value();

        assert_eq!(
            serde_json::to_value(&encoded).unwrap(),
            json!({"Set-Cookie": ["a=1", "b=2"], "Content-Length": ["16"]})
        );
        assert_eq!(encoded.get("SET-COOKIE").map(<[String]>::len), Some(2));
    }
}
