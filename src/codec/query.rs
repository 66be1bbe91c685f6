use serde_json::{Map, Value};

use super::value_as_text;

/// Form-style percent-encoding: unreserved characters stay, space becomes `+`.
#[must_use]
pub fn quote_plus(input: &str) -> String {
    urlencoding::encode(input).replace("%20", "+")
}

fn encode_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> String {
    pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}", quote_plus(key), quote_plus(&value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Encodes `queryStringParameters`. Values are taken verbatim, including any
/// comma-joined values the gateway synthesized; `null` values are skipped.
#[must_use]
pub fn encode_query(params: &Map<String, Value>) -> String {
    encode_pairs(
        params
            .iter()
            .filter_map(|(key, value)| value_as_text(value).map(|text| (key.as_str(), text))),
    )
}

/// Encodes `multiValueQueryStringParameters`, repeating a key once per value
/// in the order the values were given.
#[must_use]
pub fn encode_multi_value_query(params: &Map<String, Value>) -> String {
    encode_pairs(params.iter().flat_map(|(key, values)| {
        let texts: Vec<String> = match values {
            Value::Array(items) => items.iter().filter_map(value_as_text).collect(),
            scalar => value_as_text(scalar).into_iter().collect(),
        };
        texts.into_iter().map(move |text| (key.as_str(), text))
    }))
}

/// Form-decodes one query component. `+` becomes a space; stray `%` signs
/// are kept and invalid UTF-8 is replaced.
#[must_use]
pub fn unquote_plus(input: &str) -> String {
    let spaced = input.replace('+', " ");
    let bytes = urlencoding::decode_binary(spaced.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

fn unquote_value(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(unquote_plus(text)),
        Value::Array(items) => Value::Array(items.iter().map(unquote_value).collect()),
        other => other.clone(),
    }
}

/// Decodes keys and values of a parameter object that arrived still
/// percent-encoded, as load balancer target events deliver them.
#[must_use]
pub fn decode_query_params(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .map(|(key, value)| (unquote_plus(key), unquote_value(value)))
        .collect()
}

/// Percent-decodes a request path. Invalid UTF-8 sequences are replaced
/// rather than rejected; `+` is left alone since it only means space in queries.
#[must_use]
pub fn decode_path(raw: &str) -> String {
    let bytes = urlencoding::decode_binary(raw.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_value_query() {
        let params = json!({"param1": "value1", "param2": "value 2&x"});
        assert_eq!(
            encode_query(params.as_object().unwrap()),
            "param1=value1&param2=value+2%26x"
        );
    }

    #[test]
    fn test_multi_value_query_preserves_repetition_order() {
        let params = json!({"param2": ["value2", "value3"], "param1": ["value1"]});
        assert_eq!(
            encode_multi_value_query(params.as_object().unwrap()),
            "param2=value2&param2=value3&param1=value1"
        );
    }

    #[test]
    fn test_null_query_values_are_skipped() {
        let params = json!({"a": null, "b": "1"});
        assert_eq!(encode_query(params.as_object().unwrap()), "b=1");
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(encode_query(&Map::new()), "");
    }

    #[test]
    fn test_unquote_plus() {
        assert_eq!(unquote_plus("new%20york"), "new york");
        assert_eq!(unquote_plus("a+b%2Cc"), "a b,c");
        assert_eq!(unquote_plus("100%"), "100%");
    }

    #[test]
    fn test_decoded_params_encode_once() {
        let params = json!({"q": "new%20york", "tag": ["a%2Cb", "c"], "x%5By%5D": "1"});
        let decoded = decode_query_params(params.as_object().unwrap());

        assert_eq!(decoded["q"], "new york");
        assert_eq!(decoded["tag"], json!(["a,b", "c"]));
        assert_eq!(
            encode_multi_value_query(&decoded),
            "q=new+york&tag=a%2Cb&tag=c&x%5By%5D=1"
        );
    }

    #[test]
    fn test_decode_path() {
        assert_eq!(decode_path("/city/new%20york"), "/city/new york");
        assert_eq!(decode_path("/a+b"), "/a+b");
        assert_eq!(decode_path("/caf%C3%A9"), "/café");
        assert_eq!(decode_path("/bad%FF"), "/bad\u{FFFD}");
    }
}
