//! Header and query-string representations used on both sides of the gateway.
//!
//! Requests arrive with single-valued maps, multi-valued maps or (HTTP API)
//! a separate cookie array. Responses leave either as a flat map, where a
//! repeated header name is spread across case variants of that name, or as a
//! multi-value map.

pub mod casing;
pub mod headers;
pub mod query;

pub use casing::{CaseVariants, case_variants};
pub use headers::{FlatHeaders, HeaderMultiMap, MultiValueHeaders};
pub use query::{
    decode_path, decode_query_params, encode_multi_value_query, encode_query, quote_plus,
    unquote_plus,
};

use serde_json::Value;

/// Renders a JSON scalar the way the gateway would have sent it as text.
/// `null` has no textual form and yields `None`.
pub(crate) fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
