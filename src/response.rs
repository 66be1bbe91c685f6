//! Translation of an application response into the gateway's response object.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use serde::Serialize;

use crate::app::AppResponse;
use crate::codec::{FlatHeaders, HeaderMultiMap, MultiValueHeaders};
use crate::config::BridgeConfig;
use crate::models::error::BridgeError;
use crate::models::event::EventShape;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<FlatHeaders>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_value_headers: Option<MultiValueHeaders>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_base64_encoded: Option<bool>,
}

/// `"<code> <reason>"`, as load balancers expect in `statusDescription`.
#[must_use]
pub fn status_description(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown");
    format!("{status} {reason}")
}

/// Declared MIME type without parameters, lowercased. Defaults to `text/plain`.
fn mime_type(headers: &HeaderMultiMap) -> String {
    headers
        .get("Content-Type")
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .unwrap_or("text/plain")
        .to_ascii_lowercase()
}

/// Returns the body field and its base64 flag.
fn encode_body(
    body: &[u8],
    headers: &HeaderMultiMap,
    config: &BridgeConfig,
) -> (Option<String>, Option<bool>) {
    if body.is_empty() {
        return (None, None);
    }

    if config.is_text_mime_type(&mime_type(headers)) && !headers.contains("Content-Encoding") {
        // Declared text that is not valid UTF-8 still has to survive JSON.
        if let Ok(text) = std::str::from_utf8(body) {
            return (Some(text.to_string()), Some(false));
        }
    }

    (Some(STANDARD.encode(body)), Some(true))
}

/// Builds the response object matching the originating event's shape.
///
/// # Errors
///
/// Returns [`BridgeError::TooManyDuplicateHeaders`] when flat encoding runs
/// out of case variants, and [`BridgeError::LambdaIntegrationStatus`] when a
/// lambda-integration request gets a status outside 2xx/3xx.
pub fn translate_response(
    response: &AppResponse,
    shape: EventShape,
    config: &BridgeConfig,
) -> Result<GatewayResponse, BridgeError> {
    let headers = HeaderMultiMap::from_pairs(
        response
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str())),
    );

    let (body, is_base64_encoded) = encode_body(&response.body, &headers, config);

    let mut translated = GatewayResponse {
        status_code: response.status,
        body,
        is_base64_encoded,
        ..GatewayResponse::default()
    };

    if shape.is_multi_value() {
        translated.multi_value_headers = Some(headers.encode_multi_value());
    } else {
        translated.headers = Some(headers.encode_flat()?);
    }

    if shape.is_load_balancer() {
        translated.status_description = Some(status_description(response.status));
    }

    if shape == EventShape::LambdaIntegration && !(200..400).contains(&response.status) {
        return Err(BridgeError::LambdaIntegrationStatus {
            status: response.status,
            payload: serde_json::to_string(&translated)?,
        });
    }

    Ok(translated)
}
