//! Gateway event shapes.
//!
//! Every invocation payload is classified exactly once into a
//! [`GatewayEvent`]; later stages match on the variant instead of probing
//! the raw JSON again.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::error::BridgeError;

/// Key carrying out-of-band commands instead of an HTTP request.
pub const COMMAND_KEY: &str = "_apigw-bridge";

/// `source` values of scheduled triggers and warm-up probes.
pub const CONTROL_SOURCES: [&str; 2] = ["aws.events", "serverless-plugin-warmup"];

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub source_ip: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestRequestContext {
    pub stage: Option<String>,
    pub identity: Option<Identity>,
    pub authorizer: Option<Value>,
    pub elb: Option<Value>,
}

/// REST API (payload v1) proxy event. Also the shape of ALB target events.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestApiEvent {
    pub http_method: String,
    pub path: String,
    pub headers: Option<Map<String, Value>>,
    pub multi_value_headers: Option<Map<String, Value>>,
    pub query_string_parameters: Option<Map<String, Value>>,
    pub multi_value_query_string_parameters: Option<Map<String, Value>>,
    pub body: Option<String>,
    pub is_base64_encoded: Option<bool>,
    #[serde(default)]
    pub request_context: RestRequestContext,
    pub path_parameters: Option<Value>,
    pub stage_variables: Option<Value>,
}

impl RestApiEvent {
    /// Whether the event carries `multiValueHeaders`, which also selects the
    /// multi-value response shape.
    #[must_use]
    pub const fn is_multi_value(&self) -> bool {
        self.multi_value_headers.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpDescription {
    pub method: String,
    pub path: Option<String>,
    pub protocol: Option<String>,
    pub source_ip: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestContext {
    pub stage: Option<String>,
    pub http: HttpDescription,
    pub authorizer: Option<Value>,
}

/// HTTP API (payload v2) event.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpApiEvent {
    pub version: Option<String>,
    pub raw_path: String,
    pub raw_query_string: Option<String>,
    pub cookies: Option<Vec<String>>,
    pub headers: Option<Map<String, Value>>,
    pub query_string_parameters: Option<Map<String, Value>>,
    pub body: Option<String>,
    pub is_base64_encoded: Option<bool>,
    pub request_context: HttpRequestContext,
    pub stage_variables: Option<Value>,
}

/// Non-proxy "lambda" integration event: a flattened request template
/// without `requestContext`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LambdaIntegrationEvent {
    pub method: String,
    pub request_path: Option<String>,
    /// Path parameters (an object), or the literal path in older templates.
    pub path: Option<Value>,
    pub query: Option<Map<String, Value>>,
    pub headers: Option<Map<String, Value>>,
    /// Already parsed by the integration template.
    pub body: Option<Value>,
    pub identity: Option<Identity>,
    pub stage: Option<String>,
    pub stage_variables: Option<Value>,
    pub principal_id: Option<String>,
    pub enhanced_auth_context: Option<Value>,
}

/// Scheduled trigger or warm-up probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    pub source: String,
}

/// Out-of-band command payload.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CommandEvent {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    RestApi(RestApiEvent),
    HttpApi(HttpApiEvent),
    LoadBalancer(RestApiEvent),
    LambdaIntegration(LambdaIntegrationEvent),
    Control(ControlEvent),
    Command(CommandEvent),
}

/// The request shape a response has to mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventShape {
    RestApi { multi_value: bool },
    HttpApi,
    LoadBalancer { multi_value: bool },
    LambdaIntegration,
}

impl EventShape {
    #[must_use]
    pub const fn is_multi_value(self) -> bool {
        matches!(
            self,
            Self::RestApi { multi_value: true } | Self::LoadBalancer { multi_value: true }
        )
    }

    #[must_use]
    pub const fn is_load_balancer(self) -> bool {
        matches!(self, Self::LoadBalancer { .. })
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RestApi { .. } => "rest-api",
            Self::HttpApi => "http-api",
            Self::LoadBalancer { .. } => "load-balancer",
            Self::LambdaIntegration => "lambda-integration",
        }
    }
}

fn parse<'a, T: Deserialize<'a>>(raw: &'a Value, shape: &str) -> Result<T, BridgeError> {
    T::deserialize(raw)
        .map_err(|e| BridgeError::MalformedEvent(format!("invalid {shape} event: {e}")))
}

impl GatewayEvent {
    /// Classifies a raw invocation payload.
    ///
    /// Order: control sentinel, command key, HTTP API (`version` 2.0 or
    /// `rawPath`), load balancer (`requestContext.elb`), REST API
    /// (`httpMethod`), lambda integration (`method` without `requestContext`).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MalformedEvent`] when the payload is not an
    /// object, matches no shape, or lacks a field its shape requires.
    pub fn classify(raw: &Value) -> Result<Self, BridgeError> {
        let Some(object) = raw.as_object() else {
            return Err(BridgeError::MalformedEvent(
                "event is not a JSON object".to_string(),
            ));
        };

        if let Some(source) = object.get("source").and_then(Value::as_str)
            && CONTROL_SOURCES.contains(&source)
        {
            return Ok(Self::Control(ControlEvent {
                source: source.to_string(),
            }));
        }

        if let Some(meta) = object.get(COMMAND_KEY) {
            return parse(meta, "command").map(Self::Command);
        }

        if object.get("version").and_then(Value::as_str) == Some("2.0")
            || object.contains_key("rawPath")
        {
            return parse(raw, "HTTP API").map(Self::HttpApi);
        }

        let request_context = object.get("requestContext").filter(|c| !c.is_null());

        if request_context
            .and_then(|context| context.get("elb"))
            .is_some_and(|elb| !elb.is_null())
        {
            return parse(raw, "load balancer").map(Self::LoadBalancer);
        }

        if object.contains_key("httpMethod") {
            return parse(raw, "REST API").map(Self::RestApi);
        }

        if request_context.is_none() && object.contains_key("method") {
            return parse(raw, "lambda integration").map(Self::LambdaIntegration);
        }

        Err(BridgeError::MalformedEvent(
            "unrecognized event shape".to_string(),
        ))
    }

    /// Response shape for request variants; `None` for control and command events.
    #[must_use]
    pub const fn shape(&self) -> Option<EventShape> {
        match self {
            Self::RestApi(event) => Some(EventShape::RestApi {
                multi_value: event.is_multi_value(),
            }),
            Self::HttpApi(_) => Some(EventShape::HttpApi),
            Self::LoadBalancer(event) => Some(EventShape::LoadBalancer {
                multi_value: event.is_multi_value(),
            }),
            Self::LambdaIntegration(_) => Some(EventShape::LambdaIntegration),
            Self::Control(_) | Self::Command(_) => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scheduled_and_warmup_sources_are_control_events() {
        for source in CONTROL_SOURCES {
            let event = GatewayEvent::classify(&json!({"source": source})).unwrap();
            assert_eq!(
                event,
                GatewayEvent::Control(ControlEvent {
                    source: source.to_string()
                })
            );
        }
    }

    #[test]
    fn test_command_event() {
        let raw = json!({COMMAND_KEY: {"command": "command", "data": "echo hi"}});
        let event = GatewayEvent::classify(&raw).unwrap();
        assert_eq!(
            event,
            GatewayEvent::Command(CommandEvent {
                command: "command".to_string(),
                data: "echo hi".to_string()
            })
        );
    }

    #[test]
    fn test_control_check_runs_before_command_check() {
        let raw = json!({"source": "aws.events", COMMAND_KEY: {"command": "exec"}});
        assert!(matches!(
            GatewayEvent::classify(&raw).unwrap(),
            GatewayEvent::Control(_)
        ));
    }

    #[test]
    fn test_http_api_event() {
        let raw = json!({
            "version": "2.0",
            "rawPath": "/dev/hello",
            "rawQueryString": "a=1",
            "requestContext": {"stage": "dev", "http": {"method": "POST", "sourceIp": "1.2.3.4"}}
        });
        let event = GatewayEvent::classify(&raw).unwrap();
        assert_eq!(event.shape(), Some(EventShape::HttpApi));
    }

    #[test]
    fn test_load_balancer_event() {
        let raw = json!({
            "requestContext": {"elb": {"targetGroupArn": "arn"}},
            "httpMethod": "GET",
            "path": "/cats",
            "multiValueHeaders": {"host": ["example.com"]}
        });
        let event = GatewayEvent::classify(&raw).unwrap();
        assert_eq!(
            event.shape(),
            Some(EventShape::LoadBalancer { multi_value: true })
        );
    }

    #[test]
    fn test_rest_api_event() {
        let raw = json!({
            "httpMethod": "GET",
            "path": "/some/path",
            "headers": {"Host": "example.com"},
            "requestContext": {"stage": "dev"}
        });
        let event = GatewayEvent::classify(&raw).unwrap();
        assert_eq!(
            event.shape(),
            Some(EventShape::RestApi { multi_value: false })
        );
    }

    #[test]
    fn test_lambda_integration_event() {
        let raw = json!({
            "method": "GET",
            "requestPath": "/users/{id}",
            "path": {"id": "7"},
            "headers": {},
            "enhancedAuthContext": {"principalId": "user"}
        });
        let event = GatewayEvent::classify(&raw).unwrap();
        assert_eq!(event.shape(), Some(EventShape::LambdaIntegration));
    }

    #[test]
    fn test_unknown_shape_fails_fast() {
        let err = GatewayEvent::classify(&json!({"foo": "bar"})).unwrap_err();
        assert_eq!(err.error_type(), "MalformedEvent");

        let err = GatewayEvent::classify(&json!("text")).unwrap_err();
        assert!(err.to_string().contains("not a JSON object"));
    }

    #[test]
    fn test_missing_required_field_fails_fast() {
        let err = GatewayEvent::classify(&json!({"httpMethod": "GET"})).unwrap_err();
        assert!(err.to_string().contains("invalid REST API event"));
    }
}
