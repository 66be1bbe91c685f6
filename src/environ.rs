//! The request environment handed to an [`Application`](crate::app::Application).
//!
//! Built fresh for every invocation from a classified [`GatewayEvent`].

use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lambda_runtime::tracing::{debug, warn};
use serde_json::{Map, Value};

use crate::codec::{
    HeaderMultiMap, decode_path, decode_query_params, encode_multi_value_query, encode_query,
};
use crate::config::BridgeConfig;
use crate::models::error::BridgeError;
use crate::models::event::{GatewayEvent, HttpApiEvent, LambdaIntegrationEvent, RestApiEvent};

/// Substring identifying the gateway's own (non custom) domains.
pub const GATEWAY_DOMAIN: &str = "amazonaws.com";

/// HTTP API stage that is not part of the URL.
const DEFAULT_STAGE: &str = "$default";

pub const EVENT_KEY: &str = "serverless.event";
pub const CONTEXT_KEY: &str = "serverless.context";
pub const AUTHORIZER_KEY: &str = "serverless.authorizer";
pub const LEGACY_AUTHORIZER_KEY: &str = "API_GATEWAY_AUTHORIZER";

/// Error output handed to the application. Every complete line is
/// re-emitted as a `warn` event with target `app.errors`.
#[derive(Debug, Default)]
pub struct ErrorStream {
    pending: Vec<u8>,
    lines: usize,
}

impl ErrorStream {
    /// Number of lines forwarded so far.
    #[must_use]
    pub const fn lines(&self) -> usize {
        self.lines
    }

    fn emit(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        warn!(target: "app.errors", "{}", text.trim_end_matches('\r'));
        self.lines += 1;
    }
}

impl Write for ErrorStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            self.emit(&line[..end]);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.emit(&line);
        }
        Ok(())
    }
}

impl Drop for ErrorStream {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// One request, in the form the application interface expects.
///
/// String variables follow CGI naming (`REQUEST_METHOD`, `PATH_INFO`,
/// `HTTP_*`, ...). The body, error sink, flags and pass-through extensions
/// live in their own fields.
#[derive(Debug)]
pub struct Environ {
    vars: BTreeMap<String, String>,
    pub input: Cursor<Vec<u8>>,
    pub errors: ErrorStream,
    pub url_scheme: String,
    pub version: (u8, u8),
    pub multithread: bool,
    pub multiprocess: bool,
    pub run_once: bool,
    pub extensions: Map<String, Value>,
}

impl Default for Environ {
    fn default() -> Self {
        Self {
            vars: BTreeMap::new(),
            input: Cursor::new(Vec::new()),
            errors: ErrorStream::default(),
            url_scheme: "http".to_string(),
            version: (1, 0),
            multithread: false,
            multiprocess: false,
            run_once: false,
            extensions: Map::new(),
        }
    }
}

impl Environ {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    #[must_use]
    pub const fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    #[must_use]
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    /// The decoded request body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        self.input.get_ref()
    }
}

/// Shape-independent view of a request, filled in per event variant.
struct RequestParts {
    method: String,
    path: String,
    query_string: String,
    headers: HeaderMultiMap,
    body: Vec<u8>,
    stage: Option<String>,
    /// The raw path still carries the stage segment (HTTP API).
    path_has_stage: bool,
    remote_addr: String,
    remote_user: String,
    authorizer: Value,
}

fn decode_body(body: Option<&str>, is_base64: bool) -> Result<Vec<u8>, BridgeError> {
    match body {
        None => Ok(Vec::new()),
        Some(text) if is_base64 => Ok(STANDARD.decode(text)?),
        Some(text) => Ok(text.as_bytes().to_vec()),
    }
}

fn principal_id(authorizer: &Value) -> String {
    authorizer
        .get("principalId")
        .or_else(|| authorizer.pointer("/lambda/principalId"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn rest_headers(event: &RestApiEvent) -> HeaderMultiMap {
    match (&event.multi_value_headers, &event.headers) {
        (Some(multi), _) => HeaderMultiMap::from_multi_value(multi),
        (None, Some(single)) => HeaderMultiMap::from_single_value(single),
        (None, None) => HeaderMultiMap::new(),
    }
}

/// Load balancers forward query parameters without decoding them, so they are
/// decoded first to avoid encoding them twice.
fn rest_query(event: &RestApiEvent, load_balancer: bool) -> String {
    let decode = |params: &Map<String, Value>| {
        if load_balancer {
            decode_query_params(params)
        } else {
            params.clone()
        }
    };
    match (
        &event.multi_value_query_string_parameters,
        &event.query_string_parameters,
    ) {
        (Some(multi), _) => encode_multi_value_query(&decode(multi)),
        (None, Some(single)) => encode_query(&decode(single)),
        (None, None) => String::new(),
    }
}

fn rest_parts(event: &RestApiEvent, load_balancer: bool) -> Result<RequestParts, BridgeError> {
    let headers = rest_headers(event);
    let context = &event.request_context;
    let authorizer = context.authorizer.clone().unwrap_or(Value::Null);

    let mut remote_addr = context
        .identity
        .as_ref()
        .and_then(|identity| identity.source_ip.clone())
        .unwrap_or_default();
    if remote_addr.is_empty() && load_balancer {
        // ALB has no identity block; the client is the first forwarded hop.
        remote_addr = headers
            .get("X-Forwarded-For")
            .and_then(|forwarded| forwarded.split(',').next())
            .map(|hop| hop.trim().to_string())
            .unwrap_or_default();
    }

    Ok(RequestParts {
        method: event.http_method.clone(),
        path: event.path.clone(),
        query_string: rest_query(event, load_balancer),
        body: decode_body(
            event.body.as_deref(),
            event.is_base64_encoded.unwrap_or(false),
        )?,
        stage: if load_balancer { None } else { context.stage.clone() },
        path_has_stage: false,
        remote_addr,
        remote_user: principal_id(&authorizer),
        authorizer,
        headers,
    })
}

fn http_api_parts(event: &HttpApiEvent) -> Result<RequestParts, BridgeError> {
    let mut headers = event
        .headers
        .as_ref()
        .map(HeaderMultiMap::from_single_value)
        .unwrap_or_default();
    if let Some(cookies) = &event.cookies {
        headers.merge_cookies(cookies);
    }

    let query_string = match (&event.raw_query_string, &event.query_string_parameters) {
        (Some(raw), _) => raw.clone(),
        (None, Some(params)) => encode_query(params),
        (None, None) => String::new(),
    };

    let context = &event.request_context;
    let authorizer = context.authorizer.clone().unwrap_or(Value::Null);

    Ok(RequestParts {
        method: context.http.method.clone(),
        path: event.raw_path.clone(),
        query_string,
        body: decode_body(
            event.body.as_deref(),
            event.is_base64_encoded.unwrap_or(false),
        )?,
        stage: context.stage.clone().filter(|stage| stage != DEFAULT_STAGE),
        path_has_stage: true,
        remote_addr: context.http.source_ip.clone().unwrap_or_default(),
        remote_user: principal_id(&authorizer),
        authorizer,
        headers,
    })
}

/// Fills `{name}` and `{name+}` templates in a lambda-integration request path.
fn fill_path_template(template: &str, params: &Map<String, Value>) -> String {
    params.iter().fold(template.to_string(), |path, (name, value)| {
        let Some(value) = value.as_str() else {
            return path;
        };
        path.replace(&format!("{{{name}}}"), value)
            .replace(&format!("{{{name}+}}"), value)
    })
}

fn lambda_integration_parts(event: &LambdaIntegrationEvent) -> Result<RequestParts, BridgeError> {
    let headers = event
        .headers
        .as_ref()
        .map(HeaderMultiMap::from_single_value)
        .unwrap_or_default();

    let path = match (&event.request_path, &event.path) {
        (Some(template), Some(Value::Object(params))) => fill_path_template(template, params),
        (Some(template), _) => template.clone(),
        (None, Some(Value::String(path))) => path.clone(),
        (None, _) => {
            return Err(BridgeError::MalformedEvent(
                "lambda integration event has neither requestPath nor path".to_string(),
            ));
        }
    };

    let body = match &event.body {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(text)) => text.as_bytes().to_vec(),
        Some(Value::Object(object)) if object.is_empty() => Vec::new(),
        Some(parsed) => serde_json::to_vec(parsed)?,
    };

    let authorizer = event.enhanced_auth_context.clone().unwrap_or(Value::Null);
    let remote_user = match principal_id(&authorizer) {
        id if id.is_empty() => event.principal_id.clone().unwrap_or_default(),
        id => id,
    };

    Ok(RequestParts {
        method: event.method.clone(),
        path,
        query_string: event.query.as_ref().map(encode_query).unwrap_or_default(),
        body,
        stage: event.stage.clone(),
        path_has_stage: false,
        remote_addr: event
            .identity
            .as_ref()
            .and_then(|identity| identity.source_ip.clone())
            .unwrap_or_default(),
        remote_user,
        authorizer,
        headers,
    })
}

/// Strips `prefix` from `path` at a segment boundary. A path equal to the
/// prefix becomes `/`.
fn strip_prefix_segment(path: &str, prefix: &str) -> Option<String> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

/// Computes `(SCRIPT_NAME, PATH_INFO)`.
fn script_and_path(parts: &RequestParts, config: &BridgeConfig) -> (String, String) {
    let path = decode_path(&parts.path);

    if let Some(base_path) = config.base_path() {
        let script_name = format!("/{base_path}");
        let path_info = strip_prefix_segment(&path, &script_name).unwrap_or(path);
        return (script_name, path_info);
    }

    let on_gateway_domain = parts
        .headers
        .get("Host")
        .is_some_and(|host| host.contains(GATEWAY_DOMAIN));

    match &parts.stage {
        Some(stage) if on_gateway_domain && !config.strip_stage_path => {
            let script_name = format!("/{stage}");
            let path_info = if parts.path_has_stage {
                strip_prefix_segment(&path, &script_name).unwrap_or(path)
            } else {
                path
            };
            (script_name, path_info)
        }
        Some(stage) if parts.path_has_stage => {
            // Stage is stripped from SCRIPT_NAME, but must not leak into PATH_INFO.
            let path_info = strip_prefix_segment(&path, &format!("/{stage}")).unwrap_or(path);
            (String::new(), path_info)
        }
        _ => (String::new(), path),
    }
}

fn header_var_name(name: &str) -> String {
    format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"))
}

/// Builds the environment for a request event.
///
/// # Errors
///
/// Returns [`BridgeError::MalformedEvent`] for control and command events or a
/// request missing its path, and [`BridgeError::Base64`] when a body flagged
/// as base64 does not decode.
pub fn build_environ(
    event: &GatewayEvent,
    raw: &Value,
    context: &Value,
    config: &BridgeConfig,
) -> Result<Environ, BridgeError> {
    let parts = match event {
        GatewayEvent::RestApi(rest) => rest_parts(rest, false)?,
        GatewayEvent::LoadBalancer(rest) => rest_parts(rest, true)?,
        GatewayEvent::HttpApi(http) => http_api_parts(http)?,
        GatewayEvent::LambdaIntegration(integration) => lambda_integration_parts(integration)?,
        GatewayEvent::Control(_) | GatewayEvent::Command(_) => {
            return Err(BridgeError::MalformedEvent(
                "event does not describe an HTTP request".to_string(),
            ));
        }
    };

    let (script_name, path_info) = script_and_path(&parts, config);
    debug!(
        method = %parts.method,
        script_name = %script_name,
        path_info = %path_info,
        "Building request environment"
    );

    let mut environ = Environ::default();
    let headers = &parts.headers;

    environ.set("REQUEST_METHOD", parts.method.as_str());
    environ.set("SCRIPT_NAME", script_name);
    environ.set("PATH_INFO", path_info);
    environ.set("QUERY_STRING", parts.query_string.as_str());
    environ.set("CONTENT_LENGTH", parts.body.len().to_string());
    environ.set(
        "CONTENT_TYPE",
        headers.get("Content-Type").unwrap_or_default(),
    );
    environ.set("SERVER_NAME", headers.get("Host").unwrap_or("lambda"));
    environ.set(
        "SERVER_PORT",
        headers.get("X-Forwarded-Port").unwrap_or("80"),
    );
    environ.set("SERVER_PROTOCOL", "HTTP/1.1");
    environ.set("REMOTE_ADDR", parts.remote_addr.as_str());
    environ.set("REMOTE_USER", parts.remote_user.as_str());
    environ.url_scheme = headers
        .get("X-Forwarded-Proto")
        .unwrap_or("http")
        .to_string();

    for (name, values) in headers.iter() {
        let key = header_var_name(name);
        if key == "HTTP_CONTENT_TYPE" || key == "HTTP_CONTENT_LENGTH" {
            continue;
        }
        let separator = if name.eq_ignore_ascii_case("Cookie") { "; " } else { ", " };
        environ.set(key, values.join(separator));
    }

    environ.input = Cursor::new(parts.body);
    environ.extensions.insert(EVENT_KEY.to_string(), raw.clone());
    environ.extensions.insert(CONTEXT_KEY.to_string(), context.clone());
    environ.extensions.insert(AUTHORIZER_KEY.to_string(), parts.authorizer.clone());
    environ.extensions.insert(LEGACY_AUTHORIZER_KEY.to_string(), parts.authorizer);

    Ok(environ)
}
