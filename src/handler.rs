use lambda_runtime::tracing::{debug, error, info, warn};
use lambda_runtime::{Diagnostic, LambdaEvent};
use serde_json::{Map, Value};

use crate::app::{AppLoader, AppRegistry, AppResponse};
use crate::commands::CommandRegistry;
use crate::config::BridgeConfig;
use crate::environ::build_environ;
use crate::models::error::BridgeError;
use crate::models::event::{CommandEvent, GatewayEvent};
use crate::response::translate_response;

/// Everything an invocation needs, built once at cold start.
#[derive(Debug)]
pub struct Bridge {
    config: BridgeConfig,
    loader: AppLoader,
    commands: CommandRegistry,
}

impl Bridge {
    #[must_use]
    pub fn new(config: BridgeConfig, registry: AppRegistry) -> Self {
        let loader = AppLoader::new(config.app.as_deref(), registry);
        Self {
            config,
            loader,
            commands: CommandRegistry::default(),
        }
    }

    #[must_use]
    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = commands;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Handles one invocation payload.
    ///
    /// # Errors
    ///
    /// Fails for payloads matching no event shape, undecodable request
    /// bodies, unencodable response headers, and lambda-integration requests
    /// answered with a non-success status. Application load and runtime
    /// failures are answered with a 500 response instead.
    pub fn handle(&self, raw: &Value, context: &Value) -> Result<Value, BridgeError> {
        let event = GatewayEvent::classify(raw)?;

        let shape = match &event {
            GatewayEvent::Control(control) => {
                warn!(source = %control.source, "Lambda warming event received, skipping handler");
                return Ok(Value::Object(Map::new()));
            }
            GatewayEvent::Command(command) => return Ok(self.run_command(command)),
            request => request.shape().ok_or_else(|| {
                BridgeError::MalformedEvent("event does not describe an HTTP request".to_string())
            })?,
        };
        debug!(shape = shape.name(), "Classified event");

        let response = match self.loader.get() {
            Ok(app) => {
                let mut environ = build_environ(&event, raw, context, &self.config)?;
                let method = environ.get("REQUEST_METHOD").unwrap_or_default().to_string();
                let path = environ.get("PATH_INFO").unwrap_or_default().to_string();

                let response =
                    AppResponse::from_app(app.as_ref(), &mut environ).unwrap_or_else(|e| {
                        let e = BridgeError::Application(e);
                        error!(error_type = e.error_type(), error = %e, "Application failed");
                        AppResponse::internal_error()
                    });
                info!(
                    method = %method,
                    path = %path,
                    status = response.status,
                    "Request handled"
                );
                response
            }
            Err(e) => AppResponse::load_failure(&e),
        };

        let translated = translate_response(&response, shape, &self.config)?;
        Ok(serde_json::to_value(translated)?)
    }

    fn run_command(&self, command: &CommandEvent) -> Value {
        let outcome = self.commands.dispatch(&command.command, &command.data);
        if outcome.status != 0 {
            error!(command = %command.command, status = outcome.status, "Command failed");
        }
        outcome.render(self.config.legacy_command_output)
    }
}

/// Lambda event handler. Control events get `{}`, command events get the
/// command's output, request events get a gateway response.
///
/// # Errors
///
/// Returns a `Diagnostic` whose `error_type` is one of:
///
/// - `MalformedEvent`: the payload matches no known event shape
/// - `InvalidBody`: a base64-flagged request body does not decode
/// - `TooManyDuplicateHeaders`: a response header repeats more often than its name has case
///   variants
/// - `LambdaIntegrationError`: a lambda-integration request was answered outside 2xx/3xx; the
///   message is the serialized response
/// - `InvalidJson`: the response could not be serialized
pub async fn function_handler(
    bridge: &Bridge,
    event: LambdaEvent<Value>,
) -> Result<Value, Diagnostic> {
    let (payload, context) = event.into_parts();
    let context = serde_json::to_value(&context).unwrap_or_default();

    bridge.handle(&payload, &context).map_err(|e| {
        error!(error_type = e.error_type(), error = %e, "Invocation failed");
        Diagnostic::from(e)
    })
}
