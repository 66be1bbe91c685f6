//! Bridges API Gateway / ALB Lambda events to a synchronous application
//! interface and translates the application's response back into the
//! gateway's response shape.

pub mod app;
pub mod codec;
pub mod commands;
pub mod config;
pub mod demo;
pub mod environ;
pub mod handler;
pub mod models;
pub mod response;

pub use app::{AppLoader, AppRegistry, AppResponse, Application, StartResponse};
pub use config::BridgeConfig;
pub use environ::{Environ, build_environ};
pub use handler::{Bridge, function_handler};
pub use models::error::BridgeError;
pub use models::event::{EventShape, GatewayEvent};
pub use response::{GatewayResponse, translate_response};
