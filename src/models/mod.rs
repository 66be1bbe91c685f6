pub mod error;
pub mod event;

pub use error::BridgeError;
pub use event::{
    CommandEvent, ControlEvent, EventShape, GatewayEvent, HttpApiEvent, LambdaIntegrationEvent,
    RestApiEvent,
};
