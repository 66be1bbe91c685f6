use apigw_bridge::demo::{DEMO_APP, EchoApp};
use apigw_bridge::{AppRegistry, Bridge, BridgeConfig, function_handler};
use lambda_runtime::{Error, service_fn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Use Lambda runtime's built-in tracing subscriber for CloudWatch Logs
    lambda_runtime::tracing::init_default_subscriber();

    let config = BridgeConfig::load()?;
    let mut registry = AppRegistry::new();
    registry.register_app(DEMO_APP, EchoApp);

    let bridge = &Bridge::new(config, registry);
    lambda_runtime::run(service_fn(move |event| async move {
        function_handler(bridge, event).await
    }))
    .await
}
