//! Built-in echo application, registered as `demo.app` by the bundled binary.

use std::io::Read;

use serde_json::json;

use crate::app::{Application, StartResponse};
use crate::environ::Environ;

pub const DEMO_APP: &str = "demo.app";

/// Answers every request with a JSON description of what it received.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoApp;

impl Application for EchoApp {
    fn call(
        &self,
        environ: &mut Environ,
        start_response: &mut dyn StartResponse,
    ) -> anyhow::Result<Vec<Vec<u8>>> {
        let mut body = String::new();
        environ.input.read_to_string(&mut body)?;

        let payload = json!({
            "method": environ.get("REQUEST_METHOD"),
            "scriptName": environ.get("SCRIPT_NAME"),
            "path": environ.get("PATH_INFO"),
            "query": environ.get("QUERY_STRING"),
            "remoteUser": environ.get("REMOTE_USER"),
            "body": body,
        });

        start_response.start(
            "200 OK",
            vec![("Content-Type".to_string(), "application/json".to_string())],
        );
        Ok(vec![serde_json::to_vec(&payload)?])
    }
}
