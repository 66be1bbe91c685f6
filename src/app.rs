//! Application interface and lazy application loading.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use lambda_runtime::tracing::{info, warn};

use crate::environ::Environ;
use crate::models::error::BridgeError;

/// Application path used when none is configured.
pub const DEFAULT_APP: &str = "app.app";

/// Receives the status line and headers before the body is produced.
pub trait StartResponse {
    fn start(&mut self, status: &str, headers: Vec<(String, String)>);
}

/// A request handler following the environ / start-response contract:
/// it calls `start_response` once, then returns the body in chunks.
pub trait Application: Send + Sync {
    /// # Errors
    ///
    /// Any error is reported as a 500 response.
    fn call(
        &self,
        environ: &mut Environ,
        start_response: &mut dyn StartResponse,
    ) -> anyhow::Result<Vec<Vec<u8>>>;
}

impl<F> Application for F
where
    F: Fn(&mut Environ, &mut dyn StartResponse) -> anyhow::Result<Vec<Vec<u8>>> + Send + Sync,
{
    fn call(
        &self,
        environ: &mut Environ,
        start_response: &mut dyn StartResponse,
    ) -> anyhow::Result<Vec<Vec<u8>>> {
        self(environ, start_response)
    }
}

/// Status and headers captured from `start_response`.
#[derive(Debug, Default)]
struct Captured {
    status: Option<String>,
    headers: Vec<(String, String)>,
}

impl StartResponse for Captured {
    fn start(&mut self, status: &str, headers: Vec<(String, String)>) {
        self.status = Some(status.to_string());
        self.headers = headers;
    }
}

/// A fully collected application response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

fn parse_status(line: &str) -> anyhow::Result<u16> {
    let code = line.split_whitespace().next().unwrap_or_default();
    code.parse()
        .map_err(|_| anyhow::anyhow!("invalid status line `{line}`"))
}

impl AppResponse {
    /// Runs `app` and collects its response.
    ///
    /// # Errors
    ///
    /// Fails when the application errors, never calls `start_response`, or
    /// reports a status line without a numeric code.
    pub fn from_app(app: &dyn Application, environ: &mut Environ) -> anyhow::Result<Self> {
        let mut captured = Captured::default();
        let chunks = app.call(environ, &mut captured)?;
        let Some(status) = captured.status else {
            anyhow::bail!("application returned without calling start_response");
        };
        Ok(Self {
            status: parse_status(&status)?,
            headers: captured.headers,
            body: chunks.concat(),
        })
    }

    /// Plain-text response with the given status.
    #[must_use]
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: body.into().into_bytes(),
        }
    }

    #[must_use]
    pub fn internal_error() -> Self {
        Self::text(500, "Internal Server Error")
    }

    /// 500 response describing why the application could not be loaded.
    #[must_use]
    pub fn load_failure(error: &BridgeError) -> Self {
        Self::text(500, error.to_string())
    }
}

/// `[subdir/]module.attribute`, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSpec {
    pub subdir: Option<String>,
    pub module: String,
    pub attribute: String,
}

impl AppSpec {
    /// # Errors
    ///
    /// Returns [`BridgeError::AppLoad`] when `path` has no `.attribute` part.
    pub fn parse(path: &str) -> Result<Self, BridgeError> {
        let (subdir, rest) = match path.rsplit_once('/') {
            Some((subdir, rest)) if !subdir.is_empty() => (Some(subdir.to_string()), rest),
            Some((_, rest)) => (None, rest),
            None => (None, path),
        };
        match rest.rsplit_once('.') {
            Some((module, attribute)) if !module.is_empty() && !attribute.is_empty() => Ok(Self {
                subdir,
                module: module.to_string(),
                attribute: attribute.to_string(),
            }),
            _ => Err(BridgeError::AppLoad {
                path: path.to_string(),
                reason: "expected `module.attribute`".to_string(),
            }),
        }
    }

    /// Registry key, `module.attribute`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}", self.module, self.attribute)
    }
}

impl fmt::Display for AppSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subdir {
            Some(subdir) => write!(f, "{subdir}/{}", self.key()),
            None => f.write_str(&self.key()),
        }
    }
}

type AppFactory = Box<dyn Fn() -> anyhow::Result<Arc<dyn Application>> + Send + Sync>;

/// Applications the process can load, keyed by `module.attribute`.
#[derive(Default)]
pub struct AppRegistry {
    factories: HashMap<String, AppFactory>,
}

impl fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("AppRegistry").field("apps", &names).finish()
    }
}

impl AppRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory run on first use. A failing factory is retried on
    /// the next request.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> anyhow::Result<Arc<dyn Application>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Registers an already constructed application.
    pub fn register_app<A>(&mut self, name: impl Into<String>, app: A)
    where
        A: Application + 'static,
    {
        let app: Arc<dyn Application> = Arc::new(app);
        self.register(name, move || Ok(Arc::clone(&app)));
    }

    fn build(&self, spec: &AppSpec) -> Result<Arc<dyn Application>, BridgeError> {
        let factory = self
            .factories
            .get(&spec.key())
            .ok_or_else(|| BridgeError::AppLoad {
                path: spec.to_string(),
                reason: "no application registered under this name".to_string(),
            })?;
        factory().map_err(|e| BridgeError::AppLoad {
            path: spec.to_string(),
            reason: format!("{e:#}"),
        })
    }
}

/// Resolves the configured application once per process.
pub struct AppLoader {
    path: String,
    registry: AppRegistry,
    app: OnceLock<Arc<dyn Application>>,
}

impl fmt::Debug for AppLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppLoader")
            .field("path", &self.path)
            .field("registry", &self.registry)
            .field("loaded", &self.app.get().is_some())
            .finish()
    }
}

impl AppLoader {
    #[must_use]
    pub fn new(path: Option<&str>, registry: AppRegistry) -> Self {
        Self {
            path: path.unwrap_or(DEFAULT_APP).to_string(),
            registry,
            app: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the loaded application, loading it on first call.
    ///
    /// Failures are not cached: the next call tries again.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AppLoad`] when the path is invalid, names no
    /// registered application, or its factory fails.
    pub fn get(&self) -> Result<Arc<dyn Application>, BridgeError> {
        if let Some(app) = self.app.get() {
            return Ok(Arc::clone(app));
        }

        let spec = AppSpec::parse(&self.path)?;
        match self.registry.build(&spec) {
            Ok(app) => {
                info!(app = %spec, "Application loaded");
                // A concurrent first request may have won; keep whichever landed first.
                Ok(Arc::clone(self.app.get_or_init(|| app)))
            }
            Err(e) => {
                warn!(app = %spec, error = %e, "Failed to load application");
                Err(e)
            }
        }
    }

    /// Drops the cached application so the next [`get`](Self::get) reloads it.
    #[doc(hidden)]
    pub fn reset(&mut self) {
        self.app = OnceLock::new();
    }
}
