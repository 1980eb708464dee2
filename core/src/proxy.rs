//! Dynamic API proxy over the endpoint tree.
//!
//! # Design
//! An `ApiProxy` is a position in the shared endpoint tree plus a shared
//! `Connection`. `descend` returns a new proxy one segment deeper and never
//! touches the one it came from, so any number of traversals can branch
//! from the same node. Each proxy owns its position and its stored query
//! parameters; only the tree and the connection are shared.
//!
//! `invoke` is split into `build_request` and `parse_response` around the
//! connection's `Transport`, so the request for a position can be inspected
//! or executed by a foreign host without going through Rust's HTTP stack.
//!
//! ```no_run
//! # use habit_core::{ApiProxy, HttpMethod};
//! # fn demo(api: &ApiProxy) -> Result<(), habit_core::ApiError> {
//! let todos = api
//!     .descend("tasks")?
//!     .descend("user")?
//!     .invoke(HttpMethod::Get, &[("type", "todos")], None)?;
//! # Ok(()) }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::apidoc::EndpointRecord;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport, DEFAULT_TIMEOUT};
use crate::tree::EndpointNode;

/// Segments every documented path starts with.
pub const API_PREFIX: [&str; 2] = ["api", "v3"];

const CONTENT_TYPE: &str = "application/json";

/// The two values sent with every request: user id and API token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
    /// Fail instead of warn when a 2xx status differs from the documented one.
    pub strict: bool,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
            strict: false,
        }
    }

    pub fn with_credentials(mut self, user: &str, key: &str) -> Self {
        self.credentials = Some(Credentials {
            user: user.to_string(),
            key: key.to_string(),
        });
        self
    }
}

/// Configuration plus the transport that carries requests.
pub struct Connection {
    config: ClientConfig,
    transport: Box<dyn Transport>,
}

impl Connection {
    pub fn new(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            transport: Box::new(transport),
        }
    }

    /// Blocking `ureq` transport honouring the configured timeout.
    pub fn blocking(config: ClientConfig) -> Self {
        let transport = UreqTransport::new(config.timeout);
        Self::new(config, transport)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(3);
        if let Some(creds) = &self.config.credentials {
            headers.push(("x-api-user".to_string(), creds.user.clone()));
            headers.push(("x-api-key".to_string(), creds.key.clone()));
        }
        headers.push(("content-type".to_string(), CONTENT_TYPE.to_string()));
        headers
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ApiProxy {
    root: Arc<EndpointNode>,
    connection: Arc<Connection>,
    position: Vec<String>,
    query: Vec<(String, String)>,
}

impl ApiProxy {
    /// A proxy positioned at the tree root.
    pub fn root(tree: Arc<EndpointNode>, connection: Arc<Connection>) -> Self {
        Self {
            root: tree,
            connection,
            position: Vec::new(),
            query: Vec::new(),
        }
    }

    /// A proxy positioned at `/api/v3`, where the documented API lives.
    pub fn new(tree: Arc<EndpointNode>, connection: Arc<Connection>) -> Result<Self, ApiError> {
        Self::root(tree, connection).descend_path(API_PREFIX)
    }

    pub fn position(&self) -> &[String] {
        &self.position
    }

    /// Literal path of the current position, e.g. `/api/v3/tasks/abc`.
    pub fn path(&self) -> String {
        format!("/{}", self.position.join("/"))
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Query parameters sent with every invocation from this proxy.
    pub fn query_mut(&mut self) -> &mut Vec<(String, String)> {
        &mut self.query
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn node(&self) -> Result<&EndpointNode, ApiError> {
        self.position
            .iter()
            .try_fold(self.root.as_ref(), |node, segment| node.child(segment))
            .ok_or_else(|| ApiError::NotFound(self.path()))
    }

    /// Move one segment down. A literal child is preferred; otherwise the
    /// segment fills the parameter slot, if there is one.
    pub fn descend(&self, segment: impl AsRef<str>) -> Result<Self, ApiError> {
        let segment = segment.as_ref();
        if self.node()?.child(segment).is_none() {
            return Err(ApiError::NotFound(format!(
                "`{segment}` under {}",
                self.path()
            )));
        }
        let mut position = self.position.clone();
        position.push(segment.to_string());
        Ok(Self {
            root: Arc::clone(&self.root),
            connection: Arc::clone(&self.connection),
            position,
            query: self.query.clone(),
        })
    }

    pub fn descend_path<I, S>(&self, segments: I) -> Result<Self, ApiError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        segments
            .into_iter()
            .try_fold(self.clone(), |proxy, segment| proxy.descend(segment))
    }

    /// Segments reachable from the current position.
    pub fn keys(&self) -> Result<Vec<String>, ApiError> {
        Ok(self.node()?.keys().into_iter().map(str::to_string).collect())
    }

    /// Methods registered at the current position.
    pub fn methods(&self) -> Result<Vec<HttpMethod>, ApiError> {
        Ok(self.node()?.methods().collect())
    }

    /// Documentation for `method` at the current position.
    pub fn endpoint(&self, method: HttpMethod) -> Result<&EndpointRecord, ApiError> {
        let node = self.node()?;
        if !node.is_terminal() {
            return Err(ApiError::NotFound(format!("{} is not an endpoint", self.path())));
        }
        node.method(method).ok_or_else(|| {
            let available: Vec<String> = node.methods().map(|m| m.to_string()).collect();
            ApiError::NotFound(format!(
                "{method} {} (available: {})",
                self.path(),
                available.join(", ")
            ))
        })
    }

    fn url(&self, query: &[(String, String)]) -> Result<String, ApiError> {
        let base = &self.connection.config.base_url;
        let mut url = Url::parse(base).map_err(|_| ApiError::InvalidUrl(base.clone()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(base.clone()))?
            .pop_if_empty()
            .extend(&self.position);
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url.to_string())
    }

    /// Build the request `invoke` would send, without sending it.
    pub fn build_request(
        &self,
        method: HttpMethod,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<HttpRequest, ApiError> {
        let record = self.endpoint(method)?;

        let mut pairs = self.query.clone();
        pairs.extend(query.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        if let Some(name) = record
            .required_query()
            .find(|name| !pairs.iter().any(|(k, _)| k == name))
        {
            return Err(ApiError::MissingParameter {
                name: name.to_string(),
                endpoint: format!("{} {}", record.method, record.uri),
            });
        }

        let body = if method.has_body() {
            let empty = Value::Object(Default::default());
            let json = serde_json::to_string(body.unwrap_or(&empty))
                .map_err(|e| ApiError::Serialization(e.to_string()))?;
            Some(json)
        } else {
            None
        };

        Ok(HttpRequest {
            method,
            url: self.url(&pairs)?,
            headers: self.connection.headers(),
            body,
        })
    }

    /// Interpret a response to a request built for `method` at this
    /// position. Returns the `data` member of the service's envelope when
    /// present, else the whole JSON document.
    pub fn parse_response(&self, method: HttpMethod, response: HttpResponse) -> Result<Value, ApiError> {
        let record = self.endpoint(method)?;

        if !response.is_success() {
            return Err(ApiError::Api {
                status: response.status,
                message: error_message(&response),
            });
        }
        if response.status != record.retcode {
            let endpoint = format!("{} {}", record.method, record.uri);
            if self.connection.config.strict {
                return Err(ApiError::UnexpectedStatus {
                    status: response.status,
                    expected: record.retcode,
                    endpoint,
                });
            }
            tracing::warn!(
                status = response.status,
                expected = record.retcode,
                %endpoint,
                "unexpected status, the api documentation may be out of date"
            );
        }

        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value: Value =
            serde_json::from_str(&response.body).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(match value {
            Value::Object(mut envelope) => match envelope.remove("data") {
                Some(data) => data,
                None => Value::Object(envelope),
            },
            other => other,
        })
    }

    /// Send `method` to the current position and return the payload.
    pub fn invoke(
        &self,
        method: HttpMethod,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let request = self.build_request(method, query, body)?;
        let response = self.connection.transport.execute(&request)?;
        self.parse_response(method, response)
    }
}

fn error_message(response: &HttpResponse) -> String {
    serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            let body = response.body.trim();
            if body.is_empty() {
                format!("status {}", response.status)
            } else {
                body.to_string()
            }
        })
}
