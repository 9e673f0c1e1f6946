//! MCP surface: the manager boundary and the configuration file model.
//!
//! The wire transport lives outside this crate. The runtime only needs to
//! ask the manager what is configured, what is connected, and to route
//! `ns:op(...)` calls; anything it cannot route falls through to the
//! Provider's simulated tool call.

use std::{cell::RefCell, fs, path::Path};

use ahash::AHashMap;
use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::{
    error::{ErrorKind, OrchidError, RunResult},
    value::Value,
};

/// File names probed for configuration, in order.
const CONFIG_FILE_NAMES: &[&str] = &["orchid.config.json", ".orchidrc.json"];

/// `mcpServers` section of `orchid.config.json` / `.orchidrc.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpConfig {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: IndexMap<String, McpServerConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpServerConfig {
    pub transport: Option<McpTransport>,
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    pub cwd: Option<String>,
    pub url: Option<String>,
}

impl McpServerConfig {
    /// Effective transport: explicit, else inferred from which endpoint
    /// field is present.
    #[must_use]
    pub fn effective_transport(&self) -> Option<McpTransport> {
        self.transport.or_else(|| {
            if self.command.is_some() {
                Some(McpTransport::Stdio)
            } else if self.url.is_some() {
                Some(McpTransport::Http)
            } else {
                None
            }
        })
    }

    /// stdio servers require `command`; http servers require `url`.
    pub fn validate(&self, name: &str) -> RunResult<()> {
        match self.effective_transport() {
            Some(McpTransport::Stdio) if self.command.is_none() => Err(OrchidError::new(
                ErrorKind::ValidationError,
                format!("mcp server '{name}': stdio transport requires 'command'"),
            )),
            Some(McpTransport::Http) if self.url.is_none() => Err(OrchidError::new(
                ErrorKind::ValidationError,
                format!("mcp server '{name}': http transport requires 'url'"),
            )),
            None => Err(OrchidError::new(
                ErrorKind::ValidationError,
                format!("mcp server '{name}': neither 'command' nor 'url' configured"),
            )),
            Some(_) => Ok(()),
        }
    }
}

impl McpConfig {
    pub fn validate(&self) -> RunResult<()> {
        for (name, server) in &self.mcp_servers {
            server.validate(name)?;
        }
        Ok(())
    }
}

/// Loads the first config file found in `dirs` (script directory first,
/// then the working directory, by convention).
pub fn load_config(dirs: &[&Path]) -> RunResult<Option<McpConfig>> {
    for dir in dirs {
        for file in CONFIG_FILE_NAMES {
            let path = dir.join(file);
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|err| {
                OrchidError::new(
                    ErrorKind::ValidationError,
                    format!("cannot read {}: {err}", path.display()),
                )
            })?;
            let config: McpConfig = serde_json::from_str(&text).map_err(|err| {
                OrchidError::new(
                    ErrorKind::ValidationError,
                    format!("invalid config {}: {err}", path.display()),
                )
            })?;
            config.validate()?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}

/// The external MCP manager the runtime routes namespaced calls through.
pub trait McpManager {
    /// True when `name` appears in configuration.
    fn is_configured(&self, name: &str) -> bool;

    /// True when a live connection exists.
    fn has_server(&self, name: &str) -> bool;

    fn connect<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, RunResult<()>>;

    fn disconnect<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, RunResult<()>>;

    /// Tool names exposed by a server (empty when unknown).
    fn get_tools(&self, name: &str) -> Vec<String>;

    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        operation: &'a str,
        args: IndexMap<String, Value>,
    ) -> LocalBoxFuture<'a, RunResult<Value>>;
}

/// Manager with nothing configured; every namespaced call falls through to
/// the Provider.
#[derive(Debug, Default)]
pub struct NoMcp;

impl McpManager for NoMcp {
    fn is_configured(&self, _name: &str) -> bool {
        false
    }

    fn has_server(&self, _name: &str) -> bool {
        false
    }

    fn connect<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, RunResult<()>> {
        Box::pin(async move {
            Err(OrchidError::new(
                ErrorKind::ToolNotFound,
                format!("MCP server '{name}' is not configured"),
            ))
        })
    }

    fn disconnect<'a>(&'a self, _name: &'a str) -> LocalBoxFuture<'a, RunResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn get_tools(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }

    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        _operation: &'a str,
        _args: IndexMap<String, Value>,
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async move {
            Err(OrchidError::new(
                ErrorKind::ToolNotFound,
                format!("MCP server '{name}' is not connected"),
            ))
        })
    }
}

/// Manager that knows what is configured but has no transport.
///
/// `connect` fails with `ToolNotFound`, which the dispatcher logs before
/// falling through to the Provider — the behavior the CLI wants when a
/// config file lists servers it cannot reach.
#[derive(Debug, Default)]
pub struct ConfigOnlyMcp {
    config: McpConfig,
}

impl ConfigOnlyMcp {
    #[must_use]
    pub fn new(config: McpConfig) -> Self {
        Self { config }
    }
}

impl McpManager for ConfigOnlyMcp {
    fn is_configured(&self, name: &str) -> bool {
        self.config.mcp_servers.contains_key(name)
    }

    fn has_server(&self, _name: &str) -> bool {
        false
    }

    fn connect<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, RunResult<()>> {
        Box::pin(async move {
            Err(OrchidError::new(
                ErrorKind::ToolNotFound,
                format!("MCP server '{name}' has no transport wired in this host"),
            ))
        })
    }

    fn disconnect<'a>(&'a self, _name: &'a str) -> LocalBoxFuture<'a, RunResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn get_tools(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }

    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        _operation: &'a str,
        _args: IndexMap<String, Value>,
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async move {
            Err(OrchidError::new(
                ErrorKind::ToolNotFound,
                format!("MCP server '{name}' has no transport wired in this host"),
            ))
        })
    }
}

type ToolHandler = Box<dyn Fn(&str, &IndexMap<String, Value>) -> RunResult<Value>>;

struct StaticServer {
    tools: Vec<String>,
    handler: ToolHandler,
    connected: bool,
}

impl std::fmt::Debug for StaticServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticServer")
            .field("tools", &self.tools)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

/// In-memory manager double for tests: servers with canned tool handlers,
/// connection state tracked explicitly.
#[derive(Debug, Default)]
pub struct StaticMcp {
    servers: RefCell<AHashMap<String, StaticServer>>,
}

impl StaticMcp {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a configured (but not yet connected) server.
    #[must_use]
    pub fn server<F>(self, name: &str, tools: &[&str], handler: F) -> Self
    where
        F: Fn(&str, &IndexMap<String, Value>) -> RunResult<Value> + 'static,
    {
        self.servers.borrow_mut().insert(
            name.to_owned(),
            StaticServer {
                tools: tools.iter().map(|&t| t.to_owned()).collect(),
                handler: Box::new(handler),
                connected: false,
            },
        );
        self
    }
}

impl McpManager for StaticMcp {
    fn is_configured(&self, name: &str) -> bool {
        self.servers.borrow().contains_key(name)
    }

    fn has_server(&self, name: &str) -> bool {
        self.servers.borrow().get(name).is_some_and(|s| s.connected)
    }

    fn connect<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, RunResult<()>> {
        Box::pin(async move {
            let mut servers = self.servers.borrow_mut();
            match servers.get_mut(name) {
                Some(server) => {
                    server.connected = true;
                    Ok(())
                }
                None => Err(OrchidError::new(
                    ErrorKind::ToolNotFound,
                    format!("MCP server '{name}' is not configured"),
                )),
            }
        })
    }

    fn disconnect<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, RunResult<()>> {
        Box::pin(async move {
            if let Some(server) = self.servers.borrow_mut().get_mut(name) {
                server.connected = false;
            }
            Ok(())
        })
    }

    fn get_tools(&self, name: &str) -> Vec<String> {
        self.servers
            .borrow()
            .get(name)
            .map(|s| s.tools.clone())
            .unwrap_or_default()
    }

    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        operation: &'a str,
        args: IndexMap<String, Value>,
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async move {
            let servers = self.servers.borrow();
            let Some(server) = servers.get(name) else {
                return Err(OrchidError::new(
                    ErrorKind::ToolNotFound,
                    format!("MCP server '{name}' is not configured"),
                ));
            };
            (server.handler)(operation, &args)
        })
    }
}
