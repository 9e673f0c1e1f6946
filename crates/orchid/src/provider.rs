//! The Provider boundary — the sole cognitive dependency.
//!
//! Reasoning macros, semantic string subtraction, `Search`, `Confidence`,
//! `Generate`, and un-routable namespaced calls all cross this trait. Every
//! method is a suspension point for the cooperative scheduler, so methods
//! return boxed local futures rather than blocking.
//!
//! Real LLM-backed providers live outside this crate; [`EchoProvider`] is
//! the deterministic double used by tests and the CLI.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use ahash::AHashSet;
use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    error::{ErrorKind, OrchidError, RunResult},
    value::{Asset, MediaType, Value},
};

/// A behavior tag after value resolution, as passed across the Provider
/// boundary (prompt hints) and to plugins.
#[derive(Debug, Clone)]
pub struct ResolvedTag {
    pub name: String,
    pub value: Option<Value>,
}

/// Output format for `Generate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum GenerateFormat {
    Text,
    Image,
    Audio,
    Video,
    Document,
}

impl GenerateFormat {
    #[must_use]
    pub fn media_type(self) -> Option<MediaType> {
        match self {
            Self::Text => None,
            Self::Image => Some(MediaType::Image),
            Self::Audio => Some(MediaType::Audio),
            Self::Video => Some(MediaType::Video),
            Self::Document => Some(MediaType::Document),
        }
    }
}

/// The external intelligence service executing reasoning operations.
pub trait Provider {
    /// Runs a reasoning operation. `context` carries stringified keyword
    /// arguments; `attachments` carries asset inputs.
    fn execute<'a>(
        &'a self,
        operation: &'a str,
        input: &'a str,
        context: &'a IndexMap<String, String>,
        tags: &'a [ResolvedTag],
        attachments: &'a [Rc<Asset>],
    ) -> LocalBoxFuture<'a, RunResult<Value>>;

    fn search<'a>(&'a self, query: &'a str, tags: &'a [ResolvedTag]) -> LocalBoxFuture<'a, RunResult<Value>>;

    /// Confidence in the accumulated result, in `[0, 1]`.
    fn confidence<'a>(&'a self, scope: Option<&'a str>) -> LocalBoxFuture<'a, RunResult<f64>>;

    /// Simulated tool call for namespaces with no live MCP connection or
    /// plugin.
    fn tool_call<'a>(
        &'a self,
        namespace: &'a str,
        operation: &'a str,
        args: &'a IndexMap<String, Value>,
        tags: &'a [ResolvedTag],
    ) -> LocalBoxFuture<'a, RunResult<Value>>;

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        format: GenerateFormat,
        tags: &'a [ResolvedTag],
    ) -> LocalBoxFuture<'a, RunResult<Value>>;
}

/// One recorded call to [`EchoProvider::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub operation: String,
    pub input: String,
}

/// Deterministic provider double.
///
/// `execute` echoes `[op] input`, list-shaped operations return lists,
/// `Subtract` removes the `remove` context entry from its input so the `-`
/// string operator is exercisable without a model. Calls are recorded for
/// assertions. Operations named in `fail_ops` (or everything, with `"*"`)
/// fail with `RuntimeError`, which is how retry/fallback paths are tested.
#[derive(Debug, Default)]
pub struct EchoProvider {
    calls: RefCell<Vec<ProviderCall>>,
    fail_ops: AHashSet<String>,
    confidence: Cell<f64>,
}

/// Operations whose providers conventionally return list values.
const LIST_OPERATIONS: &[&str] = &["Decompose", "Brainstorm", "Classify"];

impl EchoProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            fail_ops: AHashSet::new(),
            confidence: Cell::new(0.9),
        }
    }

    /// A provider that fails every listed operation (`"*"` fails all).
    #[must_use]
    pub fn failing<I, S>(ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fail_ops: ops.into_iter().map(Into::into).collect(),
            ..Self::new()
        }
    }

    pub fn set_confidence(&self, value: f64) {
        self.confidence.set(value);
    }

    /// All recorded `execute` calls, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.borrow().clone()
    }

    /// Number of `execute` calls for one operation name.
    #[must_use]
    pub fn execute_count(&self, operation: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn should_fail(&self, operation: &str) -> bool {
        self.fail_ops.contains(operation) || self.fail_ops.contains("*")
    }
}

impl Provider for EchoProvider {
    fn execute<'a>(
        &'a self,
        operation: &'a str,
        input: &'a str,
        context: &'a IndexMap<String, String>,
        _tags: &'a [ResolvedTag],
        _attachments: &'a [Rc<Asset>],
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async move {
            self.calls.borrow_mut().push(ProviderCall {
                operation: operation.to_owned(),
                input: input.to_owned(),
            });
            if self.should_fail(operation) {
                return Err(OrchidError::new(
                    ErrorKind::RuntimeError,
                    format!("provider failed operation '{operation}'"),
                ));
            }
            if operation == "Subtract" {
                let remove = context.get("remove").map(String::as_str).unwrap_or_default();
                let result = if remove.is_empty() {
                    input.to_owned()
                } else {
                    input.replace(remove, "")
                };
                return Ok(Value::string(result));
            }
            if LIST_OPERATIONS.contains(&operation) {
                let count = context
                    .get("_count")
                    .and_then(|c| c.parse::<usize>().ok())
                    .unwrap_or(3);
                let items = (1..=count)
                    .map(|i| Value::string(format!("{operation} {i}: {input}")))
                    .collect();
                return Ok(Value::list(items));
            }
            Ok(Value::string(format!("[{operation}] {input}")))
        })
    }

    fn search<'a>(&'a self, query: &'a str, _tags: &'a [ResolvedTag]) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async move {
            if self.should_fail("Search") {
                return Err(OrchidError::new(ErrorKind::RuntimeError, "provider failed operation 'Search'"));
            }
            Ok(Value::string(format!("results for {query}")))
        })
    }

    fn confidence<'a>(&'a self, _scope: Option<&'a str>) -> LocalBoxFuture<'a, RunResult<f64>> {
        Box::pin(async move { Ok(self.confidence.get()) })
    }

    fn tool_call<'a>(
        &'a self,
        namespace: &'a str,
        operation: &'a str,
        args: &'a IndexMap<String, Value>,
        _tags: &'a [ResolvedTag],
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async move {
            let rendered: Vec<String> = args.iter().map(|(k, v)| format!("{k}={v}")).collect();
            Ok(Value::string(format!(
                "[{namespace}:{operation}] {}",
                rendered.join(", ")
            )))
        })
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        format: GenerateFormat,
        _tags: &'a [ResolvedTag],
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        Box::pin(async move {
            match format.media_type() {
                None => Ok(Value::string(format!("[generated] {prompt}"))),
                Some(media) => Ok(Value::Asset(Rc::new(Asset {
                    media,
                    mime: match media {
                        MediaType::Image => "image/png".to_owned(),
                        MediaType::Audio => "audio/wav".to_owned(),
                        MediaType::Video => "video/mp4".to_owned(),
                        MediaType::Document => "application/pdf".to_owned(),
                    },
                    path: None,
                    url: None,
                    bytes: None,
                    description: prompt.to_owned(),
                }))),
            }
        })
    }
}
