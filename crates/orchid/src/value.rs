//! Runtime value model.
//!
//! Every expression evaluates to a [`Value`]. Compound payloads are behind
//! `Rc`, so cloning a value is a reference-count bump; the language never
//! mutates a value in place (assignment rebinds names, `+=` builds a merged
//! value), which is what makes checkpoint and atomic snapshots cheap table
//! clones rather than deep copies.

use std::{fmt, rc::Rc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    ast::{Param, Spanned},
    env::ScopeId,
};

/// Duration suffix carried by a number literal (`5s`, `2m`, `1h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Seconds,
    Minutes,
    Hours,
}

impl Unit {
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Seconds),
            'm' => Some(Self::Minutes),
            'h' => Some(Self::Hours),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Seconds => 's',
            Self::Minutes => 'm',
            Self::Hours => 'h',
        }
    }
}

/// Media classification of an [`Asset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum MediaType {
    Image,
    Audio,
    Video,
    Document,
}

/// A non-textual payload handed to the Provider as an attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub media: MediaType,
    pub mime: String,
    pub path: Option<String>,
    pub url: Option<String>,
    pub bytes: Option<Vec<u8>>,
    pub description: String,
}

/// A named event with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EventValue {
    pub name: String,
    pub payload: Value,
}

/// Runtime representation of a macro or agent.
///
/// Holds the body AST and the [`ScopeId`] of the defining environment; the
/// scope arena is session-lifetime, so the handle never dangles.
#[derive(Debug)]
pub struct Callable {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Rc<Vec<Spanned>>,
    pub scope: ScopeId,
    pub is_agent: bool,
}

/// Primary value type of the language.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number { value: f64, unit: Option<Unit> },
    Str(Rc<str>),
    List(Rc<Vec<Value>>),
    Dict(Rc<IndexMap<String, Value>>),
    Callable(Rc<Callable>),
    Event(Rc<EventValue>),
    Asset(Rc<Asset>),
}

impl Value {
    #[must_use]
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    #[must_use]
    pub fn number(value: f64) -> Self {
        Self::Number { value, unit: None }
    }

    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self::List(Rc::new(items))
    }

    #[must_use]
    pub fn dict(entries: IndexMap<String, Self>) -> Self {
        Self::Dict(Rc::new(entries))
    }

    #[must_use]
    pub fn event(name: impl Into<String>, payload: Self) -> Self {
        Self::Event(Rc::new(EventValue {
            name: name.into(),
            payload,
        }))
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number { .. } => "number",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Callable(c) => {
                if c.is_agent {
                    "agent"
                } else {
                    "macro"
                }
            }
            Self::Event(_) => "event",
            Self::Asset(_) => "asset",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Truthiness: null, false, 0, NaN, and empty strings/lists/dicts are
    /// falsy; everything else is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number { value, .. } => !value.is_nan() && *value != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Dict(entries) => !entries.is_empty(),
            Self::Callable(_) | Self::Event(_) | Self::Asset(_) => true,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number { value, .. } => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Display form used for interpolation, provider inputs, and `Log`.
    #[must_use]
    pub fn display(&self) -> String {
        self.to_string()
    }

    /// Semantic merge, the meaning of `+`.
    ///
    /// Number+number adds, string+string joins with a blank line, list+list
    /// concatenates, dict+dict merges right-biased; any other pairing joins
    /// the display forms with a blank line.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        match (self, other) {
            (
                Self::Number { value: a, unit: ua },
                Self::Number { value: b, unit: ub },
            ) => Self::Number {
                value: a + b,
                unit: if ua == ub { *ua } else { None },
            },
            (Self::Str(a), Self::Str(b)) => Self::string(format!("{a}\n\n{b}")),
            (Self::List(a), Self::List(b)) => {
                let mut items = a.as_ref().clone();
                items.extend(b.iter().cloned());
                Self::list(items)
            }
            (Self::Dict(a), Self::Dict(b)) => {
                let mut entries = a.as_ref().clone();
                for (k, v) in b.iter() {
                    entries.insert(k.clone(), v.clone());
                }
                Self::dict(entries)
            }
            (a, b) => Self::string(format!("{a}\n\n{b}")),
        }
    }

    /// Canonical stringification used for cache keys: like display, except
    /// dict keys are sorted so key order does not defeat memoization.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::Dict(entries) => {
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                let body: Vec<String> = keys
                    .into_iter()
                    .map(|k| format!("{k}: {}", entries[k].canonical()))
                    .collect();
                format!("{{{}}}", body.join(", "))
            }
            Self::List(items) => {
                let body: Vec<String> = items.iter().map(Self::canonical).collect();
                format!("[{}]", body.join(", "))
            }
            other => other.to_string(),
        }
    }
}

/// Formats an `f64` the way scripts expect: no trailing `.0` on whole
/// numbers.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number { value, unit } => {
                write!(f, "{}", format_number(*value))?;
                if let Some(unit) = unit {
                    write!(f, "{}", unit.as_char())?;
                }
                Ok(())
            }
            Self::Str(s) => write!(f, "{s}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Self::Callable(c) => {
                let kind = if c.is_agent { "agent" } else { "macro" };
                write!(f, "<{kind} {}>", c.name)
            }
            Self::Event(ev) => write!(f, "Event({}, {})", ev.name, ev.payload),
            Self::Asset(asset) => write!(f, "<{} asset: {}>", asset.media, asset.description),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality. Numbers compare by numeric value (the duration
    /// suffix is a presentation hint); callables compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number { value: a, .. }, Self::Number { value: b, .. }) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Self::Callable(a), Self::Callable(b)) => Rc::ptr_eq(a, b),
            (Self::Event(a), Self::Event(b)) => a == b,
            (Self::Asset(a), Self::Asset(b)) => a == b,
            _ => false,
        }
    }
}
