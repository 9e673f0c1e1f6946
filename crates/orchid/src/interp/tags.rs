//! Behavior-tag resolution and enforcement.
//!
//! Tags are resolved once per call (values evaluated eagerly), then the
//! guarded pipeline enforces them in a fixed order: cache lookup, timeout
//! wrapper, retry loop, execute; on success the cache is updated, on
//! terminal failure `fallback`/`best_effort` apply. Tags the runtime does
//! not interpret ride along to the Provider as prompt hints.

use std::time::Duration;

use futures::future::LocalBoxFuture;

use crate::{
    ast::Tags,
    config::RETRY_DEFAULT,
    env::ScopeId,
    error::{Control, ErrorKind, Flow, OrchidError},
    provider::ResolvedTag,
    token::Pos,
    value::{Unit, Value},
};

use super::{Interp, ops::ResolvedArgs};

/// Tags after value resolution, with the runtime-interpreted ones lifted
/// into fields. `list` retains every tag for pass-through.
#[derive(Debug, Clone, Default)]
pub(crate) struct TagSet {
    pub list: Vec<ResolvedTag>,
    pub retry: Option<u32>,
    pub fallback: Option<Value>,
    pub best_effort: bool,
    pub cached: bool,
    pub private: bool,
    pub append: bool,
    pub isolated: bool,
    pub timeout: Option<Duration>,
}

impl TagSet {
    /// Total attempts the retry loop makes (`retry=2` means 3 calls).
    pub fn attempts(&self) -> usize {
        self.retry.map_or(1, |n| n as usize + 1)
    }
}

impl Interp {
    pub(crate) async fn resolve_tags(&self, tags: &Tags, scope: ScopeId) -> Flow<TagSet> {
        let mut set = TagSet::default();
        for tag in tags {
            let value = match &tag.value {
                Some(expr) => Some(self.exec(expr, scope).await?),
                None => None,
            };
            match tag.name.as_str() {
                "retry" => {
                    let count = match &value {
                        Some(Value::Number { value, .. }) => *value as u32,
                        _ => RETRY_DEFAULT,
                    };
                    set.retry = Some(count);
                }
                "fallback" => set.fallback = value.clone(),
                "best_effort" => set.best_effort = true,
                "cached" | "pure" => set.cached = true,
                "private" => set.private = true,
                "append" => set.append = true,
                "isolated" => set.isolated = true,
                "timeout" => set.timeout = value.as_ref().map(timeout_duration),
                // `frozen` acts at the assignment site; everything else is a
                // prompt hint.
                _ => {}
            }
            set.list.push(ResolvedTag {
                name: tag.name.clone(),
                value,
            });
        }
        Ok(set)
    }

    /// Runs an operation attempt through the tag pipeline. `attempt` must be
    /// re-invocable: each retry builds a fresh future (and a fresh timeout
    /// deadline).
    pub(crate) async fn run_guarded<'a, F>(
        &self,
        op_name: &str,
        tags: &TagSet,
        cache_key: Option<String>,
        pos: Pos,
        attempt: F,
    ) -> Flow<Value>
    where
        F: Fn() -> LocalBoxFuture<'a, Flow<Value>>,
    {
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.borrow().get(key) {
                self.trace(format!("cache hit for {op_name}"));
                return Ok(hit.clone());
            }
        }
        let attempts = tags.attempts();
        let mut last_err: Option<OrchidError> = None;
        for attempt_no in 1..=attempts {
            self.meter.borrow_mut().attempts += 1;
            let fut = attempt();
            let outcome = match tags.timeout {
                Some(deadline) => match tokio::time::timeout(deadline, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(Control::Raise(
                        OrchidError::new(
                            ErrorKind::Timeout,
                            format!("operation '{op_name}' timed out after {}ms", deadline.as_millis()),
                        )
                        .at(pos),
                    )),
                },
                None => fut.await,
            };
            match outcome {
                Ok(value) => {
                    if let Some(key) = &cache_key {
                        self.cache.borrow_mut().insert(key.clone(), value.clone());
                    }
                    return Ok(value);
                }
                Err(Control::Raise(err)) => {
                    self.meter.borrow_mut().failures += 1;
                    if attempt_no < attempts {
                        self.trace(format!(
                            "{op_name} failed (attempt {attempt_no}/{attempts}), retrying: {}",
                            err.message
                        ));
                    }
                    last_err = Some(err);
                }
                // `return`/`break` are control flow, not failures; they are
                // never retried or absorbed by fallbacks.
                Err(other) => return Err(other),
            }
        }
        let err = last_err.expect("at least one attempt ran");
        if let Some(fallback) = &tags.fallback {
            self.trace(format!("{op_name} failed terminally, using fallback"));
            return Ok(fallback.clone());
        }
        if tags.best_effort {
            self.trace(format!("{op_name} failed terminally, best effort yields null"));
            return Ok(Value::Null);
        }
        Err(Control::Raise(err))
    }

    /// Cache key: `(operation-name, normalized-input, sorted-kwargs)`.
    pub(crate) fn cache_key(&self, op_name: &str, args: &ResolvedArgs) -> String {
        let input = args
            .positional
            .first()
            .map_or_else(|| self.get_ctx().canonical(), Value::canonical);
        let mut kwargs: Vec<(&String, &Value)> = args.keywords.iter().collect();
        kwargs.sort_by(|a, b| a.0.cmp(b.0));
        let kwargs: Vec<String> = kwargs
            .into_iter()
            .map(|(k, v)| format!("{k}={}", v.canonical()))
            .collect();
        format!("{op_name}|{input}|{}", kwargs.join(","))
    }
}

/// Timeout tag value: milliseconds when bare, the suffix unit otherwise.
fn timeout_duration(value: &Value) -> Duration {
    match value {
        Value::Number { value, unit } => {
            let v = value.max(0.0);
            match unit {
                None => Duration::from_millis(v as u64),
                Some(Unit::Seconds) => Duration::from_secs_f64(v),
                Some(Unit::Minutes) => Duration::from_secs_f64(v * 60.0),
                Some(Unit::Hours) => Duration::from_secs_f64(v * 3600.0),
            }
        }
        _ => Duration::from_millis(0),
    }
}
