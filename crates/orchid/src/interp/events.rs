//! Event machinery: `emit` / `on` / `listen()` / `Stream(...)`.
//!
//! Delivery order on emit: a queued `listen()` waiter gets the event first;
//! otherwise registered handlers run synchronously in registration order;
//! otherwise the payload is buffered per name, bounded and dropping oldest.

use std::{collections::VecDeque, rc::Rc};

use indexmap::IndexMap;
use tokio::sync::oneshot;

use crate::{
    ast::Spanned,
    config::EVENT_QUEUE_CAP,
    env::ScopeId,
    error::{ErrorKind, Flow, raise},
    token::Pos,
    value::Value,
};

use super::Interp;

/// A registered `on Name as var:` handler.
#[derive(Debug, Clone)]
pub(crate) struct Handler {
    pub var: String,
    pub body: Rc<Vec<Spanned>>,
    pub scope: ScopeId,
}

/// All event state for a session.
#[derive(Debug, Default)]
pub(crate) struct EventHub {
    /// Handlers per event name, in registration order.
    pub handlers: IndexMap<String, Vec<Handler>>,
    /// Buffered payloads per name. The map is keyed in first-emit order,
    /// which is what gives `listen()` its cross-name ordering.
    pub buffer: IndexMap<String, VecDeque<Value>>,
    /// Single-shot `listen()` resolvers, oldest first.
    pub waiters: VecDeque<oneshot::Sender<Value>>,
    /// Payloads discarded by the queue bound.
    pub dropped: u64,
}

/// Snapshot for atomic rollback. Waiters cannot be cloned; the mark records
/// how many existed, and rollback drops any registered past it.
#[derive(Debug)]
pub(crate) struct EventSnapshot {
    handlers: IndexMap<String, Vec<Handler>>,
    buffer: IndexMap<String, VecDeque<Value>>,
    waiter_mark: usize,
}

impl EventHub {
    pub fn snapshot(&self) -> EventSnapshot {
        EventSnapshot {
            handlers: self.handlers.clone(),
            buffer: self.buffer.clone(),
            waiter_mark: self.waiters.len(),
        }
    }

    pub fn restore(&mut self, snapshot: EventSnapshot) {
        self.handlers = snapshot.handlers;
        self.buffer = snapshot.buffer;
        while self.waiters.len() > snapshot.waiter_mark {
            self.waiters.pop_back();
        }
    }
}

impl Interp {
    pub(crate) async fn emit_event(&self, name: &str, payload: Value) -> Flow<Value> {
        let event = Value::event(name, payload.clone());
        // Oldest live waiter wins.
        loop {
            let waiter = self.hub.borrow_mut().waiters.pop_front();
            match waiter {
                Some(sender) => {
                    if sender.send(event.clone()).is_ok() {
                        self.trace(format!("emit {name} -> listener"));
                        return Ok(event);
                    }
                    // Receiver is gone (cancelled branch); try the next one.
                }
                None => break,
            }
        }
        let handlers = self.hub.borrow().handlers.get(name).cloned().unwrap_or_default();
        if !handlers.is_empty() {
            self.trace(format!("emit {name} -> {} handler(s)", handlers.len()));
            for handler in handlers {
                self.run_handler(&handler, event.clone()).await?;
            }
            return Ok(event);
        }
        let mut hub = self.hub.borrow_mut();
        let queue = hub.buffer.entry(name.to_owned()).or_default();
        let overflow = queue.len() >= EVENT_QUEUE_CAP;
        if overflow {
            queue.pop_front();
        }
        queue.push_back(payload);
        if overflow {
            hub.dropped += 1;
            log::warn!("event buffer for '{name}' is full; dropped the oldest entry");
        }
        drop(hub);
        self.trace(format!("emit {name} -> buffered"));
        Ok(event)
    }

    /// Registers the handler, then drains anything already buffered for the
    /// name, delivering each payload in order.
    pub(crate) async fn register_handler(
        &self,
        name: &str,
        var: &str,
        body: &[Spanned],
        scope: ScopeId,
    ) -> Flow<()> {
        let handler = Handler {
            var: var.to_owned(),
            body: Rc::new(body.to_vec()),
            scope,
        };
        self.hub
            .borrow_mut()
            .handlers
            .entry(name.to_owned())
            .or_default()
            .push(handler.clone());
        let pending: Vec<Value> = self
            .hub
            .borrow_mut()
            .buffer
            .get_mut(name)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default();
        for payload in pending {
            let event = Value::event(name, payload);
            self.run_handler(&handler, event).await?;
        }
        Ok(())
    }

    async fn run_handler(&self, handler: &Handler, event: Value) -> Flow<()> {
        let child = self.scopes.borrow_mut().child(handler.scope);
        self.scopes.borrow_mut().set(child, &handler.var, event);
        self.run_block(&handler.body, child).await?;
        Ok(())
    }

    /// Oldest buffered event across all names (first-populated name first),
    /// or a cooperative block until the next emit.
    pub(crate) async fn listen(&self, pos: Pos) -> Flow<Value> {
        let buffered = {
            let mut hub = self.hub.borrow_mut();
            let name = hub
                .buffer
                .iter()
                .find(|(_, queue)| !queue.is_empty())
                .map(|(name, _)| name.clone());
            name.and_then(|name| {
                let payload = hub.buffer.get_mut(&name)?.pop_front()?;
                Some(Value::event(name, payload))
            })
        };
        if let Some(event) = buffered {
            return Ok(event);
        }
        let (tx, rx) = oneshot::channel();
        self.hub.borrow_mut().waiters.push_back(tx);
        match rx.await {
            Ok(event) => Ok(event),
            Err(_) => raise(ErrorKind::RuntimeError, "listen() was cancelled", pos),
        }
    }

    /// `Stream(list)` is the list itself; `Stream("Name")` drains the
    /// buffered payloads for that name into events; anything else becomes a
    /// single-element list.
    pub(crate) fn stream_value(&self, source: Value) -> Value {
        match source {
            Value::List(_) => source,
            Value::Str(name) => {
                let drained: Vec<Value> = self
                    .hub
                    .borrow_mut()
                    .buffer
                    .get_mut(name.as_ref())
                    .map(|queue| queue.drain(..).collect())
                    .unwrap_or_default();
                Value::list(
                    drained
                        .into_iter()
                        .map(|payload| Value::event(name.as_ref(), payload))
                        .collect(),
                )
            }
            other => Value::list(vec![other]),
        }
    }
}
