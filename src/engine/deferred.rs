//! Progressive resolution of deferred (`lazy`) branches.
//!
//! The first frame resolves everything that is not deferred and leaves a
//! pending marker where each deferred branch will go:
//!
//! ```json
//! { "customer_id": 4, "payments": { "$pending": "payment-customer_id" } }
//! ```
//!
//! Each following frame resolves one wave: every branch pending in the previous
//! frame is resolved and patched in place, and any deferred branch found inside
//! it becomes pending for the next wave. Every frame is a complete snapshot and
//! no resolved value is ever replaced by a marker, so frames only move forward.
//! Branches of the same wave are resolved in include-key order, which callers
//! must not rely on.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};

use super::memory::{Resolver, Row, Tables};
use super::predicate::Ancestor;
use super::{EngineError, EngineResult, ExecuteOptions, FrameStream};
use crate::query::QueryNode;

/// Key of a pending marker.
pub const PENDING_KEY: &str = "$pending";

/// `{ "$pending": "<node name>" }`
pub fn pending_marker(node: &QueryNode) -> Value {
    let mut obj = Map::new();
    obj.insert(PENDING_KEY.to_string(), Value::String(node.name().to_string()));
    Value::Object(obj)
}

/// True for a pending marker.
pub fn is_pending(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.len() == 1 && obj.get(PENDING_KEY).is_some_and(Value::is_string))
}

/// A deferred branch waiting to be resolved.
#[derive(Debug, Clone)]
pub(crate) struct PendingBranch {
    /// JSON pointer of the marker within the frame.
    pointer: String,
    node: Arc<QueryNode>,
    /// Enclosing rows, outermost first.
    scope: Vec<(String, Row)>,
}

impl PendingBranch {
    pub(crate) fn new(pointer: String, node: Arc<QueryNode>, scope: &[Ancestor<'_>]) -> Self {
        Self {
            pointer,
            node,
            scope: scope
                .iter()
                .map(|(table, row)| (table.to_string(), (*row).clone()))
                .collect(),
        }
    }

    fn resolve_into(&self, resolver: &mut Resolver<'_>, frame: &mut Value) -> EngineResult<()> {
        let scope: Vec<Ancestor<'_>> = self
            .scope
            .iter()
            .map(|(table, row)| (table.as_str(), row))
            .collect();
        let value = resolver.resolve(&self.node, &scope, &self.pointer)?;
        let slot = frame.pointer_mut(&self.pointer).ok_or_else(|| {
            EngineError::Backend(format!("deferred branch lost its place at '{}'", self.pointer))
        })?;
        *slot = value;
        Ok(())
    }
}

enum Stage {
    Start,
    Waves {
        frame: Value,
        pending: Vec<PendingBranch>,
        wave: usize,
    },
    Done,
}

/// The frame stream for one execution.
///
/// With `return_last_only` set, deferred branches are resolved inline and a
/// single frame equal to the final snapshot is produced.
pub(crate) fn frames(tables: Arc<Tables>, query: Arc<QueryNode>, options: ExecuteOptions) -> FrameStream {
    let defer = !options.return_last_only;
    let request_id = options.request_id;

    stream::unfold(Stage::Start, move |stage| {
        let tables = Arc::clone(&tables);
        let query = Arc::clone(&query);
        let request_id = request_id.clone();
        async move {
            match stage {
                Stage::Start => {
                    let mut resolver = Resolver::new(&tables, defer);
                    let first = if defer && query.is_lazy() {
                        resolver
                            .pending
                            .push(PendingBranch::new(String::new(), Arc::clone(&query), &[]));
                        Ok(pending_marker(&query))
                    } else {
                        resolver.resolve(&query, &[], "")
                    };
                    let pending = std::mem::take(&mut resolver.pending);
                    match first {
                        Err(err) => Some((Err(err), Stage::Done)),
                        Ok(frame) if pending.is_empty() => Some((Ok(frame), Stage::Done)),
                        Ok(frame) => {
                            log::debug!(
                                "[{}] first frame sent with {} deferred branch(es)",
                                request_id,
                                pending.len()
                            );
                            Some((
                                Ok(frame.clone()),
                                Stage::Waves {
                                    frame,
                                    pending,
                                    wave: 1,
                                },
                            ))
                        }
                    }
                }
                Stage::Waves {
                    mut frame,
                    pending,
                    wave,
                } => {
                    tokio::task::yield_now().await;

                    let mut resolver = Resolver::new(&tables, true);
                    for branch in &pending {
                        if let Err(err) = branch.resolve_into(&mut resolver, &mut frame) {
                            return Some((Err(err), Stage::Done));
                        }
                    }
                    let next = std::mem::take(&mut resolver.pending);
                    log::debug!(
                        "[{}] wave {} resolved {} branch(es), {} now pending",
                        request_id,
                        wave,
                        pending.len(),
                        next.len()
                    );
                    if next.is_empty() {
                        Some((Ok(frame), Stage::Done))
                    } else {
                        Some((
                            Ok(frame.clone()),
                            Stage::Waves {
                                frame,
                                pending: next,
                                wave: wave + 1,
                            },
                        ))
                    }
                }
                Stage::Done => None,
            }
        }
    })
    .boxed()
}
