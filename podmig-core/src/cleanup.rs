// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Deferred cleanup actions.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::PodmigResult;

struct Deferred<'a> {
    label: String,
    action: BoxFuture<'a, PodmigResult<()>>,
}

/// Ordered list of deferred async actions.
///
/// Actions run in reverse registration order when [`OnExit::run`] is awaited.
/// A failing action is logged and does not stop the ones after it. Callers
/// run the list on every exit path, including the error path.
#[derive(Default)]
pub struct OnExit<'a> {
    actions: Vec<Deferred<'a>>,
}

impl<'a> OnExit<'a> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Register an action. It does not start until [`OnExit::run`].
    pub fn defer<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: Future<Output = PodmigResult<()>> + Send + 'a,
    {
        self.actions.push(Deferred {
            label: label.into(),
            action: action.boxed(),
        });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action, last registered first. Returns how many failed.
    pub async fn run(mut self) -> usize {
        let mut failed = 0;
        while let Some(deferred) = self.actions.pop() {
            if let Err(e) = deferred.action.await {
                failed += 1;
                tracing::warn!(action = %deferred.label, error = %e, "Deferred action failed");
            }
        }
        failed
    }
}

impl Drop for OnExit<'_> {
    fn drop(&mut self) {
        for deferred in &self.actions {
            tracing::warn!(action = %deferred.label, "Deferred action dropped without running");
        }
    }
}
