//! Ordered steps with compensations, unwound in reverse on failure.

use futures_util::future::BoxFuture;
use std::future::Future;
use tracing::{error, info, warn};

use crate::error::{Result, TenantBoxError};

pub type Compensation<'a> = BoxFuture<'a, Result<()>>;

/// One multi-system operation in progress.
///
/// Each successful [`step`](Saga::step) registers the action that undoes
/// it. When a later step fails, registered compensations run newest first;
/// their failures are collected next to the original error and never
/// replace it.
pub struct Saga<'a> {
    operation: String,
    completed: Vec<(&'static str, Compensation<'a>)>,
}

impl<'a> Saga<'a> {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            completed: Vec::new(),
        }
    }

    /// Run `action`; on success remember `compensation(&output)`.
    pub async fn step<T, F, C>(&mut self, name: &'static str, action: F, compensation: C) -> Result<T>
    where
        F: Future<Output = Result<T>>,
        C: FnOnce(&T) -> Compensation<'a>,
    {
        match action.await {
            Ok(output) => {
                self.completed.push((name, compensation(&output)));
                Ok(output)
            }
            Err(err) => Err(self.unwind(name, err).await),
        }
    }

    /// Run the final step. Nothing follows it, so on success the saga is
    /// done. The action may leave something behind when it fails or is cut
    /// short; `cleanup` then runs first, ahead of the earlier compensations.
    pub async fn last_step_with_cleanup<T, F>(
        mut self,
        name: &'static str,
        action: F,
        cleanup: Compensation<'a>,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match action.await {
            Ok(output) => {
                self.completed.clear();
                Ok(output)
            }
            Err(err) => {
                self.completed.push((name, cleanup));
                Err(self.unwind(name, err).await)
            }
        }
    }

    /// Names of the steps that would be undone, oldest first.
    pub fn completed_steps(&self) -> Vec<&'static str> {
        self.completed.iter().map(|(name, _)| *name).collect()
    }

    async fn unwind(&mut self, failed_step: &'static str, err: TenantBoxError) -> TenantBoxError {
        let completed = std::mem::take(&mut self.completed);
        if completed.is_empty() {
            return err;
        }

        warn!(
            "{}: step {} failed ({}), compensating {} completed step(s)",
            self.operation,
            failed_step,
            err,
            completed.len()
        );

        let mut cleanup_errors = Vec::new();
        for (name, compensation) in completed.into_iter().rev() {
            match compensation.await {
                Ok(()) => info!("{}: compensated {}", self.operation, name),
                Err(e) => {
                    error!("{}: compensation of {} failed: {}", self.operation, name, e);
                    cleanup_errors.push(e);
                }
            }
        }

        TenantBoxError::Compensated {
            step: failed_step,
            source: Box::new(err),
            cleanup_errors,
        }
    }
}
