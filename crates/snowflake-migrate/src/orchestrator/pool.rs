//! Bounded worker pool.
//!
//! A [`WorkerPool`] owns the lifecycle of one concurrency level: it is
//! created with a fixed width, tasks are submitted (waiting only for a free
//! slot), and [`WorkerPool::drain`] waits for every submitted task. Panics are
//! caught per task and reported against the task id, so one task can never
//! take down its siblings or the pool.

use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{MigrateError, Result};

/// Fixed-width pool of concurrently running tasks.
pub struct WorkerPool<T> {
    name: String,
    width: usize,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<(String, Result<T>)>,
    submitted: Vec<String>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool running at most `width` tasks at once, clamped to
    /// `1..=Semaphore::MAX_PERMITS`.
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        let width = width.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            name: name.into(),
            width,
            semaphore: Arc::new(Semaphore::new(width)),
            tasks: JoinSet::new(),
            submitted: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Submit a task, waiting until a slot is free.
    pub async fn submit<F>(&mut self, id: impl Into<String>, task: F) -> Result<()>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let id = id.into();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| MigrateError::pool("worker pool closed", format!("{}: {}", self.name, id)))?;

        debug!("{}: starting {}", self.name, id);
        self.submitted.push(id.clone());
        self.tasks.spawn(async move {
            let result = AssertUnwindSafe(task).catch_unwind().await.map_err(|payload| {
                MigrateError::pool(
                    format!("task panicked: {}", panic_message(payload.as_ref())),
                    id.clone(),
                )
            });
            drop(permit);
            (id, result)
        });
        Ok(())
    }

    /// Wait for every submitted task and return results in completion order.
    ///
    /// Every submitted id appears exactly once in the output.
    pub async fn drain(mut self) -> Vec<(String, Result<T>)> {
        let mut results = Vec::with_capacity(self.submitted.len());
        let mut finished = HashSet::new();

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((id, result)) => {
                    finished.insert(id.clone());
                    results.push((id, result));
                }
                Err(e) => error!("{}: task aborted: {}", self.name, e),
            }
        }

        for id in self.submitted {
            if !finished.contains(&id) {
                let err = MigrateError::pool("task aborted before completion", id.clone());
                results.push((id, Err(err)));
            }
        }
        results
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
