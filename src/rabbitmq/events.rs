// src/rabbitmq/events.rs
//! Lifecycle notifications pushed to the job pipeline's event bus.
//!
//! The supervisor emits [`EventKind::PipeError`] when a connection drops and
//! [`EventKind::PipeActive`] once the connection, topology and both channels are back.
//! Sinks are fire-and-forget: a sink that cannot deliver simply drops the event.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    PipeError,
    PipeActive,
}

/// Identity of the pipeline that owns the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pipeline {
    pub name: String,
    pub driver: String,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
        }
    }
}

/// Read-only view of the owning pipeline; a fresh snapshot is taken per event.
pub type PipelineHandle = watch::Receiver<Pipeline>;

/// Detached handle for a pipeline whose identity never changes.
pub fn fixed_pipeline(pipeline: Pipeline) -> PipelineHandle {
    watch::channel(pipeline).1
}

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub pipeline: String,
    pub driver: String,
    pub error: Option<String>,
    pub start: DateTime<Utc>,
    pub elapsed: Duration,
}

impl LifecycleEvent {
    pub fn pipe_error(pipeline: &Pipeline, error: impl ToString) -> Self {
        Self {
            kind: EventKind::PipeError,
            pipeline: pipeline.name.clone(),
            driver: pipeline.driver.clone(),
            error: Some(error.to_string()),
            start: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn pipe_active(pipeline: &Pipeline, start: DateTime<Utc>, elapsed: Duration) -> Self {
        Self {
            kind: EventKind::PipeActive,
            pipeline: pipeline.name.clone(),
            driver: pipeline.driver.clone(),
            error: None,
            start,
            elapsed,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn push(&self, event: LifecycleEvent);
}

impl EventSink for mpsc::UnboundedSender<LifecycleEvent> {
    fn push(&self, event: LifecycleEvent) {
        // nobody listening is fine
        let _ = self.send(event);
    }
}

/// Writes events to the tracing log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

impl EventSink for LogEvents {
    fn push(&self, event: LifecycleEvent) {
        match event.kind {
            EventKind::PipeError => warn!(
                pipeline = %event.pipeline,
                driver = %event.driver,
                error = event.error.as_deref().unwrap_or_default(),
                "pipeline error"
            ),
            EventKind::PipeActive => info!(
                pipeline = %event.pipeline,
                driver = %event.driver,
                elapsed_ms = event.elapsed.as_millis() as u64,
                "pipeline active"
            ),
        }
    }
}
