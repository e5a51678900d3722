//! Pipeline event system: progress reporting without coupling.
//!
//! The pipeline publishes coarse progress checkpoints and stage
//! lifecycle events. A caller (CLI spinner, web handler) subscribes to
//! render a progress indicator during the multi-minute run. Events are
//! advisory: nothing in the pipeline depends on anyone listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::stage::Stage;

/// All events published during a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Coarse progress checkpoint in `[0.0, 1.0]`.
    Progress {
        run_id: String,
        fraction: f32,
        description: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage invocation was sent to the provider.
    StageStarted {
        run_id: String,
        stage: Stage,
        timestamp: DateTime<Utc>,
    },

    /// A stage produced its output.
    StageCompleted {
        run_id: String,
        stage: Stage,
        output_chars: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A stage failed; the run is aborted.
    StageFailed {
        run_id: String,
        stage: Stage,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// Grounding context was retrieved for a stage.
    ContextRetrieved {
        run_id: String,
        corpus: String,
        hits: usize,
        degraded: bool,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for pipeline events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<PipelineEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Publish a progress checkpoint.
    pub fn progress(&self, run_id: &str, fraction: f32, description: impl Into<String>) {
        self.publish(PipelineEvent::Progress {
            run_id: run_id.to_string(),
            fraction: fraction.clamp(0.0, 1.0),
            description: description.into(),
            timestamp: Utc::now(),
        });
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PipelineEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
