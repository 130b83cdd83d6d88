use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use super::server::{EvolutionResponse, EvolutionServer};
use crate::error::HiveError;
use crate::policy::{select_by_signals, Mode, SignalReading, SIGNAL_WINDOW};
use crate::sandbox::ScriptRunner;
use crate::signals::{PheromoneTrails, SignalKind};
use crate::thoughts::Thought;

/// Strength of the metric signal each completed cycle leaves behind.
const FEEDBACK_STRENGTH: f64 = 0.8;

/// Closed-loop coordinator: sense → select → dispatch → feedback.
///
/// Holds no state of its own; everything persistent lives in the
/// pheromone trails and the scripts on disk. Concurrent cycles are not
/// serialized against each other.
pub struct HybridController {
    server: EvolutionServer,
    trails: Arc<PheromoneTrails>,
}

impl HybridController {
    pub fn new(runner: Arc<dyn ScriptRunner>, trails: Arc<PheromoneTrails>) -> Self {
        Self {
            server: EvolutionServer::new(runner),
            trails,
        }
    }

    /// Runs one full coordination cycle.
    ///
    /// A validation or script failure aborts the cycle before the feedback
    /// signal is written.
    pub async fn run(&self, thoughts: &[Thought]) -> Result<EvolutionResponse, HiveError> {
        let mode = self.select_mode_with_signals(thoughts).await?;
        let biased = bias_toward(thoughts, mode);

        let res = self.server.handle_with_mode(mode, &biased).await?;

        let feedback = json!({
            "mode_chosen": mode,
            "summary": res.processed.summary,
        });
        self.trails
            .emit(SignalKind::Metric, &feedback.to_string(), FEEDBACK_STRENGTH)
            .await?;

        info!("Cycle complete in {mode} mode ({})", res.processed.summary);
        Ok(res)
    }

    async fn select_mode_with_signals(&self, thoughts: &[Thought]) -> Result<Mode, HiveError> {
        let discoveries = self.trails.sense(SignalKind::Discovery, SIGNAL_WINDOW).await?;
        let metrics = self.trails.sense(SignalKind::Metric, SIGNAL_WINDOW).await?;
        let reading = SignalReading::from_signals(&discoveries, &metrics);

        let last_intent = thoughts.last().and_then(|t| t.intent);
        let mode = select_by_signals(reading, last_intent);
        debug!(
            "Signal reading: discovery={:.3} metric={:.3} last_intent={last_intent:?} → {mode}",
            reading.discovery, reading.metric
        );
        Ok(mode)
    }
}

/// Copy of the batch whose last thought carries the mode's canonical intent.
pub fn bias_toward(thoughts: &[Thought], mode: Mode) -> Vec<Thought> {
    let mut biased = thoughts.to_vec();
    if let Some(last) = biased.last_mut() {
        last.intent = Some(mode.canonical_intent());
    }
    biased
}
