use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::error::HiveError;
use crate::policy::{select_by_intent_window, Mode};
use crate::sandbox::{ScriptParams, ScriptRunner};
use crate::thoughts::{process_thoughts, Action, ProcessedThoughts, Thought};

pub const SCOUT_SCRIPT: &str = "evolution/emergent-capability-discovery.sh";
pub const ADAS_SCRIPT: &str = "evolution/adas-meta-agent.sh";
pub const HYBRID_SCRIPT: &str = "evolution/evolution-engine.sh";

/// Result of one dispatched thought batch.
#[derive(Debug, Clone, Serialize)]
pub struct EvolutionResponse {
    pub mode: Mode,
    pub output: String,
    pub processed: ProcessedThoughts,
}

/// Validates a thought batch and dispatches its last thought to a script.
pub struct EvolutionServer {
    runner: Arc<dyn ScriptRunner>,
}

impl EvolutionServer {
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        Self { runner }
    }

    /// Picks the mode from the trailing intents, then dispatches.
    pub async fn handle(&self, thoughts: &[Thought]) -> Result<EvolutionResponse, HiveError> {
        let processed = process_thoughts(thoughts)?;
        let mode = select_by_intent_window(thoughts);
        self.dispatch(mode, thoughts, processed).await
    }

    /// Dispatches in a mode the caller already decided on.
    pub async fn handle_with_mode(
        &self,
        mode: Mode,
        thoughts: &[Thought],
    ) -> Result<EvolutionResponse, HiveError> {
        let processed = process_thoughts(thoughts)?;
        self.dispatch(mode, thoughts, processed).await
    }

    async fn dispatch(
        &self,
        mode: Mode,
        thoughts: &[Thought],
        processed: ProcessedThoughts,
    ) -> Result<EvolutionResponse, HiveError> {
        // process_thoughts rejects empty batches
        let last = thoughts
            .last()
            .ok_or_else(|| HiveError::Validation(vec!["at least one thought is required".into()]))?;

        let script = pick_script(mode, last);
        let params = pick_params(last.action);
        info!("Dispatching {mode} → {script} ({} param(s))", params.len());

        let output = self.runner.execute(mode, script, &params).await?;
        Ok(EvolutionResponse {
            mode,
            output,
            processed,
        })
    }
}

/// The thought's explicit target, else the mode's default script.
pub fn pick_script(mode: Mode, thought: &Thought) -> &str {
    if let Some(target) = thought.target_script.as_deref().filter(|t| !t.is_empty()) {
        return target;
    }
    match mode {
        Mode::Scout => SCOUT_SCRIPT,
        Mode::Adas => ADAS_SCRIPT,
        Mode::Hybrid => HYBRID_SCRIPT,
    }
}

/// Fixed parameters per action. Unknown or absent actions get none.
pub fn pick_params(action: Option<Action>) -> ScriptParams {
    match action {
        Some(Action::Scan) => ScriptParams::new().with("max", 50i64),
        Some(Action::Mutate) => ScriptParams::new().with("rate", 0.3),
        Some(Action::Crossover) => ScriptParams::new().with("prob", 0.5),
        Some(Action::Evaluate) => ScriptParams::new().with("benchmark", true),
        Some(Action::Archive) => ScriptParams::new().with("persist", true),
        Some(Action::Unknown) | None => ScriptParams::new(),
    }
}

/// In-memory runner that records calls and replays a canned result.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Call {
        pub mode: Mode,
        pub script: String,
        pub params: ScriptParams,
    }

    pub struct RecordingRunner {
        pub calls: Mutex<Vec<Call>>,
        fail_with: Option<i32>,
    }

    impl RecordingRunner {
        pub fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_with: None,
            })
        }

        pub fn failing(code: i32) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_with: Some(code),
            })
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ScriptRunner for RecordingRunner {
        async fn execute(
            &self,
            mode: Mode,
            script_path: &str,
            params: &ScriptParams,
        ) -> Result<String, HiveError> {
            self.calls.lock().unwrap().push(Call {
                mode,
                script: script_path.to_string(),
                params: params.clone(),
            });
            match self.fail_with {
                Some(code) => Err(HiveError::ScriptFailed {
                    script: script_path.to_string(),
                    code: Some(code),
                }),
                None => Ok(format!("ran {script_path} in {mode}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingRunner;
    use super::*;
    use crate::sandbox::ParamValue;
    use crate::thoughts::Intent;

    fn thought(kind: &str, content: &str) -> Thought {
        Thought {
            kind: Some(kind.to_string()),
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_intents_dispatches_hybrid() {
        let runner = RecordingRunner::ok();
        let server = EvolutionServer::new(runner.clone());

        let res = server
            .handle(&[thought("goal", "a"), thought("action", "b")])
            .await
            .unwrap();
        assert_eq!(res.mode, Mode::Hybrid);
        assert_eq!(res.processed.summary, "goal:1 | action:1");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].script, HYBRID_SCRIPT);
        assert!(calls[0].params.is_empty());
    }

    #[tokio::test]
    async fn test_explore_intent_dispatches_scout_default_script() {
        let runner = RecordingRunner::ok();
        let server = EvolutionServer::new(runner.clone());
        let t = Thought {
            intent: Some(Intent::Explore),
            action: Some(Action::Scan),
            ..thought("plan", "look around")
        };

        let res = server.handle(&[t]).await.unwrap();
        assert_eq!(res.mode, Mode::Scout);
        let calls = runner.calls();
        assert_eq!(calls[0].script, SCOUT_SCRIPT);
        assert_eq!(calls[0].params.get("max"), Some(&ParamValue::Integer(50)));
    }

    #[tokio::test]
    async fn test_target_script_overrides_default() {
        let runner = RecordingRunner::ok();
        let server = EvolutionServer::new(runner.clone());
        let t = Thought {
            target_script: Some("optimization/tune.sh".to_string()),
            ..thought("action", "tune")
        };

        server.handle(&[t]).await.unwrap();
        assert_eq!(runner.calls()[0].script, "optimization/tune.sh");
    }

    #[tokio::test]
    async fn test_mutate_params_regardless_of_mode() {
        for mode in [Mode::Scout, Mode::Adas, Mode::Hybrid] {
            let runner = RecordingRunner::ok();
            let server = EvolutionServer::new(runner.clone());
            let t = Thought {
                action: Some(Action::Mutate),
                ..thought("action", "mutate")
            };
            server.handle_with_mode(mode, &[t]).await.unwrap();

            let calls = runner.calls();
            assert_eq!(calls[0].mode, mode);
            assert_eq!(calls[0].params, ScriptParams::new().with("rate", 0.3));
        }
    }

    #[tokio::test]
    async fn test_invalid_batch_never_dispatches() {
        let runner = RecordingRunner::ok();
        let server = EvolutionServer::new(runner.clone());
        let bad = Thought {
            content: Some("x".to_string()),
            ..Default::default()
        };

        let err = server.handle(&[bad]).await.unwrap_err();
        assert!(err.to_string().contains("kind is required"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_runner_failure_propagates() {
        let server = EvolutionServer::new(RecordingRunner::failing(2));
        let err = server.handle(&[thought("goal", "g")]).await.unwrap_err();
        assert!(matches!(err, HiveError::ScriptFailed { code: Some(2), .. }));
    }

    #[test]
    fn test_params_table() {
        assert_eq!(pick_params(Some(Action::Scan)), ScriptParams::new().with("max", 50i64));
        assert_eq!(pick_params(Some(Action::Crossover)), ScriptParams::new().with("prob", 0.5));
        assert_eq!(
            pick_params(Some(Action::Evaluate)),
            ScriptParams::new().with("benchmark", true)
        );
        assert_eq!(
            pick_params(Some(Action::Archive)),
            ScriptParams::new().with("persist", true)
        );
        assert!(pick_params(Some(Action::Unknown)).is_empty());
        assert!(pick_params(None).is_empty());
    }

    #[test]
    fn test_default_scripts_per_mode() {
        let t = thought("plan", "p");
        assert_eq!(pick_script(Mode::Scout, &t), SCOUT_SCRIPT);
        assert_eq!(pick_script(Mode::Adas, &t), ADAS_SCRIPT);
        assert_eq!(pick_script(Mode::Hybrid, &t), HYBRID_SCRIPT);

        let blank = Thought {
            target_script: Some(String::new()),
            ..t
        };
        assert_eq!(pick_script(Mode::Adas, &blank), ADAS_SCRIPT);
    }
}
