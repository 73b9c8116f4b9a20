use super::{Step, StepExecutor, StepInput, TextRunner, Workflow, WorkflowError};
use crate::commands::{TestCommandExecutor, TestCommandManager, TestCommandResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const EXPLORE: &str = "Explore codebase";
const DESIGN_TESTS: &str = "Design tests";
const INITIAL_RUN: &str = "Execute tests (expect failure)";
const IMPLEMENT: &str = "Implement feature";
const FINAL_RUN: &str = "Execute tests (expect success)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TddWorkflowConfig {
    pub exploration_prompt: String,
    pub test_prompt: String,
    pub implementation_prompt: String,
    pub test_command: String,
    pub project_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum TddStage {
    Explore,
    DesignTests,
    InitialRun,
    Implement,
    FinalRun,
}

struct TddContext {
    config: TddWorkflowConfig,
    executor: TestCommandExecutor,
    exploration_runner: Arc<dyn TextRunner>,
    test_writer_runner: Arc<dyn TextRunner>,
    implementation_runner: Arc<dyn TextRunner>,
    test_results: Mutex<Vec<TestCommandResult>>,
}

impl TddContext {
    fn last_result(&self) -> Option<TestCommandResult> {
        self.test_results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }

    fn reset_results(&self) {
        self.test_results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    async fn run_tests(&self, expect_success: bool) -> Result<String, WorkflowError> {
        let result = self.executor.run(&self.config.test_command, None).await?;
        let summary = format_test_summary(&result, expect_success);
        self.test_results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(result);
        Ok(summary)
    }
}

struct TddStep {
    stage: TddStage,
    ctx: Arc<TddContext>,
}

#[async_trait]
impl StepExecutor for TddStep {
    async fn execute(&self, input: StepInput<'_>) -> Result<String, WorkflowError> {
        let ctx = &self.ctx;
        let project_path = ctx.config.project_path.as_deref();
        match self.stage {
            TddStage::Explore => {
                // First step: results from an earlier run of this workflow are stale.
                ctx.reset_results();
                ctx.exploration_runner
                    .run_text(&ctx.config.exploration_prompt, project_path)
                    .await
            }
            TddStage::DesignTests => {
                let prompt = append_context(
                    &ctx.config.test_prompt,
                    "Context from exploration:",
                    input.get_step_content(EXPLORE),
                );
                ctx.test_writer_runner.run_text(&prompt, None).await
            }
            TddStage::InitialRun => ctx.run_tests(false).await,
            TddStage::Implement => {
                let mut prompt = append_context(
                    &ctx.config.implementation_prompt,
                    "Context from exploration:",
                    input.get_step_content(EXPLORE),
                );
                prompt = append_context(
                    &prompt,
                    "Tests to satisfy:",
                    input.get_step_content(DESIGN_TESTS),
                );
                if let Some(previous) = ctx.last_result() {
                    prompt = append_context(
                        &prompt,
                        "Latest test run (expected failure):",
                        Some(&previous.to_prompt_block()),
                    );
                }
                ctx.implementation_runner.run_text(&prompt, None).await
            }
            TddStage::FinalRun => ctx.run_tests(true).await,
        }
    }
}

/// `"{prompt}\n\n{heading}\n{content}"`, or the prompt alone when the
/// trimmed content is empty.
fn append_context(prompt: &str, heading: &str, content: Option<&str>) -> String {
    match content.map(str::trim).filter(|c| !c.is_empty()) {
        Some(content) => format!("{prompt}\n\n{heading}\n{content}"),
        None => prompt.to_string(),
    }
}

fn format_test_summary(result: &TestCommandResult, expect_success: bool) -> String {
    let status = if result.succeeded() == expect_success {
        "✅ Tests behaved as expected."
    } else {
        "⚠️ Test outcome did not match the expectation."
    };
    format!("{}\n\n{status}", result.format())
}

/// Explore, design tests, watch them fail, implement, watch them pass.
///
/// Tests run in `config.project_path`. Without an `implementation_runner`
/// the test writer also implements.
pub fn create_tdd_workflow(
    config: TddWorkflowConfig,
    command_manager: Option<TestCommandManager>,
    exploration_runner: Arc<dyn TextRunner>,
    test_writer_runner: Arc<dyn TextRunner>,
    implementation_runner: Option<Arc<dyn TextRunner>>,
) -> Workflow {
    let executor = TestCommandExecutor::new(command_manager.unwrap_or_default())
        .with_cwd(config.project_path.clone());
    let ctx = Arc::new(TddContext {
        implementation_runner: implementation_runner.unwrap_or_else(|| test_writer_runner.clone()),
        config,
        executor,
        exploration_runner,
        test_writer_runner,
        test_results: Mutex::new(Vec::new()),
    });

    let step = |name: &str, stage: TddStage| {
        Step::new(
            name,
            Arc::new(TddStep {
                stage,
                ctx: ctx.clone(),
            }),
        )
    };
    Workflow::new(
        "TDD Workflow",
        "Run exploration, tests, and implementation in a TDD loop.",
        vec![
            step(EXPLORE, TddStage::Explore),
            step(DESIGN_TESTS, TddStage::DesignTests),
            step(INITIAL_RUN, TddStage::InitialRun),
            step(IMPLEMENT, TddStage::Implement),
            step(FINAL_RUN, TddStage::FinalRun),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    struct Fixed(&'static str);

    #[async_trait]
    impl TextRunner for Fixed {
        async fn run_text(
            &self,
            _prompt: &str,
            _project_path: Option<&Path>,
        ) -> Result<String, WorkflowError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn exploring_starts_a_fresh_set_of_test_results() {
        let runner: Arc<dyn TextRunner> = Arc::new(Fixed("ok"));
        let ctx = Arc::new(TddContext {
            config: TddWorkflowConfig {
                exploration_prompt: "explore".into(),
                test_prompt: "tests".into(),
                implementation_prompt: "implement".into(),
                test_command: "sh -c 'exit 1'".into(),
                project_path: None,
            },
            executor: TestCommandExecutor::new(TestCommandManager::new(false)),
            exploration_runner: runner.clone(),
            test_writer_runner: runner.clone(),
            implementation_runner: runner,
            test_results: Mutex::new(Vec::new()),
        });
        ctx.run_tests(false).await.unwrap();
        ctx.run_tests(true).await.unwrap();
        assert_eq!(ctx.test_results.lock().unwrap().len(), 2);

        let explore = TddStep {
            stage: TddStage::Explore,
            ctx: ctx.clone(),
        };
        let content = explore
            .execute(StepInput {
                input: None,
                previous_step_outputs: &[],
            })
            .await
            .unwrap();
        assert_eq!(content, "ok");
        assert!(ctx.last_result().is_none());
    }

    #[test]
    fn context_is_skipped_when_blank() {
        assert_eq!(append_context("p", "H:", None), "p");
        assert_eq!(append_context("p", "H:", Some("  \n")), "p");
        assert_eq!(append_context("p", "H:", Some(" body ")), "p\n\nH:\nbody");
    }

    #[test]
    fn summary_reports_expectation() {
        let failing = TestCommandResult {
            command: vec!["pytest".into()],
            returncode: 1,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(500),
        };
        assert_eq!(
            format_test_summary(&failing, false),
            "Command: pytest\nExit code: 1\nDuration: 0.50s\n\n✅ Tests behaved as expected."
        );
        assert!(format_test_summary(&failing, true)
            .ends_with("⚠️ Test outcome did not match the expectation."));
    }
}
