use super::{prompts, Call, CollaborationOutcome, CollaborationSession, Dispatcher};
use crate::types::{ContributionRole, Task};

/// Agents run one after another in routing order, each seeing the previous
/// output as context. A failed step is skipped and the chain continues from
/// the last good output.
pub(crate) async fn run(
    mut session: CollaborationSession,
    task: &Task,
    dispatcher: &Dispatcher<'_>,
) -> CollaborationOutcome {
    let category = task.top_category();
    let agents = session.agents.clone();
    let mut attempted = 0;
    let mut last: Option<(String, f64)> = None;

    for agent in agents {
        if dispatcher.expired() {
            session.abort("deadline reached mid-chain");
            break;
        }
        let context = match &last {
            Some((previous, _)) => Some(prompts::chained_context(task.context(), previous)),
            None => task.context.clone(),
        };
        attempted += 1;
        let inv = dispatcher
            .call(Call::new(agent, task.prompt.clone(), context, category))
            .await;
        if let Some(step) = session
            .record_round("step", &[(inv, ContributionRole::Step)])
            .into_iter()
            .next()
        {
            last = Some((step.text, step.quality));
        }
    }

    match last {
        Some((text, base)) => session.conclude(text, base, attempted),
        None => {
            session.abort("every step failed");
            session.fail(attempted)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::harness::Harness;
    use super::super::testing::Scripted;
    use ensemble_core::{CollaborationMode, TaskCategory};

    fn appender(suffix: &'static str) -> std::sync::Arc<Scripted> {
        Scripted::new(move |_, context: Option<&str>| {
            let previous = context
                .and_then(|c| c.split("Previous agent output:\n").nth(1))
                .unwrap_or("");
            Ok(format!("{previous}{suffix}"))
        })
    }

    #[tokio::test]
    async fn test_chain_passes_output_forward() {
        let h = Harness::builder()
            .agent("a", &["planning"], appender("outline."))
            .agent("b", &["planning"], appender(" details."))
            .agent("c", &["planning"], appender(" review."))
            .build();
        let task = h.task("Plan the release", CollaborationMode::Sequential, &[TaskCategory::Planning]);
        let outcome = h.run(&task, &["a", "b", "c"]).await;

        assert_eq!(outcome.text, "outline. details. review.");
        assert_eq!(outcome.rounds.len(), 3);
        assert!(outcome.rounds.iter().all(|r| r.phase == "step"));
        assert_eq!(outcome.contributors, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_step_is_skipped() {
        let c = appender(" review.");
        let h = Harness::builder()
            .agent("a", &["planning"], appender("outline."))
            .agent("b", &["planning"], Scripted::failing())
            .agent("c", &["planning"], c.clone())
            .build();
        let task = h.task("Plan the release", CollaborationMode::Sequential, &[TaskCategory::Planning]);
        let outcome = h.run(&task, &["a", "b", "c"]).await;

        assert_eq!(outcome.text, "outline. review.");
        assert_eq!(outcome.rounds.len(), 2);
        assert_eq!(outcome.rounds[1].index, 2);
        assert_eq!(c.prompts.lock()[0].1.as_deref(), Some("Previous agent output:\noutline."));
    }

    #[tokio::test]
    async fn test_last_step_failure_keeps_previous_output() {
        let h = Harness::builder()
            .agent("a", &["planning"], appender("outline."))
            .agent("b", &["planning"], Scripted::failing())
            .build();
        let task = h.task("Plan the release", CollaborationMode::Sequential, &[TaskCategory::Planning]);
        let outcome = h.run(&task, &["a", "b"]).await;
        assert_eq!(outcome.text, "outline.");
        assert!(!outcome.aborted);
    }
}
