use super::{Call, CollaborationOutcome, CollaborationSession, Dispatcher};
use crate::types::{ContributionRole, Task};
use tracing::info;

/// Single-agent dispatch. `session.agents` holds the primary followed by its
/// ranked alternates; the next one is tried only when the previous call failed.
pub(crate) async fn run(
    mut session: CollaborationSession,
    task: &Task,
    dispatcher: &Dispatcher<'_>,
) -> CollaborationOutcome {
    let category = task.top_category();
    let candidates = session.agents.clone();
    let mut attempted = 0;

    for (i, agent) in candidates.into_iter().enumerate() {
        if dispatcher.expired() {
            break;
        }
        if i > 0 {
            info!(task_id = %task.id, agent = %agent, "Failing over to alternate agent");
        }
        attempted += 1;
        let inv = dispatcher
            .call(Call::new(agent, task.prompt.clone(), task.context.clone(), category))
            .await;
        if let Some(answer) = session
            .record_round("answer", &[(inv, ContributionRole::Answer)])
            .into_iter()
            .next()
        {
            // Failed attempts before the answer do not lower its confidence.
            let base = answer.quality;
            return session.conclude(answer.text, base, 1);
        }
    }

    session.abort("no candidate answered");
    session.fail(attempted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::harness::Harness;
    use super::super::testing::Scripted;
    use ensemble_core::{CollaborationMode, TaskCategory};

    #[tokio::test]
    async fn test_primary_answers_alone() {
        let backup = Scripted::fixed("Backup answer.");
        let h = Harness::builder()
            .agent("primary", &["code"], Scripted::fixed("Primary answer."))
            .agent("backup", &["code"], backup.clone())
            .build();
        let task = h.task("Fix the build", CollaborationMode::None, &[TaskCategory::Code]);
        let outcome = h.run(&task, &["primary", "backup"]).await;
        assert_eq!(outcome.text, "Primary answer.");
        assert_eq!(backup.calls(), 0);
        assert_eq!(outcome.contributors, vec!["primary"]);
    }

    #[tokio::test]
    async fn test_fails_over_to_alternate() {
        let h = Harness::builder()
            .agent("primary", &["code"], Scripted::failing())
            .agent("backup", &["code"], Scripted::fixed("Backup answer."))
            .build();
        let task = h.task("Fix the build", CollaborationMode::None, &[TaskCategory::Code]);
        let outcome = h.run(&task, &["primary", "backup"]).await;
        assert_eq!(outcome.text, "Backup answer.");
        assert_eq!(outcome.contributors, vec!["backup"]);
        assert!(outcome.confidence > 0.0);
        assert!(!outcome.aborted);
    }

    #[tokio::test]
    async fn test_every_candidate_failing() {
        let h = Harness::builder()
            .agent("primary", &["code"], Scripted::failing())
            .build();
        let task = h.task("Fix the build", CollaborationMode::None, &[TaskCategory::Code]);
        let outcome = h.run(&task, &["primary"]).await;
        assert!(outcome.text.is_empty());
        assert_eq!(outcome.confidence, 0.0);
    }
}
