use super::{prompts, Call, CollaborationOutcome, CollaborationSession, Dispatcher};
use crate::types::{ContributionRole, Task};

/// Answer, critique, revision: three sequential rounds with fixed roles.
///
/// The first agent answers, the second critiques, the third (or the first
/// again when only two agents were routed) revises. If the critique or the
/// revision fails, the best answer gathered so far is returned.
pub(crate) async fn run(
    mut session: CollaborationSession,
    task: &Task,
    dispatcher: &Dispatcher<'_>,
) -> CollaborationOutcome {
    let category = task.top_category();
    let agents = session.agents.clone();
    let proposer = agents[0].clone();
    let critic = agents[1 % agents.len()].clone();
    let reviser = agents.get(2).unwrap_or(&agents[0]).clone();
    let mut attempted = 1;

    let inv = dispatcher
        .call(Call::new(
            proposer,
            task.prompt.clone(),
            task.context.clone(),
            category,
        ))
        .await;
    let initial = session.record_round("answer", &[(inv, ContributionRole::Answer)]);
    let Some(initial) = initial.into_iter().next() else {
        session.abort("initial answer failed");
        return session.fail(attempted);
    };

    attempted += 1;
    let inv = dispatcher
        .call(Call::new(
            critic,
            prompts::critique(&task.prompt, &initial.text),
            task.context.clone(),
            category,
        ))
        .await;
    let critique = session.record_round("critique", &[(inv, ContributionRole::Critique)]);
    let Some(critique) = critique.into_iter().next() else {
        session.abort("critique failed");
        let base = initial.quality;
        return session.conclude(initial.text, base, attempted);
    };

    attempted += 1;
    let inv = dispatcher
        .call(Call::new(
            reviser,
            prompts::revision(&task.prompt, &initial.text, &critique.text),
            task.context.clone(),
            category,
        ))
        .await;
    let revised = session.record_round("revision", &[(inv, ContributionRole::Revision)]);
    match revised.into_iter().next() {
        Some(final_answer) => {
            let base = final_answer.quality;
            session.conclude(final_answer.text, base, attempted)
        }
        None => {
            session.abort("revision failed");
            let base = initial.quality;
            session.conclude(initial.text, base, attempted)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::harness::Harness;
    use super::super::testing::Scripted;
    use crate::types::ContributionRole;
    use ensemble_core::{CollaborationMode, TaskCategory};

    fn role_scripted(answer: &'static str, critique: &'static str, revision: &'static str) -> std::sync::Arc<Scripted> {
        Scripted::new(move |prompt: &str, _| {
            Ok(if prompt.starts_with("You are the devil's advocate") {
                critique.to_string()
            } else if prompt.starts_with("Produce a final answer") {
                revision.to_string()
            } else {
                answer.to_string()
            })
        })
    }

    #[tokio::test]
    async fn test_three_rounds_with_fixed_roles() {
        let a = role_scripted("Draft plan.", "-", "-");
        let b = role_scripted("-", "The draft ignores rollback.", "-");
        let c = role_scripted("-", "-", "Final plan with rollback.");
        let h = Harness::builder()
            .agent("a", &["planning"], a.clone())
            .agent("b", &["planning"], b.clone())
            .agent("c", &["planning"], c.clone())
            .build();
        let task = h.task("Plan the database migration", CollaborationMode::DevilsAdvocate, &[TaskCategory::Planning]);
        let outcome = h.run(&task, &["a", "b", "c"]).await;

        assert_eq!(outcome.rounds.len(), 3);
        assert_eq!(outcome.text, "Final plan with rollback.");
        assert_eq!(outcome.rounds[0].contributions[0].agent_id, "a");
        assert_eq!(outcome.rounds[1].contributions[0].role, ContributionRole::Critique);
        assert_eq!(outcome.rounds[2].contributions[0].agent_id, "c");
        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
        assert!(c.prompts.lock()[0].0.contains("The draft ignores rollback."));
    }

    #[tokio::test]
    async fn test_two_agents_first_revises() {
        let a = role_scripted("Draft.", "-", "Revised by a.");
        let b = role_scripted("-", "Too vague.", "-");
        let h = Harness::builder()
            .agent("a", &["planning"], a.clone())
            .agent("b", &["planning"], b)
            .build();
        let task = h.task("Plan the rollout", CollaborationMode::DevilsAdvocate, &[TaskCategory::Planning]);
        let outcome = h.run(&task, &["a", "b"]).await;
        assert_eq!(outcome.rounds.len(), 3);
        assert_eq!(outcome.text, "Revised by a.");
        assert_eq!(a.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_critique_returns_initial_answer() {
        let h = Harness::builder()
            .agent("a", &["planning"], Scripted::fixed("Initial plan."))
            .agent("b", &["planning"], Scripted::failing())
            .agent("c", &["planning"], Scripted::fixed("unused"))
            .build();
        let task = h.task("Plan the rollout", CollaborationMode::DevilsAdvocate, &[TaskCategory::Planning]);
        let outcome = h.run(&task, &["a", "b", "c"]).await;
        assert_eq!(outcome.rounds.len(), 1);
        assert_eq!(outcome.text, "Initial plan.");
        assert!(outcome.aborted);
        assert!(outcome.confidence < outcome.rounds[0].contributions[0].quality);
    }
}
