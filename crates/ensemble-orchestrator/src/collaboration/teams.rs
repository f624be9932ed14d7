use super::{prompts, Call, CollaborationOutcome, CollaborationSession, Dispatcher};
use crate::types::{Contribution, ContributionRole, Task};
use ensemble_core::{AgentId, TaskCategory};
use std::collections::BTreeMap;

/// Each agent answers the slice of the task that matches its team; the best
/// answer per team is kept and the sections are joined in category priority order.
pub(crate) async fn run(
    mut session: CollaborationSession,
    task: &Task,
    dispatcher: &Dispatcher<'_>,
) -> CollaborationOutcome {
    let assignments: Vec<(AgentId, TaskCategory)> = session
        .agents
        .iter()
        .map(|a| (a.clone(), team_for(task, dispatcher, a)))
        .collect();

    let calls: Vec<Call> = assignments
        .iter()
        .map(|(agent, team)| {
            Call::new(
                agent.clone(),
                prompts::team_slice(&task.prompt, team.tag()),
                task.context.clone(),
                *team,
            )
        })
        .collect();
    let attempted = calls.len();
    let results = dispatcher.round(calls).await;
    let tagged: Vec<_> = results
        .into_iter()
        .zip(&assignments)
        .map(|(inv, (_, team))| {
            (
                inv,
                ContributionRole::Team {
                    tag: team.tag().to_string(),
                },
            )
        })
        .collect();
    let contributions = session.record_round("teams", &tagged);

    if contributions.is_empty() {
        session.abort("every team failed");
        return session.fail(attempted);
    }

    // BTreeMap ordered by category priority.
    let mut best: BTreeMap<TaskCategory, &Contribution> = BTreeMap::new();
    for c in &contributions {
        let Some(team) = assignments
            .iter()
            .find(|(a, _)| *a == c.agent_id)
            .map(|(_, t)| *t)
        else {
            continue;
        };
        match best.get(&team) {
            Some(kept) if kept.quality >= c.quality => {}
            _ => {
                best.insert(team, c);
            }
        }
    }

    let text = if best.len() == 1 {
        best.values().map(|c| c.text.clone()).collect::<String>()
    } else {
        best.iter()
            .map(|(team, c)| format!("## {}\n\n{}", heading(*team), c.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    let base = best.values().map(|c| c.quality).sum::<f64>() / best.len() as f64;
    session.conclude(text, base, attempted)
}

/// The highest-priority task category the agent handles, falling back to
/// its first declared category, then General.
fn team_for(task: &Task, dispatcher: &Dispatcher<'_>, agent: &str) -> TaskCategory {
    let Some(profile) = dispatcher.profile(agent) else {
        return TaskCategory::General;
    };
    let mut wanted: Vec<TaskCategory> = task.categories.iter().map(|m| m.category).collect();
    wanted.sort();
    wanted
        .into_iter()
        .filter(|c| *c != TaskCategory::General)
        .find(|c| profile.handles(*c))
        .or_else(|| crate::profiles::category_tags(&profile.capabilities).into_iter().min())
        .unwrap_or(TaskCategory::General)
}

fn heading(category: TaskCategory) -> String {
    let tag = category.tag();
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::harness::Harness;
    use super::super::testing::Scripted;
    use super::*;
    use ensemble_core::CollaborationMode;

    #[test]
    fn test_heading() {
        assert_eq!(heading(TaskCategory::Security), "Security");
        assert_eq!(heading(TaskCategory::Code), "Code");
    }

    #[tokio::test]
    async fn test_sections_joined_in_priority_order() {
        let coder = Scripted::fixed("Refactor the handler into smaller functions.");
        let auditor = Scripted::fixed("Validate the session token before use.");
        let h = Harness::builder()
            .agent("coder", &["code"], coder.clone())
            .agent("auditor", &["security"], auditor.clone())
            .build();
        let task = h.task(
            "Review the login handler code for security issues",
            CollaborationMode::SpecializedTeams,
            &[TaskCategory::Code, TaskCategory::Security],
        );
        let outcome = h.run(&task, &["coder", "auditor"]).await;

        assert_eq!(
            outcome.text,
            "## Security\n\nValidate the session token before use.\n\n\
             ## Code\n\nRefactor the handler into smaller functions."
        );
        assert_eq!(outcome.rounds.len(), 1);
        assert!(coder.prompts.lock()[0].0.starts_with("You are on the code team"));
        assert!(auditor.prompts.lock()[0].0.starts_with("You are on the security team"));
        let roles: Vec<_> = outcome.rounds[0]
            .contributions
            .iter()
            .map(|c| c.role.clone())
            .collect();
        assert_eq!(
            roles,
            vec![
                ContributionRole::Team { tag: "code".into() },
                ContributionRole::Team { tag: "security".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_best_answer_kept_per_team() {
        let h = Harness::builder()
            .agent("a", &["code"], Scripted::fixed("Hmm"))
            .agent(
                "b",
                &["code"],
                Scripted::fixed("Split the login handler and cover it with unit tests."),
            )
            .build();
        let task = h.task(
            "Review the login handler code",
            CollaborationMode::SpecializedTeams,
            &[TaskCategory::Code],
        );
        let outcome = h.run(&task, &["a", "b"]).await;
        assert_eq!(outcome.text, "Split the login handler and cover it with unit tests.");
        assert_eq!(outcome.contributors, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_team_is_omitted() {
        let h = Harness::builder()
            .agent("coder", &["code"], Scripted::fixed("Extract the parser."))
            .agent("auditor", &["security"], Scripted::failing())
            .build();
        let task = h.task(
            "Review the parser code for security issues",
            CollaborationMode::SpecializedTeams,
            &[TaskCategory::Code, TaskCategory::Security],
        );
        let outcome = h.run(&task, &["coder", "auditor"]).await;
        assert_eq!(outcome.text, "Extract the parser.");
        assert!(outcome.confidence < outcome.rounds[0].contributions[0].quality);
    }
}
