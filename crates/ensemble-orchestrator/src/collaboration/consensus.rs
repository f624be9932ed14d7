use super::{prompts, Call, CollaborationOutcome, CollaborationSession, Dispatcher};
use crate::config::CollaborationConfig;
use crate::similarity::{jaccard_sets, mean_pairwise, token_set};
use crate::types::{ContributionRole, Task};
use ensemble_core::AgentId;
use std::collections::HashSet;
use tracing::debug;

/// Independent answers, then anonymised revision rounds until the answers
/// agree or the round limit is reached. The answer closest to all the others wins.
pub(crate) async fn run(
    mut session: CollaborationSession,
    task: &Task,
    dispatcher: &Dispatcher<'_>,
    config: &CollaborationConfig,
) -> CollaborationOutcome {
    let category = task.top_category();
    let max_rounds = config.consensus_max_rounds.max(1);

    let calls: Vec<Call> = session
        .agents
        .iter()
        .map(|a| Call::new(a.clone(), task.prompt.clone(), task.context.clone(), category))
        .collect();
    let mut attempted = calls.len();
    let results = dispatcher.round(calls).await;
    let tagged: Vec<_> = results
        .into_iter()
        .map(|inv| (inv, ContributionRole::Answer))
        .collect();
    let first = session.record_round("answer", &tagged);
    if first.is_empty() {
        session.abort("every agent failed in the first round");
        return session.fail(attempted);
    }

    // Latest answer per agent, in routing order.
    let mut answers: Vec<(AgentId, String)> = first
        .into_iter()
        .map(|c| (c.agent_id, c.text))
        .collect();

    let mut round = 1;
    while round < max_rounds && answers.len() > 1 {
        let texts: Vec<&str> = answers.iter().map(|(_, t)| t.as_str()).collect();
        let agreement = mean_pairwise(&texts);
        if agreement >= config.consensus_similarity {
            debug!(task_id = %task.id, round, agreement, "Consensus reached early");
            break;
        }
        if dispatcher.expired() {
            session.abort("deadline reached before revision");
            break;
        }

        let calls: Vec<Call> = answers
            .iter()
            .map(|(agent, own)| {
                let peers: Vec<&str> = answers
                    .iter()
                    .filter(|(other, _)| other != agent)
                    .map(|(_, t)| t.as_str())
                    .collect();
                Call::new(
                    agent.clone(),
                    prompts::consensus_revision(&task.prompt, own, &peers),
                    task.context.clone(),
                    category,
                )
            })
            .collect();
        attempted += calls.len();
        let results = dispatcher.round(calls).await;
        let tagged: Vec<_> = results
            .into_iter()
            .map(|inv| (inv, ContributionRole::Revision))
            .collect();
        let revised = session.record_round("revision", &tagged);
        if revised.is_empty() {
            session.abort("every agent failed to revise");
            break;
        }
        for c in revised {
            if let Some(slot) = answers.iter_mut().find(|(a, _)| *a == c.agent_id) {
                slot.1 = c.text;
            }
        }
        round += 1;
    }

    let texts: Vec<&str> = answers.iter().map(|(_, t)| t.as_str()).collect();
    let agreement = mean_pairwise(&texts);
    let winner = most_agreed(&texts, |t| session.score(t).composite);
    let text = answers[winner].1.clone();
    let base = 0.5 * agreement + 0.5 * session.score(&text).composite;
    session.conclude(text, base, attempted)
}

/// Index of the text with the highest summed similarity to the others.
/// Ties go to the higher `quality`, then to the earlier text.
fn most_agreed(texts: &[&str], quality: impl Fn(&str) -> f64) -> usize {
    let sets: Vec<HashSet<String>> = texts.iter().map(|t| token_set(t)).collect();
    let mut best = 0;
    let mut best_key = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (i, set) in sets.iter().enumerate() {
        let weight: f64 = sets
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, other)| jaccard_sets(set, other))
            .sum();
        let key = (weight, quality(texts[i]));
        if key.0 > best_key.0 || (key.0 == best_key.0 && key.1 > best_key.1) {
            best = i;
            best_key = key;
        }
    }
    best
}
