use super::{best_by_quality, prompts, Call, CollaborationOutcome, CollaborationSession, Dispatcher};
use crate::types::{Contribution, ContributionRole, Task};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    Review,
    Critical,
}

/// Independent answers, then every agent scores every other agent's answer.
/// The answer with the best average peer score wins; without any parsable
/// score the quality scorer decides.
pub(crate) async fn run(
    mut session: CollaborationSession,
    task: &Task,
    dispatcher: &Dispatcher<'_>,
    framing: Framing,
) -> CollaborationOutcome {
    let category = task.top_category();
    let critical = framing == Framing::Critical;
    let prompt = if critical {
        prompts::critical(&task.prompt)
    } else {
        task.prompt.clone()
    };

    let calls: Vec<Call> = session
        .agents
        .iter()
        .map(|a| Call::new(a.clone(), prompt.clone(), task.context.clone(), category))
        .collect();
    let mut attempted = calls.len();
    let results = dispatcher.round(calls).await;
    let tagged: Vec<_> = results
        .into_iter()
        .map(|inv| (inv, ContributionRole::Answer))
        .collect();
    let answers = session.record_round("answer", &tagged);

    if answers.is_empty() {
        session.abort("every agent failed to answer");
        return session.fail(attempted);
    }
    if answers.len() == 1 || dispatcher.expired() {
        let only = &answers[best_by_quality(&answers).unwrap_or(0)];
        let (text, base) = (only.text.clone(), only.quality);
        return session.conclude(text, base, attempted);
    }

    // (reviewer, index of the answer under review)
    let mut targets: Vec<(String, usize)> = Vec::new();
    for reviewer in &session.agents {
        for (i, answer) in answers.iter().enumerate() {
            if &answer.agent_id != reviewer {
                targets.push((reviewer.clone(), i));
            }
        }
    }
    let calls: Vec<Call> = targets
        .iter()
        .map(|(reviewer, i)| {
            Call::new(
                reviewer.clone(),
                prompts::review(&task.prompt, &answers[*i].text, critical),
                task.context.clone(),
                category,
            )
        })
        .collect();
    attempted += calls.len();
    let results = dispatcher.round(calls).await;

    let mut totals = vec![(0.0_f64, 0usize); answers.len()];
    for ((_, i), inv) in targets.iter().zip(&results) {
        if !inv.success {
            continue;
        }
        match prompts::parse_score(&inv.text) {
            Some(score) => {
                totals[*i].0 += f64::from(score);
                totals[*i].1 += 1;
            }
            None => debug!(agent = %inv.agent_id, "Unparsable review ignored"),
        }
    }
    let tagged: Vec<_> = results
        .into_iter()
        .map(|inv| (inv, ContributionRole::Review))
        .collect();
    let reviews = session.record_round("review", &tagged);
    if reviews.is_empty() {
        session.abort("every review failed");
    }

    let (winner, base) = pick(&answers, &totals);
    let text = answers[winner].text.clone();
    session.conclude(text, base, attempted)
}

/// Winner index and base confidence.
fn pick(answers: &[Contribution], totals: &[(f64, usize)]) -> (usize, f64) {
    let averages: Vec<Option<f64>> = totals
        .iter()
        .map(|(sum, n)| (*n > 0).then(|| sum / *n as f64))
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for (i, avg) in averages.iter().enumerate() {
        let Some(avg) = avg else { continue };
        let better = match best {
            None => true,
            Some((b, b_avg)) => {
                *avg > b_avg || (*avg == b_avg && answers[i].quality > answers[b].quality)
            }
        };
        if better {
            best = Some((i, *avg));
        }
    }

    match best {
        Some((i, avg)) => (i, 0.5 * (avg / 10.0) + 0.5 * answers[i].quality),
        None => {
            let i = best_by_quality(answers).unwrap_or(0);
            (i, answers[i].quality)
        }
    }
}
