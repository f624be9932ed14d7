use super::{best_by_quality, prompts, Call, CollaborationOutcome, CollaborationSession, Dispatcher};
use crate::types::{ContributionRole, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    Plain,
    Brainstorm,
}

/// All agents answer concurrently; the highest-quality answer wins.
pub(crate) async fn run(
    mut session: CollaborationSession,
    task: &Task,
    dispatcher: &Dispatcher<'_>,
    framing: Framing,
) -> CollaborationOutcome {
    let prompt = match framing {
        Framing::Plain => task.prompt.clone(),
        Framing::Brainstorm => prompts::brainstorm(&task.prompt),
    };
    let category = task.top_category();
    let calls: Vec<Call> = session
        .agents
        .iter()
        .map(|a| Call::new(a.clone(), prompt.clone(), task.context.clone(), category))
        .collect();
    let attempted = calls.len();

    let results = dispatcher.round(calls).await;
    let tagged: Vec<_> = results
        .into_iter()
        .map(|inv| (inv, ContributionRole::Answer))
        .collect();
    let contributions = session.record_round("answer", &tagged);

    match best_by_quality(&contributions) {
        Some(i) => {
            let best = &contributions[i];
            let (text, base) = (best.text.clone(), best.quality);
            session.conclude(text, base, attempted)
        }
        None => {
            session.abort("every agent failed");
            session.fail(attempted)
        }
    }
}
