//! Prompt framing for each protocol step.

/// Label used for the n-th anonymised peer answer (A, B, ... Z, then numbers).
pub fn peer_label(index: usize) -> String {
    if index < 26 {
        char::from(b'A' + index as u8).to_string()
    } else {
        format!("{}", index + 1)
    }
}

pub fn brainstorm(prompt: &str) -> String {
    format!(
        "Brainstorm as many distinct, concrete ideas as you can for the request below. \
         Favour breadth over polish and list each idea on its own line.\n\n{prompt}"
    )
}

pub fn critical(prompt: &str) -> String {
    format!(
        "Analyse the request below critically. Surface hidden assumptions, risks and weak \
         points before giving your answer.\n\n{prompt}"
    )
}

/// Ask an agent to revise its answer after seeing anonymised peer answers.
pub fn consensus_revision(prompt: &str, own: &str, peers: &[&str]) -> String {
    let mut out = format!(
        "Original request:\n{prompt}\n\nYour previous answer:\n{own}\n\nOther answers:\n"
    );
    for (i, peer) in peers.iter().enumerate() {
        out.push_str(&format!("\nAnswer {}:\n{peer}\n", peer_label(i)));
    }
    out.push_str(
        "\nRevise your answer. Keep what you still believe is right, adopt points from the \
         other answers that are better supported, and reply with the full revised answer only.",
    );
    out
}

pub fn critique(prompt: &str, answer: &str) -> String {
    format!(
        "You are the devil's advocate. Find everything that is wrong, missing or risky in the \
         answer below. Do not rewrite it; list concrete objections.\n\nRequest:\n{prompt}\n\n\
         Answer under review:\n{answer}"
    )
}

pub fn revision(prompt: &str, answer: &str, critique: &str) -> String {
    format!(
        "Produce a final answer to the request, addressing every valid objection raised \
         against the draft.\n\nRequest:\n{prompt}\n\nDraft:\n{answer}\n\nObjections:\n{critique}"
    )
}

/// Rubric prompt for scoring a peer's answer.
pub fn review(prompt: &str, answer: &str, critical: bool) -> String {
    let focus = if critical {
        "soundness of reasoning, stated assumptions and identified risks"
    } else {
        "accuracy, completeness and clarity"
    };
    format!(
        "Score the answer below from 0 to 10 for {focus}. Start your reply with \
         \"Score: N\" and follow with one short justification.\n\nRequest:\n{prompt}\n\n\
         Answer:\n{answer}"
    )
}

pub fn team_slice(prompt: &str, tag: &str) -> String {
    format!(
        "You are on the {tag} team. Answer only the {tag} aspects of the request below; other \
         teams cover the rest.\n\n{prompt}"
    )
}

/// Context for the next agent in a sequential chain.
pub fn chained_context(context: Option<&str>, previous: &str) -> String {
    match context {
        Some(ctx) if !ctx.trim().is_empty() => {
            format!("{ctx}\n\nPrevious agent output:\n{previous}")
        }
        _ => format!("Previous agent output:\n{previous}"),
    }
}

/// First integer 0..=10 following the word "score" (case-insensitive).
pub fn parse_score(review: &str) -> Option<u8> {
    let lower = review.to_lowercase();
    let start = lower.find("score")? + "score".len();
    let digits: String = lower[start..]
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    let value: u8 = digits.parse().ok()?;
    (value <= 10).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("Score: 7. Solid answer."), Some(7));
        assert_eq!(parse_score("I would SCORE this 10/10"), Some(10));
        assert_eq!(parse_score("score: 42"), None);
        assert_eq!(parse_score("Looks fine, 8 out of 10"), None);
        assert_eq!(parse_score("score: n/a"), None);
    }

    #[test]
    fn test_consensus_revision_anonymises_peers() {
        let p = consensus_revision("q", "mine", &["first", "second"]);
        assert!(p.contains("Answer A:\nfirst"));
        assert!(p.contains("Answer B:\nsecond"));
        assert!(!p.contains("agent"));
    }

    #[test]
    fn test_chained_context() {
        assert_eq!(chained_context(None, "x"), "Previous agent output:\nx");
        assert_eq!(
            chained_context(Some("site A"), "x"),
            "site A\n\nPrevious agent output:\nx"
        );
    }

    #[test]
    fn test_peer_labels() {
        assert_eq!(peer_label(0), "A");
        assert_eq!(peer_label(25), "Z");
        assert_eq!(peer_label(26), "27");
    }
}
