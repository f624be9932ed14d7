use crate::similarity::normalize;
use crate::types::CategoryMatch;
use ensemble_core::TaskCategory;

/// Weight applied to signatures found in the context rather than the prompt.
const CONTEXT_WEIGHT: f64 = 0.5;

const SECURITY: &[(&str, f64)] = &[
    ("vulnerability", 2.0),
    ("vulnerabilities", 2.0),
    ("exploit", 2.0),
    ("security", 1.5),
    ("secure", 1.0),
    ("sql injection", 2.5),
    ("xss", 2.5),
    ("csrf", 2.5),
    ("authentication", 1.0),
    ("authorization", 1.0),
    ("encryption", 1.5),
    ("threat model", 2.5),
    ("cve", 2.5),
    ("attack", 1.2),
    ("password", 1.0),
    ("hardening", 1.5),
    ("penetration", 1.5),
];

const DEBUGGING: &[(&str, f64)] = &[
    ("bug", 1.5),
    ("debug", 2.0),
    ("debugging", 2.0),
    ("error", 1.0),
    ("exception", 1.5),
    ("crash", 2.0),
    ("crashes", 2.0),
    ("stack trace", 2.5),
    ("traceback", 2.5),
    ("panic", 1.5),
    ("fails", 1.2),
    ("failing", 1.2),
    ("broken", 1.0),
    ("fix", 1.0),
    ("regression", 1.5),
    ("segfault", 2.5),
    ("not working", 1.5),
];

const CODE: &[(&str, f64)] = &[
    ("code", 1.5),
    ("function", 1.2),
    ("implement", 1.5),
    ("refactor", 2.0),
    ("class", 1.0),
    ("method", 1.0),
    ("compile", 1.5),
    ("api", 1.0),
    ("rust", 1.5),
    ("python", 1.5),
    ("javascript", 1.5),
    ("typescript", 1.5),
    ("sql", 1.2),
    ("script", 1.2),
    ("algorithm", 1.2),
    ("unit test", 2.0),
    ("library", 1.0),
    ("snippet", 1.5),
];

const DESIGN: &[(&str, f64)] = &[
    ("architecture", 2.0),
    ("design", 1.5),
    ("caching", 1.5),
    ("cache", 1.2),
    ("scalability", 1.5),
    ("scalable", 1.5),
    ("microservices", 2.0),
    ("system design", 2.5),
    ("schema", 1.2),
    ("interface", 1.0),
    ("pattern", 1.0),
    ("load balancing", 2.0),
];

const DATA: &[(&str, f64)] = &[
    ("data", 1.2),
    ("dataset", 2.0),
    ("statistics", 2.0),
    ("statistical", 2.0),
    ("query", 1.0),
    ("analytics", 2.0),
    ("analyze", 1.0),
    ("analysis", 1.0),
    ("csv", 2.0),
    ("time series", 2.5),
    ("metrics", 1.0),
    ("trend", 1.2),
    ("forecast", 1.5),
    ("correlation", 2.0),
    ("average", 1.0),
    ("chart", 1.2),
];

const PLANNING: &[(&str, f64)] = &[
    ("plan", 1.5),
    ("planning", 1.5),
    ("roadmap", 2.0),
    ("schedule", 1.5),
    ("timeline", 1.5),
    ("milestone", 1.5),
    ("milestones", 1.5),
    ("prioritize", 1.5),
    ("strategy", 1.0),
    ("steps", 0.8),
    ("estimate", 1.0),
    ("preventive maintenance", 2.0),
    ("work order", 1.5),
];

const CREATIVE: &[(&str, f64)] = &[
    ("story", 2.0),
    ("poem", 2.5),
    ("creative", 1.5),
    ("slogan", 2.0),
    ("brainstorm", 1.5),
    ("ideas", 1.2),
    ("tagline", 2.0),
    ("write", 0.8),
    ("fiction", 2.0),
    ("imagine", 1.2),
];

const REASONING: &[(&str, f64)] = &[
    ("prove", 2.0),
    ("proof", 2.0),
    ("logic", 1.5),
    ("logical", 1.5),
    ("calculate", 1.5),
    ("math", 1.5),
    ("equation", 2.0),
    ("solve", 1.5),
    ("puzzle", 2.0),
    ("reason", 1.0),
    ("deduce", 2.0),
    ("step by step", 2.0),
    ("probability", 1.5),
    ("tradeoff", 1.2),
    ("tradeoffs", 1.2),
];

const RESEARCH: &[(&str, f64)] = &[
    ("research", 2.0),
    ("summarize", 1.5),
    ("summary", 1.2),
    ("compare", 1.5),
    ("comparison", 1.5),
    ("sources", 1.5),
    ("literature", 2.0),
    ("overview", 1.2),
    ("history", 1.0),
    ("pros and cons", 2.0),
    ("versus", 1.2),
    ("vs", 1.0),
    ("survey", 1.5),
];

/// Maps free text onto ranked task categories using weighted keyword signatures.
///
/// Pure: no I/O, no shared state. Unmatched or empty input yields a single
/// [`TaskCategory::General`] match with confidence 0.
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    /// Per category (priority order), normalized phrase and weight.
    signatures: Vec<(TaskCategory, Vec<(String, f64)>)>,
}

impl Default for TaskClassifier {
    fn default() -> Self {
        let builtin: [(TaskCategory, &[(&str, f64)]); 9] = [
            (TaskCategory::Security, SECURITY),
            (TaskCategory::Debugging, DEBUGGING),
            (TaskCategory::Code, CODE),
            (TaskCategory::Design, DESIGN),
            (TaskCategory::Data, DATA),
            (TaskCategory::Planning, PLANNING),
            (TaskCategory::Creative, CREATIVE),
            (TaskCategory::Reasoning, REASONING),
            (TaskCategory::Research, RESEARCH),
        ];
        let signatures = builtin
            .iter()
            .map(|(category, sigs)| {
                let sigs = sigs
                    .iter()
                    .map(|(phrase, weight)| (normalize(phrase), *weight))
                    .collect();
                (*category, sigs)
            })
            .collect();
        Self { signatures }
    }
}

impl TaskClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or reweight) a signature phrase for a category.
    pub fn with_signature(mut self, category: TaskCategory, phrase: &str, weight: f64) -> Self {
        let phrase = normalize(phrase);
        if phrase.is_empty() || category == TaskCategory::General {
            return self;
        }
        let slot = match self.signatures.iter().position(|(c, _)| *c == category) {
            Some(idx) => idx,
            None => {
                self.signatures.push((category, Vec::new()));
                self.signatures.sort_by_key(|(c, _)| *c);
                self.signatures
                    .iter()
                    .position(|(c, _)| *c == category)
                    .unwrap_or(0)
            }
        };
        let sigs = &mut self.signatures[slot].1;
        match sigs.iter_mut().find(|(p, _)| *p == phrase) {
            Some(existing) => existing.1 = weight,
            None => sigs.push((phrase, weight)),
        }
        self
    }

    /// Rank categories by normalized matched signature weight.
    ///
    /// Confidences sum to 1 whenever anything matches. Equal confidences keep
    /// the category priority order.
    pub fn classify(&self, prompt: &str, context: Option<&str>) -> Vec<CategoryMatch> {
        let prompt_text = padded(prompt);
        let context_text = context.map(padded);

        let mut raw: Vec<(TaskCategory, f64)> = Vec::new();
        for (category, sigs) in &self.signatures {
            let mut weight = 0.0;
            for (phrase, w) in sigs {
                let needle = format!(" {phrase} ");
                if prompt_text.contains(&needle) {
                    weight += w;
                }
                if let Some(ctx) = &context_text {
                    if ctx.contains(&needle) {
                        weight += w * CONTEXT_WEIGHT;
                    }
                }
            }
            if weight > 0.0 {
                raw.push((*category, weight));
            }
        }

        let total: f64 = raw.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return vec![CategoryMatch {
                category: TaskCategory::General,
                confidence: 0.0,
            }];
        }

        // Stable sort keeps priority order among ties.
        raw.sort_by(|a, b| b.1.total_cmp(&a.1));
        raw.into_iter()
            .map(|(category, w)| CategoryMatch {
                category,
                confidence: w / total,
            })
            .collect()
    }
}

fn padded(text: &str) -> String {
    format!(" {} ", normalize(text))
}
