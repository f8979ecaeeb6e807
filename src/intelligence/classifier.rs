// Decides which candidates are worth keeping
//
// Questions, "ok thanks" and two-word fragments go. Anything naming a tool,
// a model, a setting or giving a rule stays. Anything in between also stays,
// flagged, so a human makes the call instead of us dropping it.

use crate::error::Result;
use crate::intelligence::learning::{Learning, Scope, SectionTag};
use crate::intelligence::lexicon::{self, Lexicon, Term, TermKind};
use crate::intelligence::patterns::PatternSet;
use crate::queue::{CandidateCorrection, SourceType};
use tracing::debug;

// Below this many words there is no directive to extract
const MIN_WORDS: usize = 3;

// Explicit notes and rejection feedback are terse on purpose
const MIN_WORDS_STRONG: usize = 2;

/// Why a candidate was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Question,
    Acknowledgement,
    TooShort,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Question => write!(f, "question"),
            RejectReason::Acknowledgement => write!(f, "acknowledgement"),
            RejectReason::TooShort => write!(f, "too short"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept(Learning),
    Reject(RejectReason),
}

/// Candidate in, decision out
///
/// `context` holds a few turns surrounding the candidate in its source,
/// oldest first. Implementations may be rule based or model backed.
pub trait Classifier {
    fn classify(&self, candidate: &CandidateCorrection, context: &[String]) -> Decision;
}

/// Keyword and pattern heuristics
pub struct RuleClassifier {
    lexicon: Lexicon,
    markers: PatternSet,
}

impl RuleClassifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            lexicon: Lexicon::new()?,
            markers: PatternSet::english(),
        })
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Text with markers and correction fillers removed
    fn core_text(&self, raw: &str) -> String {
        let stripped = self.markers.strip_markers(raw);
        let stripped = self.lexicon.strip_fillers(&stripped);
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    // Newest context turn that names something concrete wins
    fn resolve_referent(&self, context: &[String]) -> Option<String> {
        context
            .iter()
            .rev()
            .flat_map(|turn| self.lexicon.extract_terms(turn).into_iter().next())
            .map(|term| term.text)
            .next()
    }

    fn infer_scope(&self, text: &str, terms: &[Term]) -> (Scope, bool) {
        let project_ref = self.lexicon.references_project(text)
            || terms
                .iter()
                .any(|t| matches!(t.kind, TermKind::Datastore | TermKind::Path));
        if project_ref {
            return (Scope::Project, false);
        }

        let global_ref = self.lexicon.is_generalizing(text)
            || terms.iter().any(|t| t.kind == TermKind::Model);
        if global_ref {
            return (Scope::Global, false);
        }

        (Scope::Project, true)
    }

    fn infer_section(&self, text: &str, terms: &[Term]) -> SectionTag {
        if terms.iter().any(|t| t.kind == TermKind::Model) {
            SectionTag::ModelPrefs
        } else if self.lexicon.has_error_vocab(text) {
            SectionTag::Errors
        } else if self.lexicon.has_environment_vocab(text) {
            SectionTag::Environment
        } else if terms.iter().any(|t| t.kind == TermKind::Tool) || self.lexicon.has_tool_vocab(text)
        {
            SectionTag::ToolUsage
        } else {
            SectionTag::Conventions
        }
    }
}

impl Classifier for RuleClassifier {
    fn classify(&self, candidate: &CandidateCorrection, context: &[String]) -> Decision {
        let raw = candidate.raw_text.trim();
        let explicit = candidate.source_type == SourceType::ExplicitMarker
            || self.markers.has_explicit_marker(raw);
        let strong = explicit || candidate.source_type == SourceType::ToolRejection;
        let core = self.core_text(raw);

        if !explicit && raw.ends_with('?') {
            return Decision::Reject(RejectReason::Question);
        }
        if !explicit && lexicon::is_acknowledgement(&core) {
            return Decision::Reject(RejectReason::Acknowledgement);
        }
        let min_words = if strong { MIN_WORDS_STRONG } else { MIN_WORDS };
        if lexicon::word_count(&core) < min_words {
            return Decision::Reject(RejectReason::TooShort);
        }

        let terms = self.lexicon.extract_terms(&core);
        let acceptable = strong
            || !terms.is_empty()
            || self.lexicon.is_imperative(&core)
            || self.lexicon.has_config_guidance(&core);
        let dangling = terms.is_empty() && self.lexicon.has_referent(&core);

        let mut resolved_referent = None;
        let mut ambiguous = false;
        if dangling || !acceptable {
            resolved_referent = self.resolve_referent(context);
            ambiguous = resolved_referent.is_none();
            debug!(
                text = %core,
                referent = ?resolved_referent,
                "Ambiguous candidate, consulted context"
            );
        }

        // Scope and section look at the resolved subject too
        let mut subject_terms = terms;
        let mut subject_text = core.clone();
        if let Some(referent) = &resolved_referent {
            subject_text.push(' ');
            subject_text.push_str(referent);
            subject_terms.extend(self.lexicon.extract_terms(referent));
        }

        let (scope, scope_flagged) = self.infer_scope(&subject_text, &subject_terms);
        let section_tag = self.infer_section(&subject_text, &subject_terms);

        let mut learning =
            Learning::from_candidate(candidate, actionable_text(&core), scope, section_tag);
        learning.ambiguous = ambiguous;
        learning.scope_flagged = scope_flagged;
        learning.resolved_referent = resolved_referent;

        Decision::Accept(learning)
    }
}

/// Turn cleaned correction text into an imperative sentence
///
/// Contract: whitespace collapsed, first letter upper-cased, ends with
/// terminal punctuation. Wording itself is left as the user wrote it.
pub fn actionable_text(core: &str) -> String {
    let collapsed = core.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let mut text = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => return String::new(),
    };

    if !text.ends_with(['.', '!', ')']) {
        text = text.trim_end_matches([',', ';', ':']).to_string();
        text.push('.');
    }

    text
}
