// Consolidates learnings before anyone has to read them twice
//
// Stage A groups learnings from the same batch that talk about the same
// subject. Stage B looks each survivor up in the documents we already have.
// Neither stage decides anything: they produce proposals, a human picks.

use crate::docs::MemoryEntry;
use crate::error::Result;
use crate::intelligence::classifier::actionable_text;
use crate::intelligence::learning::{Learning, MergeDisposition, Scope};
use crate::intelligence::lexicon::{self, Lexicon};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::collections::HashSet;

// Keyword overlap at which an existing line counts as "the same advice"
const MIN_OVERLAP: f64 = 0.5;

/// One proposed merge of several learnings
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationProposal {
    pub group_id: String,
    /// Indices into the batch, highest confidence first
    pub members: Vec<usize>,
    pub proposed_text: String,
    pub confidence: f64,
    pub decay_days: u32,
}

/// Human answer to a consolidation proposal
#[derive(Debug, Clone, PartialEq)]
pub enum ConsolidationChoice {
    Accept,
    KeepSeparate,
    Edit(String),
}

/// An existing document line similar to a learning
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingMatch {
    pub entry: MemoryEntry,
    pub overlap: f64,
    pub exact: bool,
}

impl ExistingMatch {
    /// Choices offered to the human for this hit
    pub fn options() -> [MergeDisposition; 4] {
        [
            MergeDisposition::Merge,
            MergeDisposition::Replace,
            MergeDisposition::AddAnyway,
            MergeDisposition::Skip,
        ]
    }
}

pub struct Deduplicator {
    lexicon: Lexicon,
    matcher: SkimMatcherV2,
}

impl Deduplicator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            lexicon: Lexicon::new()?,
            matcher: SkimMatcherV2::default(),
        })
    }

    /// What a learning is about: its models, tools, datastores, paths, names
    pub fn subjects(&self, learning: &Learning) -> HashSet<String> {
        let mut subjects: HashSet<String> = self
            .lexicon
            .extract_terms(&learning.actionable_text)
            .into_iter()
            .map(|t| t.text)
            .collect();
        if let Some(referent) = &learning.resolved_referent {
            subjects.insert(referent.to_lowercase());
        }
        subjects
    }

    /// Stage A: cluster learnings sharing a subject and a scope
    pub fn propose_clusters(&self, learnings: &[Learning]) -> Vec<ConsolidationProposal> {
        let subjects: Vec<HashSet<String>> = learnings.iter().map(|l| self.subjects(l)).collect();

        let mut parent: Vec<usize> = (0..learnings.len()).collect();
        for i in 0..learnings.len() {
            for j in (i + 1)..learnings.len() {
                if same_home(&learnings[i], &learnings[j])
                    && !subjects[i].is_disjoint(&subjects[j])
                {
                    union(&mut parent, i, j);
                }
            }
        }

        // Components in order of their first member
        let mut components: Vec<Vec<usize>> = Vec::new();
        let mut roots: Vec<usize> = Vec::new();
        for i in 0..learnings.len() {
            let root = find(&mut parent, i);
            match roots.iter().position(|r| *r == root) {
                Some(pos) => components[pos].push(i),
                None => {
                    roots.push(root);
                    components.push(vec![i]);
                }
            }
        }

        components
            .into_iter()
            .filter(|members| members.len() > 1)
            .enumerate()
            .map(|(n, mut members)| {
                // Stable sort keeps batch order among equal confidences
                members.sort_by(|a, b| {
                    learnings[*b]
                        .confidence
                        .partial_cmp(&learnings[*a].confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

                let confidence = members
                    .iter()
                    .map(|i| learnings[*i].confidence)
                    .fold(0.0, f64::max);
                let decay_days = members
                    .iter()
                    .map(|i| learnings[*i].decay_days)
                    .max()
                    .unwrap_or(0);
                let proposed_text = consolidated_text(
                    members.iter().map(|i| learnings[*i].actionable_text.as_str()),
                );

                ConsolidationProposal {
                    group_id: format!("group-{}", n + 1),
                    members,
                    proposed_text,
                    confidence,
                    decay_days,
                }
            })
            .collect()
    }

    /// Fold the human's answers back into the batch
    ///
    /// `choices[k]` answers `proposals[k]`. A missing answer keeps members separate.
    pub fn apply_choices(
        learnings: Vec<Learning>,
        proposals: &[ConsolidationProposal],
        choices: &[ConsolidationChoice],
    ) -> Vec<Learning> {
        let mut slots: Vec<Option<Learning>> = learnings.into_iter().map(Some).collect();

        for (k, proposal) in proposals.iter().enumerate() {
            let choice = choices.get(k).unwrap_or(&ConsolidationChoice::KeepSeparate);

            let text = match choice {
                ConsolidationChoice::KeepSeparate => {
                    for i in &proposal.members {
                        if let Some(Some(member)) = slots.get_mut(*i) {
                            member.dedupe_group_id = Some(proposal.group_id.clone());
                        }
                    }
                    continue;
                }
                ConsolidationChoice::Accept => proposal.proposed_text.clone(),
                ConsolidationChoice::Edit(text) => actionable_text(text),
            };

            let members: Vec<Learning> = proposal
                .members
                .iter()
                .filter_map(|i| slots.get_mut(*i).and_then(Option::take))
                .collect();
            let Some(first) = members.first() else {
                continue;
            };

            let mut merged = first.clone();
            merged.actionable_text = text;
            merged.dedupe_group_id = Some(proposal.group_id.clone());
            merged.confidence = proposal.confidence;
            merged.decay_days = proposal.decay_days;
            merged.sources = members.iter().flat_map(|m| m.sources.clone()).collect();
            merged.captured_at = members
                .iter()
                .map(|m| m.captured_at)
                .max()
                .unwrap_or(first.captured_at);
            merged.ambiguous = members.iter().any(|m| m.ambiguous);
            merged.scope_flagged = members.iter().all(|m| m.scope_flagged);

            // Lands where its earliest member was
            let slot = proposal.members.iter().min().copied().unwrap_or(0);
            if let Some(entry) = slots.get_mut(slot) {
                *entry = Some(merged);
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// Stage B: existing document lines that look like this learning
    ///
    /// Best match first. Empty means the learning is new.
    pub fn find_existing(&self, learning: &Learning, entries: &[MemoryEntry]) -> Vec<ExistingMatch> {
        let normalized = lexicon::normalize(&learning.actionable_text);
        let keywords: HashSet<String> = lexicon::keywords(&learning.actionable_text)
            .into_iter()
            .collect();
        let subjects = self.subjects(learning);

        let mut hits: Vec<(ExistingMatch, i64)> = entries
            .iter()
            .filter_map(|entry| {
                let exact = lexicon::normalize(&entry.text) == normalized;
                let overlap = if exact {
                    1.0
                } else {
                    jaccard(&keywords, &lexicon::keywords(&entry.text).into_iter().collect())
                };
                if !exact && overlap < MIN_OVERLAP {
                    return None;
                }

                let fuzzy: i64 = subjects
                    .iter()
                    .filter_map(|s| self.matcher.fuzzy_match(&entry.text, s))
                    .sum();

                Some((
                    ExistingMatch {
                        entry: entry.clone(),
                        overlap,
                        exact,
                    },
                    fuzzy,
                ))
            })
            .collect();

        hits.sort_by(|(a, fa), (b, fb)| {
            b.overlap
                .partial_cmp(&a.overlap)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(fb.cmp(fa))
        });

        hits.into_iter().map(|(hit, _)| hit).collect()
    }
}

fn consolidated_text<'a>(texts: impl Iterator<Item = &'a str>) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (n, text) in texts.enumerate() {
        let part = text.trim().trim_end_matches(['.', '!']).trim().to_string();
        if part.is_empty() || parts.iter().any(|p| p.eq_ignore_ascii_case(&part)) {
            continue;
        }
        parts.push(if n == 0 { part } else { lower_first(&part) });
    }
    actionable_text(&parts.join("; "))
}

// "Prefer x" -> "prefer x", but "SQLite ..." stays as is
fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_lowercase() => {
            first.to_lowercase().collect::<String>() + &text[first.len_utf8()..]
        }
        _ => text.to_string(),
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f64;
    let total = a.union(b).count() as f64;
    shared / total
}

fn find(parent: &mut [usize], i: usize) -> usize {
    let mut root = i;
    while parent[root] != root {
        root = parent[root];
    }
    // Path compression
    let mut node = i;
    while parent[node] != root {
        let next = parent[node];
        parent[node] = root;
        node = next;
    }
    root
}

// Project rules only merge within their own project
fn same_home(a: &Learning, b: &Learning) -> bool {
    a.scope == b.scope
        && (a.scope != Scope::Project || a.source_project_path == b.source_project_path)
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[high] = low;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::TargetKind;
    use crate::intelligence::learning::{Scope, SectionTag};
    use crate::queue::{CandidateCorrection, SourceType};
    use std::path::PathBuf;

    fn learning(text: &str, scope: Scope, confidence: f64) -> Learning {
        let candidate = CandidateCorrection::new(text, "/a", SourceType::PatternMatch, confidence);
        Learning::from_candidate(&candidate, text, scope, SectionTag::ModelPrefs)
    }

    fn entry(text: &str, line: usize) -> MemoryEntry {
        MemoryEntry {
            text: text.to_string(),
            source_file: PathBuf::from("/home/u/.claude/CLAUDE.md"),
            relative_path: "~/.claude/CLAUDE.md".to_string(),
            source_kind: TargetKind::Global,
            line,
        }
    }

    #[test]
    fn test_model_learnings_cluster() {
        let dedup = Deduplicator::new().unwrap();
        let batch = vec![
            learning("Use gpt-5.1 for complex tasks", Scope::Global, 0.6),
            learning("Prefer gpt-5.1 over gpt-5 for reasoning", Scope::Global, 0.6),
            learning("Use Postgres not SQLite", Scope::Project, 0.7),
        ];

        let proposals = dedup.propose_clusters(&batch);
        assert_eq!(proposals.len(), 1);

        let proposal = &proposals[0];
        assert_eq!(proposal.members, vec![0, 1]);
        assert!(proposal.proposed_text.contains("gpt-5.1"));
        assert!(proposal.proposed_text.contains("reasoning"));
        assert_eq!(proposal.confidence, 0.6);
    }

    #[test]
    fn test_cluster_takes_max_confidence_and_decay() {
        let dedup = Deduplicator::new().unwrap();
        let mut low = learning("Use uv for installs", Scope::Global, 0.6);
        low.decay_days = 120;
        let high = learning("Never call pip directly, use uv", Scope::Global, 0.85);

        let proposals = dedup.propose_clusters(&[low, high]);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].members, vec![1, 0]);
        assert_eq!(proposals[0].confidence, 0.85);
        assert_eq!(proposals[0].decay_days, 120);
        assert!(proposals[0].proposed_text.starts_with("Never call pip"));
    }

    #[test]
    fn test_different_scope_never_clusters() {
        let dedup = Deduplicator::new().unwrap();
        let batch = vec![
            learning("Use docker compose v2", Scope::Global, 0.6),
            learning("Run docker with --rm here", Scope::Project, 0.6),
        ];
        assert!(dedup.propose_clusters(&batch).is_empty());
    }

    #[test]
    fn test_project_rules_from_different_projects_never_cluster() {
        let dedup = Deduplicator::new().unwrap();
        let mut other = learning("Use Postgres not SQLite", Scope::Project, 0.6);
        other.source_project_path = "/b".to_string();
        let batch = vec![
            learning("Use Postgres for queues", Scope::Project, 0.6),
            other,
            learning("Keep Postgres on 16", Scope::Project, 0.6),
        ];

        let proposals = dedup.propose_clusters(&batch);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].members, vec![0, 2]);
    }

    #[test]
    fn test_apply_choices() {
        let dedup = Deduplicator::new().unwrap();
        let batch = vec![
            learning("Use gpt-5.1 for complex tasks", Scope::Global, 0.6),
            learning("Use Postgres not SQLite", Scope::Project, 0.7),
            learning("Prefer gpt-5.1 over gpt-5 for reasoning", Scope::Global, 0.6),
        ];
        let sources: Vec<_> = batch.iter().flat_map(|l| l.sources.clone()).collect();
        let proposals = dedup.propose_clusters(&batch);

        let merged = Deduplicator::apply_choices(
            batch.clone(),
            &proposals,
            &[ConsolidationChoice::Accept],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].dedupe_group_id.as_deref(), Some("group-1"));
        assert_eq!(merged[0].sources, vec![sources[0].clone(), sources[2].clone()]);
        assert_eq!(merged[1].actionable_text, "Use Postgres not SQLite");

        let separate = Deduplicator::apply_choices(
            batch.clone(),
            &proposals,
            &[ConsolidationChoice::KeepSeparate],
        );
        assert_eq!(separate.len(), 3);
        assert_eq!(separate[2].dedupe_group_id.as_deref(), Some("group-1"));

        let edited = Deduplicator::apply_choices(
            batch,
            &proposals,
            &[ConsolidationChoice::Edit("use gpt-5.1 for hard reasoning".to_string())],
        );
        assert_eq!(edited[0].actionable_text, "Use gpt-5.1 for hard reasoning.");
    }

    #[test]
    fn test_find_existing() {
        let dedup = Deduplicator::new().unwrap();
        let entries = vec![
            entry("Always run cargo fmt before committing", 3),
            entry("Use gpt-5.1 for complex tasks", 4),
            entry("Prefer gpt-5.1 for complex reasoning tasks", 5),
        ];

        let exact = dedup.find_existing(
            &learning("use GPT-5.1 for complex tasks.", Scope::Global, 0.6),
            &entries,
        );
        assert!(!exact.is_empty());
        assert!(exact[0].exact);
        assert_eq!(exact[0].entry.line, 4);

        let none = dedup.find_existing(
            &learning("Never force push to main", Scope::Global, 0.6),
            &entries,
        );
        assert!(none.is_empty());
    }
}
