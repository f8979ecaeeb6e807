// The human-in-the-loop review
//
// A state machine over one working set: queued candidates plus whatever a
// scan found. Nothing lands in a document without passing CONFIRM, and
// nothing leaves the queue unless it was applied or explicitly skipped.
//
//   Idle -> Collected -> Filtered -> Deduped -> Summarized -> AwaitingStrategy
//   AwaitingStrategy --apply all--> Confirm
//   AwaitingStrategy --select--> Selection -> Confirm
//   AwaitingStrategy --details--> AwaitingStrategy
//   AwaitingStrategy --skip all--> Cleared
//   Confirm --confirm--> Applied -> Cleared
//   Confirm --cancel--> Cancelled -> AwaitingStrategy
//
// A preview run stops at Summarized.

use crate::config::Paths;
use crate::docs::discovery::{
    find_target_files, global_target, project_target, read_all_memory_entries, MemoryEntry,
    Router, TargetFile, TargetKind, DOCUMENT_NAME,
};
use crate::docs::merger::{ApprovedEntry, DocumentOutcome, Merger, RunResult};
use crate::error::{ReflectError, Result};
use crate::intelligence::analyzer::{Analyzer, Rejection, WorkItem};
use crate::intelligence::classifier::actionable_text;
use crate::intelligence::deduplicator::{ConsolidationChoice, ConsolidationProposal, Deduplicator, ExistingMatch};
use crate::intelligence::learning::{Learning, MergeDisposition, Scope, SectionTag};
use crate::queue::{CandidateCorrection, QueueKey, QueueStore, SourceType};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Idle,
    Collected,
    Filtered,
    Deduped,
    Summarized,
    AwaitingStrategy,
    Selection,
    Confirm,
    Applied,
    Cancelled,
    Cleared,
}

impl std::fmt::Display for ReviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReviewState::Idle => "idle",
            ReviewState::Collected => "collected",
            ReviewState::Filtered => "filtered",
            ReviewState::Deduped => "deduped",
            ReviewState::Summarized => "summarized",
            ReviewState::AwaitingStrategy => "awaiting a strategy",
            ReviewState::Selection => "selecting",
            ReviewState::Confirm => "awaiting confirmation",
            ReviewState::Applied => "applied",
            ReviewState::Cancelled => "cancelled",
            ReviewState::Cleared => "cleared",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ApplyAll,
    Select,
    ReviewDetails,
    SkipAll,
}

/// The human's answer for a learning that resembles an existing line
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Replace the existing line with this human-written text
    Merge(String),
    /// Replace the existing line with the learning
    Replace,
    AddAnyway,
    Skip,
}

/// One row of the review summary
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryItem {
    /// Position in the working set, what `select` takes
    pub index: usize,
    pub text: String,
    pub scope: Scope,
    pub section: SectionTag,
    pub target: String,
    pub disposition: Option<MergeDisposition>,
    pub source_type: SourceType,
    pub source_project_path: String,
    pub group: Option<String>,
    pub standing: f64,
    pub stale: bool,
    pub ambiguous: bool,
    pub scope_flagged: bool,
    pub existing: Vec<ExistingMatch>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    /// Highest standing first
    pub items: Vec<SummaryItem>,
    pub rejected: Vec<Rejection>,
    pub proposals: Vec<ConsolidationProposal>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.rejected.is_empty()
    }

    /// Items still waiting for a merge/replace/add/skip answer
    pub fn undecided(&self) -> usize {
        self.items.iter().filter(|i| i.disposition.is_none()).count()
    }
}

/// The UI side of a review
///
/// The workflow asks, the driver answers. A terminal prompt, a TUI, or a
/// scripted answer set in tests all fit.
pub trait ReviewDriver {
    /// Answer each proposal in order
    fn consolidate(
        &mut self,
        proposals: &[ConsolidationProposal],
        learnings: &[Learning],
    ) -> Vec<ConsolidationChoice>;

    /// Pick an existing line and what to do with it. None leaves it undecided.
    fn resolve(&mut self, learning: &Learning, hits: &[ExistingMatch]) -> Option<(usize, Resolution)>;

    fn show_summary(&mut self, summary: &Summary);

    /// None means the human walked away: stop without touching anything
    fn choose_strategy(&mut self, summary: &Summary) -> Option<Strategy>;

    fn show_details(&mut self, summary: &Summary);

    /// Working-set indices to apply
    fn select(&mut self, summary: &Summary) -> Vec<usize>;

    fn confirm(&mut self, summary: &Summary, selected: &[usize]) -> bool;
}

pub struct ReviewSession {
    state: ReviewState,
    preview: bool,
    paths: Paths,
    store: QueueStore,
    project_root: Option<PathBuf>,
    analyzer: Analyzer,
    router: Router,
    items: Vec<WorkItem>,
    learnings: Vec<Learning>,
    rejected: Vec<Rejection>,
    proposals: Vec<ConsolidationProposal>,
    existing: Vec<Vec<ExistingMatch>>,
    targets: Vec<TargetFile>,
    selected: Vec<usize>,
    result: Option<RunResult>,
}

impl ReviewSession {
    pub fn new(paths: Paths, project_root: Option<PathBuf>, preview: bool) -> Result<Self> {
        Self::with_analyzer(paths, project_root, preview, Analyzer::new()?)
    }

    pub fn with_analyzer(
        paths: Paths,
        project_root: Option<PathBuf>,
        preview: bool,
        analyzer: Analyzer,
    ) -> Result<Self> {
        let store = QueueStore::new(&paths.queue_file);
        Ok(Self {
            state: ReviewState::Idle,
            preview,
            paths,
            store,
            project_root,
            analyzer,
            router: Router::new()?,
            items: Vec::new(),
            learnings: Vec::new(),
            rejected: Vec::new(),
            proposals: Vec::new(),
            existing: Vec::new(),
            targets: Vec::new(),
            selected: Vec::new(),
            result: None,
        })
    }

    pub fn state(&self) -> ReviewState {
        self.state
    }

    pub fn is_preview(&self) -> bool {
        self.preview
    }

    pub fn learnings(&self) -> &[Learning] {
        &self.learnings
    }

    pub fn proposals(&self) -> &[ConsolidationProposal] {
        &self.proposals
    }

    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    pub fn result(&self) -> Option<&RunResult> {
        self.result.as_ref()
    }

    fn require(&self, allowed: &[ReviewState], event: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ReflectError::InvalidTransition {
                state: self.state.to_string(),
                event: event.to_string(),
            })
        }
    }

    // Everything past the summary writes or prepares writes
    fn require_live(&self, allowed: &[ReviewState], event: &str) -> Result<()> {
        if self.preview {
            return Err(ReflectError::InvalidTransition {
                state: format!("{} (preview)", self.state),
                event: event.to_string(),
            });
        }
        self.require(allowed, event)
    }

    /// Read the queue and add scan results that aren't already queued
    pub async fn collect(&mut self, scanned: Vec<WorkItem>) -> Result<usize> {
        self.require(&[ReviewState::Idle], "collect")?;

        let queued = self.store.read().await?;
        let queued_texts: HashSet<String> =
            queued.iter().map(|c| c.raw_text.trim().to_string()).collect();

        self.items = queued.into_iter().map(WorkItem::queued).collect();
        let before = self.items.len();
        self.items.extend(
            scanned
                .into_iter()
                .filter(|s| !queued_texts.contains(s.candidate.raw_text.trim())),
        );
        debug!(
            queued = before,
            scanned = self.items.len() - before,
            "Working set collected"
        );

        self.state = ReviewState::Collected;
        Ok(self.items.len())
    }

    /// Classify the working set
    pub fn filter(&mut self) -> Result<usize> {
        self.require(&[ReviewState::Collected], "filter")?;

        let (learnings, rejected) = self.analyzer.filter(&self.items);
        self.learnings = learnings;
        self.rejected = rejected;

        self.state = ReviewState::Filtered;
        Ok(self.learnings.len())
    }

    /// Find clusters inside the batch
    pub fn dedupe(&mut self) -> Result<&[ConsolidationProposal]> {
        self.require(&[ReviewState::Filtered], "dedupe")?;

        self.proposals = self.analyzer.propose(&self.learnings);
        self.state = ReviewState::Deduped;
        Ok(&self.proposals)
    }

    /// Apply the human's answers to the clusters, one per proposal
    pub fn consolidate(&mut self, choices: &[ConsolidationChoice]) -> Result<()> {
        self.require_live(&[ReviewState::Deduped], "consolidate")?;

        let learnings = std::mem::take(&mut self.learnings);
        self.learnings = Deduplicator::apply_choices(learnings, &self.proposals, choices);
        self.proposals.clear();
        Ok(())
    }

    /// Check against existing documents, route, and build the summary
    ///
    /// Clusters nobody answered are kept separate.
    pub async fn summarize(&mut self) -> Result<Summary> {
        self.require(&[ReviewState::Deduped], "summarize")?;

        if !self.proposals.is_empty() {
            let learnings = std::mem::take(&mut self.learnings);
            self.learnings = Deduplicator::apply_choices(learnings, &self.proposals, &[]);
        }

        // Each learning is checked against the documents of its own project
        let mut roots: Vec<Option<PathBuf>> = Vec::new();
        let mut home = Vec::with_capacity(self.learnings.len());
        for learning in &self.learnings {
            let root = match learning.source_project_path.as_str() {
                "" => self.project_root.clone(),
                source => Some(PathBuf::from(source)),
            };
            let k = match roots.iter().position(|r| *r == root) {
                Some(k) => k,
                None => {
                    roots.push(root);
                    roots.len() - 1
                }
            };
            home.push(k);
        }

        let mut documents: Vec<(Vec<TargetFile>, Vec<MemoryEntry>)> = Vec::with_capacity(roots.len());
        for root in &roots {
            let files = find_target_files(&self.paths, root.as_deref()).await;
            let entries = read_all_memory_entries(&self.paths, root.as_deref()).await;
            debug!(root = ?root, files = files.len(), entries = entries.len(), "Existing memory read");
            documents.push((files, entries));
        }

        self.existing = self
            .learnings
            .iter_mut()
            .zip(&home)
            .map(|(learning, k)| {
                self.analyzer
                    .check_existing(std::slice::from_mut(learning), &documents[*k].1)
                    .pop()
                    .unwrap_or_default()
            })
            .collect();
        self.targets = self
            .learnings
            .iter()
            .zip(&home)
            .map(|(l, k)| self.route(l, &documents[*k].0))
            .collect();

        self.state = ReviewState::Summarized;
        Ok(self.summary())
    }

    fn route(&self, learning: &Learning, files: &[TargetFile]) -> TargetFile {
        let source = learning.source_project_path.as_str();
        let same_project = source.is_empty()
            || self
                .project_root
                .as_deref()
                .map_or(true, |root| Path::new(source) == root);

        if same_project {
            let text = &learning.actionable_text;
            let suggested = self.router.suggest_target(
                text,
                files,
                self.router.kind_of(text),
                &self.paths,
                self.project_root.as_deref(),
            );
            // Wording may not promote a project learning to the global file
            if let Some(target) = suggested {
                if !(target.kind == TargetKind::Global && learning.scope == Scope::Project) {
                    return target;
                }
            }
        }

        match learning.scope {
            Scope::Global => files
                .iter()
                .find(|f| f.kind == TargetKind::Global)
                .cloned()
                .unwrap_or_else(|| global_target(&self.paths)),
            Scope::Project => {
                let root = if source.is_empty() {
                    match &self.project_root {
                        Some(root) => root.clone(),
                        None => return global_target(&self.paths),
                    }
                } else {
                    PathBuf::from(source)
                };
                let path = root.join(DOCUMENT_NAME);
                files
                    .iter()
                    .find(|f| f.path == path)
                    .cloned()
                    .unwrap_or_else(|| project_target(&root))
            }
        }
    }

    /// Current summary; reflects resolutions made so far
    pub fn summary(&self) -> Summary {
        let now = Utc::now();
        let mut items: Vec<SummaryItem> = self
            .learnings
            .iter()
            .enumerate()
            .map(|(index, l)| SummaryItem {
                index,
                text: l.actionable_text.clone(),
                scope: l.scope,
                section: l.section_tag,
                target: self
                    .targets
                    .get(index)
                    .map(|t| t.relative_path.clone())
                    .unwrap_or_default(),
                disposition: l.merge_disposition,
                source_type: l.source_type,
                source_project_path: l.source_project_path.clone(),
                group: l.dedupe_group_id.clone(),
                standing: l.standing(now),
                stale: l.is_stale(now),
                ambiguous: l.ambiguous,
                scope_flagged: l.scope_flagged,
                existing: self.existing.get(index).cloned().unwrap_or_default(),
            })
            .collect();

        items.sort_by(|a, b| {
            b.standing
                .partial_cmp(&a.standing)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Summary {
            items,
            rejected: self.rejected.clone(),
            proposals: self.proposals.clone(),
        }
    }

    /// Record the human's answer for a learning with existing-line hits
    pub fn resolve(&mut self, index: usize, hit: usize, resolution: Resolution) -> Result<()> {
        self.require_live(
            &[
                ReviewState::Summarized,
                ReviewState::AwaitingStrategy,
                ReviewState::Selection,
            ],
            "resolve",
        )?;

        let learning = self
            .learnings
            .get_mut(index)
            .ok_or_else(|| ReflectError::Generic(format!("No learning numbered {}", index + 1)))?;
        let matched = self.existing.get(index).and_then(|hits| hits.get(hit));

        let (disposition, needs_line) = match &resolution {
            Resolution::Merge(_) => (MergeDisposition::Merge, true),
            Resolution::Replace => (MergeDisposition::Replace, true),
            Resolution::AddAnyway => (MergeDisposition::AddAnyway, false),
            Resolution::Skip => (MergeDisposition::Skip, false),
        };

        if needs_line {
            let Some(matched) = matched else {
                return Err(ReflectError::Generic(format!(
                    "Learning {} has no existing line {}",
                    index + 1,
                    hit + 1
                )));
            };
            // The edit happens in the file the line lives in
            if let Some(target) = self.targets.get_mut(index) {
                *target = TargetFile {
                    path: matched.entry.source_file.clone(),
                    relative_path: matched.entry.relative_path.clone(),
                    kind: matched.entry.source_kind,
                    frontmatter: None,
                };
            }
            learning.existing_entry = Some(matched.entry.clone());
        }

        if let Resolution::Merge(text) = resolution {
            learning.actionable_text = actionable_text(&text);
        }
        learning.merge_disposition = Some(disposition);
        Ok(())
    }

    pub async fn choose_strategy(&mut self, strategy: Strategy) -> Result<()> {
        self.require_live(
            &[ReviewState::Summarized, ReviewState::AwaitingStrategy],
            "choose a strategy",
        )?;

        match strategy {
            Strategy::ApplyAll => {
                self.selected = (0..self.learnings.len()).collect();
                self.state = ReviewState::Confirm;
            }
            Strategy::Select => self.state = ReviewState::Selection,
            Strategy::ReviewDetails => self.state = ReviewState::AwaitingStrategy,
            Strategy::SkipAll => self.skip_all().await?,
        }
        Ok(())
    }

    /// Pick learnings by working-set index
    pub fn select(&mut self, indices: &[usize]) -> Result<()> {
        self.require_live(&[ReviewState::Selection], "select")?;

        if let Some(bad) = indices.iter().find(|i| **i >= self.learnings.len()) {
            return Err(ReflectError::Generic(format!(
                "No learning numbered {}",
                bad + 1
            )));
        }

        let mut selected: Vec<usize> = Vec::new();
        for i in indices {
            if !selected.contains(i) {
                selected.push(*i);
            }
        }
        self.selected = selected;
        self.state = ReviewState::Confirm;
        Ok(())
    }

    /// Back out at the confirmation step. Nothing is applied, nothing leaves the queue.
    pub fn cancel(&mut self) -> Result<()> {
        self.require_live(&[ReviewState::Confirm], "cancel")?;

        self.state = ReviewState::Cancelled;
        self.selected.clear();
        debug!("Review cancelled at confirmation");
        self.state = ReviewState::AwaitingStrategy;
        Ok(())
    }

    /// Apply the selection and clear what was reviewed
    pub async fn confirm(&mut self) -> Result<RunResult> {
        self.require_live(&[ReviewState::Confirm], "confirm")?;

        let mut plan: Vec<(TargetFile, Vec<ApprovedEntry>)> = Vec::new();
        let mut plan_members: Vec<Vec<usize>> = Vec::new();
        let mut skipped: Vec<usize> = Vec::new();

        for &i in &self.selected {
            let learning = &self.learnings[i];
            let disposition = match learning.merge_disposition {
                // Unanswered hit: stays queued for the next review
                None => continue,
                Some(MergeDisposition::Skip) => {
                    skipped.push(i);
                    continue;
                }
                Some(d) => d,
            };

            let target = &self.targets[i];
            let entry = ApprovedEntry {
                text: learning.actionable_text.clone(),
                section_tag: learning.section_tag,
                disposition,
                existing: learning.existing_entry.clone(),
                sources: learning.sources.clone(),
            };
            match plan.iter().position(|(t, _)| t.path == target.path) {
                Some(pos) => {
                    plan[pos].1.push(entry);
                    plan_members[pos].push(i);
                }
                None => {
                    plan.push((target.clone(), vec![entry]));
                    plan_members.push(vec![i]);
                }
            }
        }

        let statuses = Merger::apply_all(&plan).await;
        self.state = ReviewState::Applied;

        let mut done: Vec<usize> = Vec::new();
        for (status, members) in statuses.iter().zip(&plan_members) {
            if !matches!(status.outcome, DocumentOutcome::Failed { .. }) {
                done.extend(members);
            }
        }

        let mut cleared: HashSet<QueueKey> = HashSet::new();
        for &i in done.iter().chain(&skipped) {
            cleared.extend(self.learnings[i].sources.iter().cloned());
        }
        cleared.extend(self.rejected.iter().filter(|r| r.queued).map(|r| r.key.clone()));

        let finished: HashSet<usize> = done.iter().chain(&skipped).copied().collect();
        let pending: Vec<usize> = (0..self.learnings.len())
            .filter(|i| !finished.contains(i))
            .collect();

        self.store.remove(&cleared).await?;
        self.enqueue_pending_scans(&pending).await?;

        let result = RunResult {
            applied_count: done.len(),
            skipped_count: skipped.len() + self.rejected.len(),
            per_document_status: statuses,
        };
        info!(
            applied = result.applied_count,
            skipped = result.skipped_count,
            pending = pending.len(),
            "Review applied"
        );

        self.result = Some(result.clone());
        self.state = ReviewState::Cleared;
        Ok(result)
    }

    async fn skip_all(&mut self) -> Result<()> {
        let keys: HashSet<QueueKey> = self
            .items
            .iter()
            .filter(|item| item.queued)
            .map(|item| item.candidate.key())
            .collect();
        self.store.remove(&keys).await?;

        let result = RunResult {
            applied_count: 0,
            skipped_count: self.learnings.len() + self.rejected.len(),
            per_document_status: Vec::new(),
        };
        info!(skipped = result.skipped_count, "Review skipped, queue cleared");

        self.result = Some(result);
        self.state = ReviewState::Cleared;
        Ok(())
    }

    // Scan-only learnings that weren't resolved would otherwise vanish
    async fn enqueue_pending_scans(&self, pending: &[usize]) -> Result<()> {
        let sources: HashSet<&QueueKey> = pending
            .iter()
            .flat_map(|&i| self.learnings[i].sources.iter())
            .collect();
        let candidates: Vec<CandidateCorrection> = self
            .items
            .iter()
            .filter(|item| !item.queued && sources.contains(&item.candidate.key()))
            .map(|item| item.candidate.clone())
            .collect();

        if !candidates.is_empty() {
            debug!(count = candidates.len(), "Queueing unresolved scan results");
            self.store.append_many(&candidates).await?;
        }
        Ok(())
    }

    /// Drive the whole review through a UI
    ///
    /// Returns None for a preview, or when the human walks away.
    pub async fn run<D: ReviewDriver + ?Sized>(
        &mut self,
        scanned: Vec<WorkItem>,
        driver: &mut D,
    ) -> Result<Option<RunResult>> {
        self.collect(scanned).await?;
        self.filter()?;
        self.dedupe()?;

        if !self.preview && !self.proposals.is_empty() {
            let choices = driver.consolidate(&self.proposals, &self.learnings);
            self.consolidate(&choices)?;
        }

        let summary = self.summarize().await?;
        driver.show_summary(&summary);
        if self.preview || summary.is_empty() {
            return Ok(None);
        }

        for index in 0..self.learnings.len() {
            let hits = self.existing[index].clone();
            if hits.is_empty() {
                continue;
            }
            if let Some((hit, resolution)) = driver.resolve(&self.learnings[index], &hits) {
                self.resolve(index, hit, resolution)?;
            }
        }

        loop {
            let summary = self.summary();
            let Some(strategy) = driver.choose_strategy(&summary) else {
                return Ok(None);
            };
            self.choose_strategy(strategy).await?;

            match strategy {
                Strategy::SkipAll => return Ok(self.result.clone()),
                Strategy::ReviewDetails => {
                    driver.show_details(&summary);
                    continue;
                }
                Strategy::Select => {
                    let picks = driver.select(&summary);
                    self.select(&picks)?;
                }
                Strategy::ApplyAll => {}
            }

            if driver.confirm(&self.summary(), &self.selected) {
                return self.confirm().await.map(Some);
            }
            self.cancel()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::merger::DocumentStatus;
    use std::fs;
    use tempfile::TempDir;

    struct Setup {
        _temp: TempDir,
        paths: Paths,
        project: PathBuf,
    }

    impl Setup {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let claude = temp.path().join("claude");
            let project = temp.path().join("app");
            fs::create_dir_all(&claude).unwrap();
            fs::create_dir_all(&project).unwrap();
            Self {
                paths: Paths::with_claude_dir(&claude),
                project,
                _temp: temp,
            }
        }

        fn project_str(&self) -> String {
            self.project.display().to_string()
        }

        fn store(&self) -> QueueStore {
            QueueStore::new(&self.paths.queue_file)
        }

        async fn enqueue(&self, texts: &[&str]) -> Vec<CandidateCorrection> {
            let mut out = Vec::new();
            for text in texts {
                let c = CandidateCorrection::new(*text, self.project_str(), SourceType::PatternMatch, 0.6);
                self.store().append(&c).await.unwrap();
                out.push(c);
            }
            out
        }

        fn session(&self, preview: bool) -> ReviewSession {
            ReviewSession::new(self.paths.clone(), Some(self.project.clone()), preview).unwrap()
        }
    }

    async fn to_summary(session: &mut ReviewSession) -> Summary {
        session.collect(Vec::new()).await.unwrap();
        session.filter().unwrap();
        session.dedupe().unwrap();
        session.summarize().await.unwrap()
    }

    #[tokio::test]
    async fn test_apply_all_clears_queue() {
        let setup = Setup::new();
        setup.enqueue(&["no, use Postgres not SQLite", "ok thanks"]).await;

        let mut session = setup.session(false);
        let summary = to_summary(&mut session).await;
        assert_eq!(summary.items.len(), 1);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.items[0].target, "./CLAUDE.md");

        session.choose_strategy(Strategy::ApplyAll).await.unwrap();
        assert_eq!(session.state(), ReviewState::Confirm);
        let result = session.confirm().await.unwrap();

        assert_eq!(result.applied_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(
            result.per_document_status,
            vec![DocumentStatus {
                path: setup.project.join("CLAUDE.md"),
                outcome: DocumentOutcome::Applied { entries: 1 },
            }]
        );
        assert_eq!(session.state(), ReviewState::Cleared);
        assert!(setup.store().is_empty().await.unwrap());

        let doc = fs::read_to_string(setup.project.join("CLAUDE.md")).unwrap();
        assert!(doc.contains("- Use Postgres not SQLite."));
    }

    #[tokio::test]
    async fn test_preview_stops_at_summary() {
        let setup = Setup::new();
        setup.enqueue(&["no, use Postgres not SQLite"]).await;

        let mut session = setup.session(true);
        to_summary(&mut session).await;
        assert_eq!(session.state(), ReviewState::Summarized);

        let err = session.choose_strategy(Strategy::ApplyAll).await.unwrap_err();
        assert!(matches!(err, ReflectError::InvalidTransition { .. }));
        assert_eq!(session.state(), ReviewState::Summarized);

        assert_eq!(setup.store().len().await.unwrap(), 1);
        assert!(!setup.project.join("CLAUDE.md").exists());
    }

    #[tokio::test]
    async fn test_invalid_transition_keeps_state() {
        let setup = Setup::new();
        let mut session = setup.session(false);

        assert!(matches!(
            session.filter(),
            Err(ReflectError::InvalidTransition { .. })
        ));
        assert_eq!(session.state(), ReviewState::Idle);

        session.collect(Vec::new()).await.unwrap();
        assert!(session.confirm().await.is_err());
        assert_eq!(session.state(), ReviewState::Collected);
    }

    #[tokio::test]
    async fn test_cancel_returns_to_strategy() {
        let setup = Setup::new();
        setup.enqueue(&["no, use Postgres not SQLite"]).await;

        let mut session = setup.session(false);
        to_summary(&mut session).await;
        session.choose_strategy(Strategy::ApplyAll).await.unwrap();
        session.cancel().unwrap();

        assert_eq!(session.state(), ReviewState::AwaitingStrategy);
        assert!(session.selected().is_empty());
        assert_eq!(setup.store().len().await.unwrap(), 1);
        assert!(!setup.project.join("CLAUDE.md").exists());
    }

    #[tokio::test]
    async fn test_select_leaves_rest_queued() {
        let setup = Setup::new();
        let queued = setup
            .enqueue(&["no, use Postgres not SQLite", "don't use npm, use pnpm"])
            .await;

        let mut session = setup.session(false);
        to_summary(&mut session).await;
        session.choose_strategy(Strategy::Select).await.unwrap();
        assert!(session.select(&[5]).is_err());
        session.select(&[0]).unwrap();
        let result = session.confirm().await.unwrap();

        assert_eq!(result.applied_count, 1);
        let left = setup.store().read().await.unwrap();
        assert_eq!(left, vec![queued[1].clone()]);
    }

    #[tokio::test]
    async fn test_skip_all_clears_everything() {
        let setup = Setup::new();
        setup.enqueue(&["no, use Postgres not SQLite", "looks good"]).await;

        let mut session = setup.session(false);
        to_summary(&mut session).await;
        session.choose_strategy(Strategy::SkipAll).await.unwrap();

        assert_eq!(session.state(), ReviewState::Cleared);
        assert_eq!(session.result().unwrap().skipped_count, 2);
        assert!(setup.store().is_empty().await.unwrap());
        assert!(!setup.project.join("CLAUDE.md").exists());
    }

    #[tokio::test]
    async fn test_late_append_survives_commit() {
        let setup = Setup::new();
        setup.enqueue(&["no, use Postgres not SQLite"]).await;

        let mut session = setup.session(false);
        to_summary(&mut session).await;

        // Another session captures something mid-review
        let late = setup.enqueue(&["actually, use uv not pip"]).await;

        session.choose_strategy(Strategy::ApplyAll).await.unwrap();
        session.confirm().await.unwrap();

        assert_eq!(setup.store().read().await.unwrap(), late);
    }

    #[tokio::test]
    async fn test_failed_document_keeps_items_queued() {
        let setup = Setup::new();
        setup.enqueue(&["no, use Postgres not SQLite"]).await;
        fs::write(
            setup.project.join("CLAUDE.md"),
            format!("# App\n{}\n- half a block\n", crate::docs::BEGIN_MARKER),
        )
        .unwrap();

        let mut session = setup.session(false);
        to_summary(&mut session).await;
        session.choose_strategy(Strategy::ApplyAll).await.unwrap();
        let result = session.confirm().await.unwrap();

        assert_eq!(result.applied_count, 0);
        assert_eq!(result.failed_documents().count(), 1);
        assert_eq!(setup.store().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_existing_line_needs_a_decision() {
        let setup = Setup::new();
        setup.enqueue(&["no, use Postgres not SQLite"]).await;
        fs::write(
            setup.project.join("CLAUDE.md"),
            "# App\n\n## Conventions\n- use postgres, not sqlite\n",
        )
        .unwrap();

        let mut session = setup.session(false);
        let summary = to_summary(&mut session).await;
        assert_eq!(summary.undecided(), 1);
        assert!(summary.items[0].existing[0].exact);

        // Undecided items are not applied and stay queued
        session.choose_strategy(Strategy::ApplyAll).await.unwrap();
        let result = session.confirm().await.unwrap();
        assert_eq!(result.applied_count, 0);
        assert_eq!(setup.store().len().await.unwrap(), 1);

        let mut session = setup.session(false);
        to_summary(&mut session).await;
        session
            .resolve(0, 0, Resolution::Merge("use Postgres 16, never SQLite".to_string()))
            .unwrap();
        session.choose_strategy(Strategy::ApplyAll).await.unwrap();
        let result = session.confirm().await.unwrap();

        assert_eq!(result.applied_count, 1);
        assert_eq!(
            fs::read_to_string(setup.project.join("CLAUDE.md")).unwrap(),
            "# App\n\n## Conventions\n- Use Postgres 16, never SQLite.\n"
        );
        assert!(setup.store().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_each_project_checked_against_its_own_documents() {
        let setup = Setup::new();
        let other = setup.project.with_file_name("other");
        fs::create_dir_all(&other).unwrap();
        fs::write(other.join("CLAUDE.md"), "# Other\n\n## Conventions\n- use postgres, not sqlite\n").unwrap();

        let from_other = CandidateCorrection::new(
            "no, use Postgres not SQLite",
            other.display().to_string(),
            SourceType::PatternMatch,
            0.6,
        );
        setup.store().append(&from_other).await.unwrap();
        setup.enqueue(&["actually, use pnpm not npm"]).await;

        let mut session = setup.session(false);
        let summary = to_summary(&mut session).await;
        assert_eq!(summary.items.len(), 2);

        let postgres = summary.items.iter().find(|i| i.text.contains("Postgres")).unwrap();
        assert_eq!(postgres.existing.len(), 1);
        assert_eq!(postgres.existing[0].entry.source_file, other.join("CLAUDE.md"));

        let pnpm = summary.items.iter().find(|i| i.text.contains("pnpm")).unwrap();
        assert!(pnpm.existing.is_empty());

        session.choose_strategy(Strategy::ApplyAll).await.unwrap();
        let result = session.confirm().await.unwrap();
        assert_eq!(result.applied_count, 1);
        assert!(!fs::read_to_string(other.join("CLAUDE.md")).unwrap().contains("pnpm"));
        assert_eq!(setup.store().read().await.unwrap(), vec![from_other]);
    }

    #[tokio::test]
    async fn test_unresolved_scan_results_are_queued() {
        let setup = Setup::new();
        let scanned = CandidateCorrection::new(
            "don't use npm, use pnpm",
            setup.project_str(),
            SourceType::HistoryScan,
            0.6,
        );

        let mut session = setup.session(false);
        session
            .collect(vec![WorkItem::scanned(scanned.clone(), Vec::new())])
            .await
            .unwrap();
        session.filter().unwrap();
        session.dedupe().unwrap();
        session.summarize().await.unwrap();
        session.choose_strategy(Strategy::Select).await.unwrap();
        session.select(&[]).unwrap();
        session.confirm().await.unwrap();

        assert_eq!(setup.store().read().await.unwrap(), vec![scanned]);
    }

    struct Scripted {
        strategies: Vec<Strategy>,
        confirms: Vec<bool>,
        summaries: usize,
    }

    impl ReviewDriver for Scripted {
        fn consolidate(
            &mut self,
            proposals: &[ConsolidationProposal],
            _learnings: &[Learning],
        ) -> Vec<ConsolidationChoice> {
            proposals.iter().map(|_| ConsolidationChoice::Accept).collect()
        }

        fn resolve(&mut self, _l: &Learning, _hits: &[ExistingMatch]) -> Option<(usize, Resolution)> {
            Some((0, Resolution::Skip))
        }

        fn show_summary(&mut self, _summary: &Summary) {
            self.summaries += 1;
        }

        fn choose_strategy(&mut self, _summary: &Summary) -> Option<Strategy> {
            if self.strategies.is_empty() {
                None
            } else {
                Some(self.strategies.remove(0))
            }
        }

        fn show_details(&mut self, _summary: &Summary) {}

        fn select(&mut self, _summary: &Summary) -> Vec<usize> {
            vec![0]
        }

        fn confirm(&mut self, _summary: &Summary, _selected: &[usize]) -> bool {
            if self.confirms.is_empty() {
                false
            } else {
                self.confirms.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn test_driver_run() {
        let setup = Setup::new();
        setup
            .enqueue(&[
                "Use gpt-5.1 for complex tasks",
                "Prefer gpt-5.1 over gpt-5 for reasoning",
            ])
            .await;

        let mut driver = Scripted {
            strategies: vec![Strategy::ReviewDetails, Strategy::ApplyAll, Strategy::ApplyAll],
            confirms: vec![false, true],
            summaries: 0,
        };
        let mut session = setup.session(false);
        let result = session.run(Vec::new(), &mut driver).await.unwrap().unwrap();

        assert_eq!(driver.summaries, 1);
        assert_eq!(result.applied_count, 1);
        assert!(setup.store().is_empty().await.unwrap());

        let global = fs::read_to_string(setup.paths.global_document()).unwrap();
        assert!(global.starts_with("# Global Memory\n"));
        assert!(global.contains("gpt-5.1 for complex tasks; prefer gpt-5.1 over gpt-5 for reasoning."));
    }

    #[tokio::test]
    async fn test_driver_walks_away() {
        let setup = Setup::new();
        setup.enqueue(&["no, use Postgres not SQLite"]).await;

        let mut driver = Scripted {
            strategies: Vec::new(),
            confirms: Vec::new(),
            summaries: 0,
        };
        let mut session = setup.session(false);
        assert!(session.run(Vec::new(), &mut driver).await.unwrap().is_none());
        assert_eq!(setup.store().len().await.unwrap(), 1);
    }
}
