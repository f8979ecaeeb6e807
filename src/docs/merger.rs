// Writes approved learnings into their documents
//
// Each document is computed in memory, then swapped in with one rename.
// A document either gets all of its entries or none of them, and one
// failing document never stops the others.

use crate::docs::discovery::{MemoryEntry, TargetFile, TargetKind};
use crate::docs::document::{DocumentStyle, TargetDocument, BEGIN_MARKER, END_MARKER};
use crate::error::{ReflectError, Result};
use crate::intelligence::learning::{MergeDisposition, SectionTag};
use crate::intelligence::lexicon;
use crate::queue::store::replace_file;
use crate::queue::QueueKey;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// One approved learning, ready to land in a document
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovedEntry {
    pub text: String,
    pub section_tag: SectionTag,
    pub disposition: MergeDisposition,
    /// Line being merged into or replaced
    pub existing: Option<MemoryEntry>,
    pub sources: Vec<QueueKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum DocumentOutcome {
    Applied { entries: usize },
    Unchanged,
    Failed { reason: String },
}

impl std::fmt::Display for DocumentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentOutcome::Applied { entries } => write!(f, "applied {} entries", entries),
            DocumentOutcome::Unchanged => write!(f, "unchanged"),
            DocumentOutcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentStatus {
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: DocumentOutcome,
}

/// What a review run did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunResult {
    pub applied_count: usize,
    pub skipped_count: usize,
    pub per_document_status: Vec<DocumentStatus>,
}

impl RunResult {
    pub fn failed_documents(&self) -> impl Iterator<Item = &DocumentStatus> {
        self.per_document_status
            .iter()
            .filter(|s| matches!(s.outcome, DocumentOutcome::Failed { .. }))
    }
}

/// Title line for a document we have to create
pub fn new_document_heading(target: &TargetFile) -> String {
    match target.kind {
        TargetKind::Global => "# Global Memory".to_string(),
        TargetKind::Rule | TargetKind::UserRule => {
            let stem = target
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let title: Vec<String> = stem
                .split(['-', '_'])
                .filter(|w| !w.is_empty())
                .map(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect();
            format!("# {}", title.join(" "))
        }
        _ => "# Project Memory".to_string(),
    }
}

pub struct Merger;

impl Merger {
    /// Apply entries to a parsed document, returning the new document and
    /// how many entries changed it
    pub fn merge(doc: TargetDocument, entries: &[ApprovedEntry]) -> Result<(TargetDocument, usize)> {
        match doc.style() {
            DocumentStyle::ManagedBlock => Self::merge_managed(doc, entries),
            DocumentStyle::FreeFormSectioned => Self::merge_free_form(doc, entries),
        }
    }

    fn merge_free_form(
        mut doc: TargetDocument,
        entries: &[ApprovedEntry],
    ) -> Result<(TargetDocument, usize)> {
        let mut changed = 0;

        for entry in entries {
            match entry.disposition {
                MergeDisposition::Skip => continue,
                MergeDisposition::Replace | MergeDisposition::Merge => {
                    let line = locate_existing(&doc, entry)?;
                    doc.replace_line(line, &entry.text);
                }
                MergeDisposition::New | MergeDisposition::AddAnyway => {
                    if entry.disposition == MergeDisposition::New
                        && doc.find_bullet(&entry.text).is_some()
                    {
                        continue;
                    }
                    append_bullet(&mut doc, entry.section_tag, &entry.text);
                }
            }
            doc = doc.reparse()?;
            changed += 1;
        }

        Ok((doc, changed))
    }

    fn merge_managed(
        doc: TargetDocument,
        entries: &[ApprovedEntry],
    ) -> Result<(TargetDocument, usize)> {
        let Some((begin, end)) = doc.managed_range() else {
            return Err(ReflectError::document(doc.path(), "managed region missing"));
        };

        let mut block = doc.managed_entries();
        let before = block.clone();
        // Hand-written bullets outside the region, edited in place
        let mut outside: Vec<(usize, String)> = Vec::new();

        for entry in entries {
            match entry.disposition {
                MergeDisposition::Skip => {}
                MergeDisposition::Replace | MergeDisposition::Merge => {
                    let Some(existing) = &entry.existing else {
                        return Err(ReflectError::document(
                            doc.path(),
                            format!("no existing line to {} for \"{}\"", entry.disposition, entry.text),
                        ));
                    };
                    let wanted = lexicon::normalize(&existing.text);
                    let slot = block
                        .iter_mut()
                        .find(|(_, text)| lexicon::normalize(text) == wanted);
                    match slot {
                        Some(slot) => *slot = (entry.section_tag, entry.text.clone()),
                        None => {
                            let line = locate_existing(&doc, entry)?;
                            if doc.in_managed(line) {
                                return Err(ReflectError::document(
                                    doc.path(),
                                    format!("line \"{}\" is no longer there", existing.text),
                                ));
                            }
                            outside.push((line, entry.text.clone()));
                        }
                    }
                }
                MergeDisposition::New | MergeDisposition::AddAnyway => {
                    block.push((entry.section_tag, entry.text.clone()));
                }
            }
        }

        let rendered = render_block(&block);
        let block_changed = render_block(&before) != rendered;
        if !block_changed && outside.is_empty() {
            return Ok((doc, 0));
        }
        let changed = entries
            .iter()
            .filter(|e| e.disposition != MergeDisposition::Skip)
            .count();

        let mut doc = doc;
        // Line edits keep indices, so the region bounds still hold
        for (line, text) in &outside {
            doc.replace_line(*line, text);
        }
        if block_changed {
            doc.replace_range(begin, end, rendered);
        }
        Ok((doc.reparse()?, changed))
    }

    /// Read, merge and atomically rewrite one document
    pub async fn apply_document(target: &TargetFile, entries: &[ApprovedEntry]) -> Result<usize> {
        let heading = new_document_heading(target);
        let doc = TargetDocument::load(&target.path, &heading).await?;
        let existed = doc.exists();
        let original = doc.render();

        let (doc, changed) = Self::merge(doc, entries)?;
        let rendered = doc.render();
        if existed && rendered == original {
            return Ok(0);
        }
        if !existed && changed == 0 {
            return Ok(0);
        }

        if let Some(parent) = target.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ReflectError::document(&target.path, e.to_string()))?;
        }
        replace_file(&target.path, rendered.as_bytes())
            .await
            .map_err(|e| ReflectError::document(&target.path, e.to_string()))?;

        info!(path = %target.path.display(), entries = changed, "Updated document");
        Ok(changed)
    }

    /// Apply every document's batch, collecting a status per document
    pub async fn apply_all(plan: &[(TargetFile, Vec<ApprovedEntry>)]) -> Vec<DocumentStatus> {
        let mut statuses = Vec::with_capacity(plan.len());
        for (target, entries) in plan {
            let outcome = match Self::apply_document(target, entries).await {
                Ok(0) => DocumentOutcome::Unchanged,
                Ok(n) => DocumentOutcome::Applied { entries: n },
                Err(e) => {
                    warn!(path = %target.path.display(), error = %e, "Document not updated");
                    DocumentOutcome::Failed {
                        reason: e.user_message(),
                    }
                }
            };
            statuses.push(DocumentStatus {
                path: target.path.clone(),
                outcome,
            });
        }
        statuses
    }
}

// Line number first, normalised text search second
fn locate_existing(doc: &TargetDocument, entry: &ApprovedEntry) -> Result<usize> {
    let Some(existing) = &entry.existing else {
        return Err(ReflectError::document(
            doc.path(),
            format!("no existing line to {} for \"{}\"", entry.disposition, entry.text),
        ));
    };

    let wanted = lexicon::normalize(&existing.text);
    let by_line = existing
        .line
        .checked_sub(1)
        .filter(|idx| {
            doc.bullet_at(*idx)
                .is_some_and(|text| lexicon::normalize(text) == wanted)
        });

    by_line
        .or_else(|| doc.find_bullet(&existing.text))
        .ok_or_else(|| {
            ReflectError::document(
                doc.path(),
                format!("line \"{}\" is no longer there", existing.text),
            )
        })
}

// Under the tag's section, after its last non-blank line, or in a new section at the end
fn append_bullet(doc: &mut TargetDocument, tag: SectionTag, text: &str) {
    let bullet = format!("- {}", text);

    if let Some(section) = doc.section_for(tag) {
        let start = section.line;
        let level = section.level;
        let next = doc
            .sections()
            .iter()
            .find(|s| s.line > start && s.level <= level)
            .map(|s| s.line)
            .unwrap_or(doc.lines().len());

        let last = (start + 1..next)
            .rev()
            .find(|n| !doc.lines()[*n].trim().is_empty())
            .unwrap_or(start);
        doc.insert_line(last + 1, bullet);
        return;
    }

    if doc.lines().last().is_some_and(|l| !l.trim().is_empty()) {
        doc.push_line(String::new());
    }
    doc.push_line(format!("## {}", tag.title()));
    doc.push_line(bullet);
}

fn render_block(entries: &[(SectionTag, String)]) -> Vec<String> {
    let mut out = vec![BEGIN_MARKER.to_string()];
    let mut seen: Vec<&str> = Vec::new();
    let mut first = true;

    for tag in SectionTag::ALL {
        let mut texts: Vec<&str> = Vec::new();
        for (entry_tag, text) in entries {
            let text = text.trim();
            if *entry_tag == tag && !seen.contains(&text) {
                seen.push(text);
                texts.push(text);
            }
        }
        if texts.is_empty() {
            continue;
        }

        if !first {
            out.push(String::new());
        }
        first = false;
        out.push(format!("### {}", tag.title()));
        out.extend(texts.into_iter().map(|t| format!("- {}", t)));
    }

    out.push(END_MARKER.to_string());
    out
}
