/// Target document model
///
/// A knowledge document is plain markdown. Either it is free-form (section
/// headers with `- ` bullets under them) or it carries a managed region
/// between two sentinel comments that we own and regenerate.

use crate::error::{ReflectError, Result};
use crate::intelligence::learning::SectionTag;
use crate::intelligence::lexicon;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const BEGIN_MARKER: &str = "<!-- reflect:begin -->";
pub const END_MARKER: &str = "<!-- reflect:end -->";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentStyle {
    FreeFormSectioned,
    ManagedBlock,
}

/// A markdown header line
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub tag: Option<SectionTag>,
    pub level: usize,
    /// 0-based line index of the header
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct TargetDocument {
    path: PathBuf,
    lines: Vec<String>,
    style: DocumentStyle,
    /// Normalised bullet text to 0-based line index, first occurrence
    bullets: HashMap<String, usize>,
    sections: Vec<Section>,
    /// Line indices of the begin and end markers
    managed: Option<(usize, usize)>,
    /// "\r\n" when the file uses it, so untouched lines come back as they were
    line_ending: &'static str,
    trailing_newline: bool,
    exists: bool,
}

impl TargetDocument {
    /// Parse document text
    ///
    /// Fails when the managed-region markers don't pair up.
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Result<Self> {
        let path = path.into();
        let lines: Vec<String> = content.lines().map(String::from).collect();

        let begins: Vec<usize> = marker_lines(&lines, BEGIN_MARKER);
        let ends: Vec<usize> = marker_lines(&lines, END_MARKER);
        let managed = match (begins.as_slice(), ends.as_slice()) {
            ([], []) => None,
            ([begin], [end]) if begin < end => Some((*begin, *end)),
            _ => {
                return Err(ReflectError::document(
                    &path,
                    "unbalanced reflect markers",
                ))
            }
        };

        let mut bullets = HashMap::new();
        let mut sections = Vec::new();
        let mut in_fence = false;

        for (n, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }

            if let Some(text) = bullet_text(line) {
                bullets.entry(lexicon::normalize(text)).or_insert(n);
            } else if let Some((level, title)) = header(line) {
                sections.push(Section {
                    title: title.to_string(),
                    tag: SectionTag::from_heading(title),
                    level,
                    line: n,
                });
            }
        }

        Ok(Self {
            path,
            lines,
            style: if managed.is_some() {
                DocumentStyle::ManagedBlock
            } else {
                DocumentStyle::FreeFormSectioned
            },
            bullets,
            sections,
            managed,
            line_ending: line_ending(content),
            trailing_newline: content.ends_with('\n') || content.is_empty(),
            exists: true,
        })
    }

    /// A document that isn't on disk yet, starting with just a title
    pub fn empty(path: impl Into<PathBuf>, heading: &str) -> Self {
        let mut doc = Self {
            path: path.into(),
            lines: vec![heading.to_string()],
            style: DocumentStyle::FreeFormSectioned,
            bullets: HashMap::new(),
            sections: Vec::new(),
            managed: None,
            line_ending: "\n",
            trailing_newline: true,
            exists: false,
        };
        if let Some((level, title)) = header(heading) {
            doc.sections.push(Section {
                title: title.to_string(),
                tag: SectionTag::from_heading(title),
                level,
                line: 0,
            });
        }
        doc
    }

    /// Read a document, or start an empty one when the file is missing
    pub async fn load(path: &Path, heading: &str) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::parse(path, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty(path, heading)),
            Err(e) => Err(ReflectError::document(path, e.to_string())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn style(&self) -> DocumentStyle {
        self.style
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn managed_range(&self) -> Option<(usize, usize)> {
        self.managed
    }

    /// Line index of a bullet with the same normalised text
    pub fn find_bullet(&self, text: &str) -> Option<usize> {
        self.bullets.get(&lexicon::normalize(text)).copied()
    }

    /// Bullet text at a 0-based line, if that line is a bullet
    pub fn bullet_at(&self, line: usize) -> Option<&str> {
        self.lines.get(line).and_then(|l| bullet_text(l))
    }

    /// Header of the section for a tag, outside any managed region
    pub fn section_for(&self, tag: SectionTag) -> Option<&Section> {
        self.sections
            .iter()
            .filter(|s| !self.in_managed(s.line))
            .find(|s| s.tag == Some(tag))
    }

    /// Entries currently inside the managed region, with their sections
    ///
    /// Bullets under an unrecognised header count as conventions.
    pub fn managed_entries(&self) -> Vec<(SectionTag, String)> {
        let Some((begin, end)) = self.managed else {
            return Vec::new();
        };

        let mut current = SectionTag::Conventions;
        let mut entries = Vec::new();
        for line in &self.lines[begin + 1..end] {
            if let Some(text) = bullet_text(line) {
                entries.push((current, text.to_string()));
            } else if let Some((_, title)) = header(line) {
                current = SectionTag::from_heading(title).unwrap_or(SectionTag::Conventions);
            }
        }
        entries
    }

    pub(crate) fn in_managed(&self, line: usize) -> bool {
        self.managed
            .is_some_and(|(begin, end)| line > begin && line < end)
    }

    /// Document text as it would be written
    pub fn render(&self) -> String {
        let mut out = self.lines.join(self.line_ending);
        if self.trailing_newline && !out.is_empty() {
            out.push_str(self.line_ending);
        }
        out
    }

    // Mutators used by the merger. Indices shift, so re-parse after a batch.

    pub(crate) fn replace_line(&mut self, line: usize, text: &str) {
        if let Some(existing) = self.lines.get_mut(line) {
            let indent: String = existing.chars().take_while(|c| c.is_whitespace()).collect();
            *existing = format!("{}- {}", indent, text);
        }
    }

    pub(crate) fn insert_line(&mut self, at: usize, text: String) {
        let at = at.min(self.lines.len());
        self.lines.insert(at, text);
    }

    pub(crate) fn push_line(&mut self, text: String) {
        self.lines.push(text);
    }

    pub(crate) fn replace_range(&mut self, begin: usize, end: usize, replacement: Vec<String>) {
        self.lines.splice(begin..=end, replacement);
    }

    /// Re-index after edits
    pub(crate) fn reparse(self) -> Result<Self> {
        let exists = self.exists;
        let mut doc = Self::parse(self.path.clone(), &self.render())?;
        doc.exists = exists;
        Ok(doc)
    }
}

// Whatever ends the first line
fn line_ending(content: &str) -> &'static str {
    match content.find('\n') {
        Some(n) if content[..n].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

fn marker_lines(lines: &[String], marker: &str) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim() == marker)
        .map(|(n, _)| n)
        .collect()
}

/// Text of a `- ` bullet line
pub fn bullet_text(line: &str) -> Option<&str> {
    let text = line.trim_start().strip_prefix("- ")?.trim();
    (!text.is_empty()).then_some(text)
}

// "## Title" -> (2, "Title")
fn header(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let title = trimmed[level..].strip_prefix(' ')?.trim();
    (!title.is_empty()).then_some((level, title))
}
