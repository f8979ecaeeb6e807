// Finds the knowledge documents a project can write to, and picks one
//
// Six kinds of file: the global CLAUDE.md, the project root one, the
// untracked CLAUDE.local.md, nested ones in subdirectories, project rules
// and user rules. Plus the per-project auto memory folder.

use crate::config::Paths;
use crate::error::Result;
use crate::intelligence::lexicon::Lexicon;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DOCUMENT_NAME: &str = "CLAUDE.md";
pub const LOCAL_DOCUMENT_NAME: &str = "CLAUDE.local.md";
pub const GUARDRAILS_RULE: &str = "guardrails.md";

// Never descended when looking for nested documents
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "target",
    "venv",
    ".venv",
    "__pycache__",
    "dist",
    "build",
];

const MAX_WALK_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    Global,
    Root,
    Local,
    Subdirectory,
    Rule,
    UserRule,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TargetKind::Global => "global",
            TargetKind::Root => "root",
            TargetKind::Local => "local",
            TargetKind::Subdirectory => "subdirectory",
            TargetKind::Rule => "rule",
            TargetKind::UserRule => "user-rule",
        };
        write!(f, "{}", s)
    }
}

/// A frontmatter value: `key: value` or `key:` followed by `- item` lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrontmatterValue {
    Scalar(String),
    List(Vec<String>),
}

pub type Frontmatter = BTreeMap<String, FrontmatterValue>;

/// A discovered (or proposed) knowledge document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetFile {
    pub path: PathBuf,
    /// `./...` inside the project, `~/.claude/...` for user files
    pub relative_path: String,
    pub kind: TargetKind,
    pub frontmatter: Option<Frontmatter>,
}

impl TargetFile {
    fn new(path: PathBuf, relative_path: String, kind: TargetKind) -> Self {
        Self {
            path,
            relative_path,
            kind,
            frontmatter: None,
        }
    }

    /// Paths a rule file is scoped to, from its frontmatter
    pub fn rule_paths(&self) -> Vec<String> {
        match self.frontmatter.as_ref().and_then(|fm| fm.get("paths")) {
            Some(FrontmatterValue::List(items)) => items.clone(),
            Some(FrontmatterValue::Scalar(item)) => vec![item.clone()],
            None => Vec::new(),
        }
    }
}

/// One bullet line of an existing document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub text: String,
    pub source_file: PathBuf,
    pub relative_path: String,
    pub source_kind: TargetKind,
    /// 1-based
    pub line: usize,
}

/// Special handling a learning asks for when routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningKind {
    /// Restriction on what the assistant may do unprompted
    Guardrail,
}

/// Every knowledge document visible from the project, user files first
pub async fn find_target_files(paths: &Paths, project_root: Option<&Path>) -> Vec<TargetFile> {
    let mut files = Vec::new();

    let global = paths.global_document();
    if is_file(&global).await {
        files.push(TargetFile::new(
            global,
            format!("~/.claude/{}", DOCUMENT_NAME),
            TargetKind::Global,
        ));
    }

    for rule in list_markdown(&paths.user_rules_dir()).await {
        let name = file_name(&rule);
        let mut target = TargetFile::new(
            rule.clone(),
            format!("~/.claude/rules/{}", name),
            TargetKind::UserRule,
        );
        target.frontmatter = parse_rule_frontmatter(&rule).await;
        files.push(target);
    }

    let Some(root) = project_root else {
        return files;
    };

    let root_doc = root.join(DOCUMENT_NAME);
    if is_file(&root_doc).await {
        files.push(TargetFile::new(
            root_doc,
            format!("./{}", DOCUMENT_NAME),
            TargetKind::Root,
        ));
    }

    let local_doc = root.join(LOCAL_DOCUMENT_NAME);
    if is_file(&local_doc).await {
        files.push(TargetFile::new(
            local_doc,
            format!("./{}", LOCAL_DOCUMENT_NAME),
            TargetKind::Local,
        ));
    }

    for rule in list_markdown(&root.join(".claude").join("rules")).await {
        let mut target = TargetFile::new(
            rule.clone(),
            format!("./.claude/rules/{}", file_name(&rule)),
            TargetKind::Rule,
        );
        target.frontmatter = parse_rule_frontmatter(&rule).await;
        files.push(target);
    }

    for nested in find_nested_documents(root).await {
        let relative = nested
            .strip_prefix(root)
            .map(|p| format!("./{}", p.display()))
            .unwrap_or_else(|_| nested.display().to_string());
        files.push(TargetFile::new(nested, relative, TargetKind::Subdirectory));
    }

    files
}

// Breadth-first walk for CLAUDE.md below the root, skipping build and vendor dirs
async fn find_nested_documents(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![(root.to_path_buf(), 0usize)];

    while let Some((dir, depth)) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().to_string();

            if file_type.is_dir() {
                let hidden = name.starts_with('.');
                if !hidden && !EXCLUDED_DIRS.contains(&name.as_str()) && depth < MAX_WALK_DEPTH {
                    pending.push((path, depth + 1));
                }
            } else if depth > 0 && name == DOCUMENT_NAME {
                found.push(path);
            }
        }
    }

    found.sort();
    found
}

async fn list_markdown(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return out;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "md") && is_file(&path).await {
            out.push(path);
        }
    }
    out.sort();
    out
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Frontmatter of a rule file, None when absent, unclosed, empty or unreadable
pub async fn parse_rule_frontmatter(path: &Path) -> Option<Frontmatter> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    parse_frontmatter(&content)
}

pub fn parse_frontmatter(content: &str) -> Option<Frontmatter> {
    let mut lines = content.lines();
    if lines.next()?.trim() != "---" {
        return None;
    }

    let mut frontmatter = Frontmatter::new();
    let mut current_list: Option<String> = None;
    let mut closed = false;

    for line in lines {
        let trimmed = line.trim();
        if trimmed == "---" {
            closed = true;
            break;
        }
        if trimmed.is_empty() {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            if let Some(key) = &current_list {
                if let Some(FrontmatterValue::List(items)) = frontmatter.get_mut(key) {
                    items.push(unquote(item));
                }
            }
            continue;
        }

        if let Some((key, value)) = trimmed.split_once(':') {
            let key = key.trim().to_string();
            let value = value.trim();
            if value.is_empty() {
                frontmatter.insert(key.clone(), FrontmatterValue::List(Vec::new()));
                current_list = Some(key);
            } else {
                frontmatter.insert(key, FrontmatterValue::Scalar(unquote(value)));
                current_list = None;
            }
        }
    }

    if !closed || frontmatter.is_empty() {
        return None;
    }
    Some(frontmatter)
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

/// Every `- ` bullet of every discovered document
///
/// Missing or unreadable files are skipped.
pub async fn read_all_memory_entries(paths: &Paths, project_root: Option<&Path>) -> Vec<MemoryEntry> {
    let mut entries = Vec::new();
    for file in find_target_files(paths, project_root).await {
        match tokio::fs::read_to_string(&file.path).await {
            Ok(content) => entries.extend(bullet_entries(&content, &file)),
            Err(e) => warn!(path = %file.path.display(), error = %e, "Could not read document"),
        }
    }
    entries
}

pub fn bullet_entries(content: &str, file: &TargetFile) -> Vec<MemoryEntry> {
    let lines: Vec<&str> = content.lines().collect();
    let mut in_fence = false;

    lines
        .iter()
        .enumerate()
        .skip(frontmatter_len(&lines))
        .filter_map(|(n, line)| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return None;
            }
            if in_fence {
                return None;
            }
            let text = line.trim_start().strip_prefix("- ")?.trim();
            if text.is_empty() {
                return None;
            }
            Some(MemoryEntry {
                text: text.to_string(),
                source_file: file.path.clone(),
                relative_path: file.relative_path.clone(),
                source_kind: file.kind,
                line: n + 1,
            })
        })
        .collect()
}

// Lines taken by a closed leading `---` block, 0 when there is none
fn frontmatter_len(lines: &[&str]) -> usize {
    if lines.first().map(|l| l.trim()) != Some("---") {
        return 0;
    }
    lines
        .iter()
        .skip(1)
        .position(|l| l.trim() == "---")
        .map_or(0, |close| close + 2)
}

/// Picks a document for a learning when its wording says where it belongs
pub struct Router {
    lexicon: Lexicon,
    guardrail: Regex,
    workflow: Regex,
}

impl Router {
    pub fn new() -> Result<Self> {
        Ok(Self {
            lexicon: Lexicon::new()?,
            guardrail: Regex::new(
                r"(?i)\b(?:don't|dont|do not|never|stop)\b.*\b(?:unless|without (?:asking|being asked|permission|approval)|until (?:asked|told))\b|\bover-?engineer",
            )?,
            workflow: Regex::new(
                r"(?i)\b(?:before|after|workflow|deploy\w*|commit\w*|tests?|ci|review\w*|release\w*|merg\w+|push\w*)\b",
            )?,
        })
    }

    pub fn kind_of(&self, text: &str) -> Option<LearningKind> {
        self.guardrail
            .is_match(text)
            .then_some(LearningKind::Guardrail)
    }

    /// Suggest a target by wording alone
    ///
    /// Guardrails go to the project's guardrails rule (proposed if missing),
    /// text naming a path goes to the rule scoped to it, model or global
    /// phrasing goes to the global document. Anything else is None and
    /// falls back to scope routing.
    pub fn suggest_target(
        &self,
        text: &str,
        files: &[TargetFile],
        kind: Option<LearningKind>,
        paths: &Paths,
        project_root: Option<&Path>,
    ) -> Option<TargetFile> {
        if kind == Some(LearningKind::Guardrail) {
            let existing = files.iter().find(|f| {
                matches!(f.kind, TargetKind::Rule) && f.path.file_name().is_some_and(|n| n == GUARDRAILS_RULE)
            });
            if let Some(file) = existing {
                return Some(file.clone());
            }
            if let Some(root) = project_root {
                return Some(TargetFile::new(
                    root.join(".claude").join("rules").join(GUARDRAILS_RULE),
                    format!("./.claude/rules/{}", GUARDRAILS_RULE),
                    TargetKind::Rule,
                ));
            }
        }

        let lower = text.to_lowercase();
        let scoped = files.iter().find(|f| {
            matches!(f.kind, TargetKind::Rule | TargetKind::UserRule)
                && f.rule_paths().iter().any(|p| {
                    let p = p.trim_end_matches('*').trim_end_matches('/').to_lowercase();
                    !p.is_empty() && lower.contains(&p)
                })
        });
        if let Some(file) = scoped {
            return Some(file.clone());
        }

        if self.lexicon.mentions_model(text) || self.lexicon.is_generalizing(text) {
            return Some(
                files
                    .iter()
                    .find(|f| f.kind == TargetKind::Global)
                    .cloned()
                    .unwrap_or_else(|| global_target(paths)),
            );
        }

        None
    }

    /// Auto memory topic file for a learning
    pub fn suggest_memory_topic(&self, text: &str) -> &'static str {
        if self.lexicon.mentions_model(text) {
            "model-preferences"
        } else if self.lexicon.has_tool_vocab(text) {
            "tool-usage"
        } else if self.lexicon.has_environment_vocab(text) {
            "environment"
        } else if self.workflow.is_match(text) {
            "workflow"
        } else {
            "general"
        }
    }
}

pub fn global_target(paths: &Paths) -> TargetFile {
    TargetFile::new(
        paths.global_document(),
        format!("~/.claude/{}", DOCUMENT_NAME),
        TargetKind::Global,
    )
}

pub fn project_target(project_root: &Path) -> TargetFile {
    TargetFile::new(
        project_root.join(DOCUMENT_NAME),
        format!("./{}", DOCUMENT_NAME),
        TargetKind::Root,
    )
}

/// Host folder name for a project: anything but alphanumerics and `-` becomes `-`
pub fn project_folder_name(project_path: &str) -> String {
    project_path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

pub fn auto_memory_path(paths: &Paths, project_path: &str) -> PathBuf {
    paths
        .projects_dir()
        .join(project_folder_name(project_path))
        .join("memory")
}

/// One topic file in an auto memory folder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryTopic {
    pub name: String,
    pub path: PathBuf,
    pub entries: Vec<String>,
}

/// Topic files of an auto memory folder, by name. Missing folder is empty.
pub async fn read_auto_memory(dir: &Path) -> Vec<MemoryTopic> {
    let mut topics = Vec::new();
    for path in list_markdown(dir).await {
        let Ok(content) = tokio::fs::read_to_string(&path).await else {
            continue;
        };
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let entries = content
            .lines()
            .filter_map(|l| l.trim_start().strip_prefix("- "))
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        topics.push(MemoryTopic { name, path, entries });
    }
    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Paths, PathBuf) {
        let temp = TempDir::new().unwrap();
        let claude = temp.path().join("fake_claude");
        fs::create_dir_all(&claude).unwrap();
        let project = temp.path().join("project");
        fs::create_dir_all(&project).unwrap();
        (temp, Paths::with_claude_dir(&claude), project)
    }

    fn target(path: &str, relative: &str, kind: TargetKind, rule_paths: Option<Vec<&str>>) -> TargetFile {
        let mut file = TargetFile::new(PathBuf::from(path), relative.to_string(), kind);
        file.frontmatter = rule_paths.map(|items| {
            let mut fm = Frontmatter::new();
            fm.insert(
                "paths".to_string(),
                FrontmatterValue::List(items.into_iter().map(String::from).collect()),
            );
            fm
        });
        file
    }

    fn routing_files() -> Vec<TargetFile> {
        vec![
            target("/home/.claude/CLAUDE.md", "~/.claude/CLAUDE.md", TargetKind::Global, None),
            target("/project/CLAUDE.md", "./CLAUDE.md", TargetKind::Root, None),
            target(
                "/project/.claude/rules/guardrails.md",
                "./.claude/rules/guardrails.md",
                TargetKind::Rule,
                None,
            ),
            target(
                "/project/.claude/rules/api.md",
                "./.claude/rules/api.md",
                TargetKind::Rule,
                Some(vec!["src/api/"]),
            ),
        ]
    }

    #[test]
    fn test_frontmatter() {
        let fm = parse_frontmatter("---\npaths:\n  - src/\n  - lib/\n---\n\n# Rule\n").unwrap();
        assert_eq!(
            fm.get("paths"),
            Some(&FrontmatterValue::List(vec!["src/".to_string(), "lib/".to_string()]))
        );

        let fm = parse_frontmatter("---\npaths:\n  - \"src/api/\"\n  - 'lib/utils/'\n---\n").unwrap();
        assert_eq!(
            fm.get("paths"),
            Some(&FrontmatterValue::List(vec!["src/api/".to_string(), "lib/utils/".to_string()]))
        );

        let fm = parse_frontmatter("---\ndescription: My rule\n---\n\nContent\n").unwrap();
        assert_eq!(
            fm.get("description"),
            Some(&FrontmatterValue::Scalar("My rule".to_string()))
        );

        assert!(parse_frontmatter("# Just markdown\n- item\n").is_none());
        assert!(parse_frontmatter("---\npaths:\n  - src/\nno closing\n").is_none());
        assert!(parse_frontmatter("---\n---\n\nContent\n").is_none());
    }

    #[test]
    fn test_bullets_skip_frontmatter_and_fences() {
        let file = target(
            "/project/.claude/rules/api.md",
            "./.claude/rules/api.md",
            TargetKind::Rule,
            Some(vec!["src/**"]),
        );
        let content = "---\npaths:\n  - src/**\n  - lib/**\n---\n\n# API\n- Return JSON errors\n```\n- not a rule\n```\n";

        let entries = bullet_entries(content, &file);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "Return JSON errors");
        assert_eq!(entries[0].line, 8);

        // Unclosed block isn't frontmatter
        let entries = bullet_entries("---\n- Keep this\n", &file);
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_frontmatter_missing_file() {
        assert!(parse_rule_frontmatter(Path::new("/nonexistent/rule.md")).await.is_none());
    }

    #[tokio::test]
    async fn test_discovers_all_kinds() {
        let (_temp, paths, project) = setup();
        fs::write(paths.global_document(), "# Global\n").unwrap();
        fs::create_dir_all(paths.user_rules_dir()).unwrap();
        fs::write(paths.user_rules_dir().join("model-prefs.md"), "# Models\n").unwrap();

        fs::write(project.join("CLAUDE.md"), "# Root\n").unwrap();
        fs::write(project.join("CLAUDE.local.md"), "# Local\n").unwrap();
        let rules = project.join(".claude").join("rules");
        fs::create_dir_all(&rules).unwrap();
        fs::write(rules.join("style.md"), "# Style\n").unwrap();
        fs::write(rules.join("api.md"), "---\npaths:\n  - src/api/\n---\n\n# API\n").unwrap();
        fs::create_dir_all(project.join("src")).unwrap();
        fs::write(project.join("src").join("CLAUDE.md"), "# Src\n").unwrap();

        let files = find_target_files(&paths, Some(&project)).await;
        let kinds: Vec<TargetKind> = files.iter().map(|f| f.kind).collect();
        for kind in [
            TargetKind::Global,
            TargetKind::UserRule,
            TargetKind::Root,
            TargetKind::Local,
            TargetKind::Rule,
            TargetKind::Subdirectory,
        ] {
            assert!(kinds.contains(&kind), "missing {}", kind);
        }

        let local = files.iter().find(|f| f.kind == TargetKind::Local).unwrap();
        assert_eq!(local.relative_path, "./CLAUDE.local.md");

        let user_rule = files.iter().find(|f| f.kind == TargetKind::UserRule).unwrap();
        assert!(user_rule.relative_path.contains("model-prefs.md"));

        let api = files
            .iter()
            .find(|f| f.relative_path == "./.claude/rules/api.md")
            .unwrap();
        assert_eq!(api.rule_paths(), vec!["src/api/"]);
    }

    #[tokio::test]
    async fn test_excluded_dirs_skipped() {
        let (_temp, paths, project) = setup();
        let nm = project.join("node_modules");
        fs::create_dir_all(nm.join(".claude").join("rules")).unwrap();
        fs::write(nm.join("CLAUDE.md"), "# Excluded\n").unwrap();
        fs::write(nm.join(".claude").join("rules").join("bad.md"), "# Excluded\n").unwrap();

        let files = find_target_files(&paths, Some(&project)).await;
        assert!(files
            .iter()
            .all(|f| !f.path.to_string_lossy().contains("node_modules")));
    }

    #[tokio::test]
    async fn test_read_all_memory_entries() {
        let (_temp, paths, project) = setup();
        assert!(read_all_memory_entries(&paths, Some(&project)).await.is_empty());

        fs::write(paths.global_document(), "# Global\n- Use gpt-5.1\n- Always test\n").unwrap();
        fs::write(project.join("CLAUDE.md"), "# Project\n\n- Use postgres\n").unwrap();

        let entries = read_all_memory_entries(&paths, Some(&project)).await;
        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Use gpt-5.1", "Always test", "Use postgres"]);

        assert_eq!(entries[0].source_kind, TargetKind::Global);
        assert_eq!(entries[0].relative_path, "~/.claude/CLAUDE.md");
        assert_eq!(entries[2].source_kind, TargetKind::Root);
        assert_eq!(entries[2].line, 3);
    }

    #[test]
    fn test_suggest_target() {
        let router = Router::new().unwrap();
        let paths = Paths::with_claude_dir("/home/.claude");
        let files = routing_files();
        let root = Path::new("/project");
        let suggest = |text: &str, files: &[TargetFile], kind| {
            router
                .suggest_target(text, files, kind, &paths, Some(root))
                .map(|f| f.relative_path)
        };

        let guardrail = router.kind_of("don't add docstrings unless asked");
        assert_eq!(guardrail, Some(LearningKind::Guardrail));
        assert_eq!(
            suggest("don't add docstrings unless asked", &files, guardrail).as_deref(),
            Some("./.claude/rules/guardrails.md")
        );

        let without: Vec<TargetFile> = files
            .iter()
            .filter(|f| !f.relative_path.contains("guardrails"))
            .cloned()
            .collect();
        let proposed = router
            .suggest_target("don't add docstrings unless asked", &without, guardrail, &paths, Some(root))
            .unwrap();
        assert_eq!(proposed.relative_path, "./.claude/rules/guardrails.md");
        assert_eq!(proposed.path, PathBuf::from("/project/.claude/rules/guardrails.md"));

        assert_eq!(
            suggest("use gpt-5.1 for reasoning", &files, None).as_deref(),
            Some("~/.claude/CLAUDE.md")
        );
        assert_eq!(
            suggest("always use venv", &files, None).as_deref(),
            Some("~/.claude/CLAUDE.md")
        );
        assert_eq!(
            suggest("In the src/api/ module, use REST", &files, None).as_deref(),
            Some("./.claude/rules/api.md")
        );
        assert_eq!(suggest("use database pooling", &files, None), None);
    }

    #[test]
    fn test_memory_topics() {
        let router = Router::new().unwrap();
        assert_eq!(router.suggest_memory_topic("use gpt-5.1 for reasoning"), "model-preferences");
        assert_eq!(router.suggest_memory_topic("configure the MCP server plugin"), "tool-usage");
        assert_eq!(router.suggest_memory_topic("something very generic"), "general");
        assert_eq!(
            router.suggest_memory_topic("always use venv for Python projects"),
            "environment"
        );
        assert_eq!(router.suggest_memory_topic("run tests before deploying"), "workflow");
    }

    #[test]
    fn test_auto_memory_path() {
        assert_eq!(project_folder_name("/Users/bob/myapp"), "-Users-bob-myapp");
        assert_eq!(
            project_folder_name("/Users/bob/code/projects/myapp"),
            "-Users-bob-code-projects-myapp"
        );

        let paths = Paths::with_claude_dir("/home/user/.claude");
        assert_eq!(
            auto_memory_path(&paths, "/Users/bob/myapp"),
            PathBuf::from("/home/user/.claude/projects/-Users-bob-myapp/memory")
        );
    }

    #[tokio::test]
    async fn test_read_auto_memory() {
        assert!(read_auto_memory(Path::new("/nonexistent/path")).await.is_empty());

        let temp = TempDir::new().unwrap();
        let memory = temp.path().join("memory");
        fs::create_dir_all(&memory).unwrap();
        fs::write(memory.join("general.md"), "# General\n- Entry one\n- Entry two\n").unwrap();
        fs::write(memory.join("tools.md"), "# Tools\n- Use MCP\n").unwrap();

        let topics = read_auto_memory(&memory).await;
        let names: Vec<&str> = topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["general", "tools"]);
        assert_eq!(topics[0].entries, vec!["Entry one", "Entry two"]);
    }
}
