// Vocabulary the classifier, deduplicator and router share
//
// Keyword heuristics only. A term is something concrete a learning can be
// "about": a model, a datastore, a tool, a path, a flag, a versioned name.

use crate::error::Result;
use regex::Regex;

const DATASTORES: &[&str] = &[
    "postgres", "postgresql", "sqlite", "mysql", "mariadb", "redis", "mongodb", "mongo",
    "kafka", "rabbitmq", "s3", "dynamodb", "elasticsearch", "supabase", "firebase",
    "bigquery", "snowflake", "cassandra", "memcached", "clickhouse",
];

const TOOLS: &[&str] = &[
    "git", "docker", "npm", "pnpm", "yarn", "cargo", "pip", "uv", "poetry", "make", "kubectl",
    "terraform", "mcp", "gh", "curl", "jest", "pytest", "eslint", "prettier", "ruff", "black",
    "webpack", "vite", "bun", "deno", "bash", "zsh", "brew", "plugin", "cli", "hook", "hooks",
    "grep", "rg", "sed", "clippy", "rustfmt", "mypy", "tsc", "vitest", "playwright",
];

const TECH: &[&str] = &[
    "python", "rust", "typescript", "javascript", "node", "react", "vue", "svelte", "django",
    "flask", "fastapi", "rails", "golang", "java", "kotlin", "swift", "graphql", "rest",
    "json", "yaml", "toml", "sql", "http", "tokio", "tailwind", "markdown", "nextjs", "express",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "to", "of", "in", "on", "for", "with", "at", "by",
    "from", "is", "are", "was", "be", "it", "this", "that", "these", "those", "them", "i",
    "you", "we", "me", "my", "your", "our", "do", "does", "dont", "don't", "not", "no",
    "please", "just", "so", "as", "use", "using", "used", "over", "than", "instead", "rather",
    "always", "never", "prefer", "should", "must", "can", "will", "when", "if", "then",
    "also", "all", "any", "some", "its", "it's", "into", "only", "actually", "meant",
];

const ACKNOWLEDGEMENT_WORDS: &[&str] = &[
    "ok", "okay", "k", "done", "looks", "look", "good", "lgtm", "thanks", "thank", "you",
    "thx", "ty", "great", "perfect", "nice", "cool", "yes", "yep", "yeah", "sure", "got",
    "it", "sounds", "fine", "awesome", "excellent", "continue", "go", "ahead", "proceed",
    "that", "works", "alright", "right", "agreed", "exactly",
];

/// What kind of thing a term names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermKind {
    Model,
    Datastore,
    Tool,
    Tech,
    Path,
    Flag,
    Identifier,
}

/// A concrete subject found in text, lower-cased
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    pub text: String,
    pub kind: TermKind,
}

pub struct Lexicon {
    model: Regex,
    path: Regex,
    flag: Regex,
    identifier: Regex,
    generalizing: Regex,
    project_reference: Regex,
    imperative: Regex,
    config_guidance: Regex,
    error_vocab: Regex,
    environment_vocab: Regex,
    tool_vocab: Regex,
    referent: Regex,
    filler: Regex,
    soft_filler: Regex,
}

impl Lexicon {
    pub fn new() -> Result<Self> {
        let re = |pattern: &str| Regex::new(pattern);

        Ok(Self {
            model: re(r"(?i)\b(?:gpt-?\d[\w.\-]*|o[134](?:-mini|-pro)?|claude-(?:\d|sonnet|opus|haiku|instant)[\w.\-]*|sonnet(?:-[\d.]+)?|opus(?:-[\d.]+)?|haiku(?:-[\d.]+)?|gemini(?:-[\w.\-]+)?|llama-?\d[\w.\-]*|mistral[\w.\-]*|deepseek[\w.\-]*|qwen[\w.\-]*)")?,
            path: re(r"(?:\.{0,2}/)?(?:[\w.\-]+/)+[\w.\-]*|\b[\w\-]+\.(?:rs|py|ts|tsx|js|jsx|go|rb|java|toml|yaml|yml|json|md|sql|sh|env|lock)\b")?,
            flag: re(r"(?:^|\s)(--?[a-zA-Z][\w\-]*)")?,
            identifier: re(r"\b[A-Za-z][A-Za-z0-9]*(?:[._][A-Za-z0-9]+|-[A-Za-z]*\d[A-Za-z0-9]*)+\b|\b[a-z]+[A-Z]\w*\b|\b[A-Z][a-z]+[A-Z]\w*\b")?,
            generalizing: re(r"(?i)\b(?:always|never|in general|all projects|every project|globally|everywhere|any project|across projects|from now on)\b")?,
            project_reference: re(r"(?i)\b(?:this (?:project|repo|repository|codebase|app|service)|our (?:api|service|db|database|backend|frontend|schema)|in here)\b")?,
            imperative: re(r"(?i)\b(?:always|never|don't|dont|do not|use|prefer|avoid|instead of|make sure|must|should|stop|only|keep)\b")?,
            config_guidance: re(r"(?i)\b(?:timeouts?|rate[\s\-]?limits?|retr(?:y|ies)|backoff|\d+\s*(?:ms|s|sec|secs|seconds|minutes|min)|config(?:uration)?|settings?|flags?|env\s+vars?|parameters?|params?|temperature|max[_\s\-]tokens|batch\s+size)\b")?,
            error_vocab: re(r"(?i)\b(?:errors?|fails?|failing|failed|crash(?:es|ed)?|exceptions?|bugs?|broken|traceback|panics?|segfaults?)\b")?,
            environment_vocab: re(r"(?i)\b(?:venv|virtualenv|conda|pyenv|nvm|env\s+vars?|environment(?:\s+variables?)?|(?-i:PATH)|dotenv|python\s*3(?:\.\d+)?|node\s*\d+|install(?:ed|ing)?|macos|linux|windows|wsl)\b")?,
            tool_vocab: re(r"(?i)\b(?:tools?|plugins?|mcp|cli|commands?|hooks?|servers?|extensions?)\b")?,
            referent: re(r"(?i)\b(?:that|this|it|those|these|them)\b")?,
            filler: re(r"(?i)^(?:no|nope|nah|ok|okay|well|wait|hmm|sorry)\s*[,.!;:]+\s*")?,
            soft_filler: re(r"(?i)^(?:actually|i meant|i said)\b[,:]?\s*")?,
        })
    }

    /// Every concrete subject in the text, first occurrence order, no repeats
    pub fn extract_terms(&self, text: &str) -> Vec<Term> {
        let mut terms: Vec<Term> = Vec::new();
        let mut push = |text: &str, kind: TermKind| {
            let text = text.trim_end_matches(['.', '-', ',']).to_lowercase();
            if text.len() < 2 || terms.iter().any(|t| t.text == text) {
                return;
            }
            terms.push(Term { text, kind });
        };

        for m in self.model.find_iter(text) {
            push(m.as_str(), TermKind::Model);
        }

        for word in words(text) {
            let lower = word.to_lowercase();
            if DATASTORES.contains(&lower.as_str()) {
                push(&lower, TermKind::Datastore);
            } else if TOOLS.contains(&lower.as_str()) {
                push(&lower, TermKind::Tool);
            } else if TECH.contains(&lower.as_str()) {
                push(&lower, TermKind::Tech);
            }
        }

        for m in self.path.find_iter(text) {
            push(m.as_str(), TermKind::Path);
        }
        for caps in self.flag.captures_iter(text) {
            if let Some(flag) = caps.get(1) {
                push(flag.as_str(), TermKind::Flag);
            }
        }
        for m in self.identifier.find_iter(text) {
            if m.as_str().len() >= 4 && !self.model.is_match(m.as_str()) {
                push(m.as_str(), TermKind::Identifier);
            }
        }

        terms
    }

    pub fn is_generalizing(&self, text: &str) -> bool {
        self.generalizing.is_match(text)
    }

    pub fn references_project(&self, text: &str) -> bool {
        self.project_reference.is_match(text)
    }

    pub fn is_imperative(&self, text: &str) -> bool {
        self.imperative.is_match(text)
    }

    pub fn has_config_guidance(&self, text: &str) -> bool {
        self.config_guidance.is_match(text)
    }

    pub fn has_error_vocab(&self, text: &str) -> bool {
        self.error_vocab.is_match(text)
    }

    pub fn has_environment_vocab(&self, text: &str) -> bool {
        self.environment_vocab.is_match(text)
    }

    pub fn has_tool_vocab(&self, text: &str) -> bool {
        self.tool_vocab.is_match(text)
    }

    pub fn has_referent(&self, text: &str) -> bool {
        self.referent.is_match(text)
    }

    pub fn mentions_model(&self, text: &str) -> bool {
        self.model.is_match(text)
    }

    /// Drop leading "no," / "actually" / "I meant" noise
    pub fn strip_fillers(&self, text: &str) -> String {
        let mut current = text.trim().to_string();
        loop {
            let next = self.filler.replace(&current, "");
            let next = self.soft_filler.replace(&next, "").trim().to_string();
            if next == current {
                return current;
            }
            current = next;
        }
    }
}

/// Lower-case, punctuation-free content words
pub fn keywords(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in words(text) {
        let lower = word.to_lowercase();
        let lower = lower.trim_matches(|c: char| c == '.' || c == '-');
        if lower.is_empty() || STOPWORDS.contains(&lower) {
            continue;
        }
        if !out.iter().any(|w| w == lower) {
            out.push(lower.to_string());
        }
    }
    out
}

/// Whitespace-collapsed, lower-cased, punctuation stripped except inside words
pub fn normalize(text: &str) -> String {
    words(text)
        .map(|w| w.trim_matches(|c: char| c == '.' || c == '-').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every word is a politeness or approval word
pub fn is_acknowledgement(text: &str) -> bool {
    let mut any = false;
    for word in words(text) {
        any = true;
        if !ACKNOWLEDGEMENT_WORDS.contains(&word.to_lowercase().as_str()) {
            return false;
        }
    }
    any
}

pub fn word_count(text: &str) -> usize {
    words(text).count()
}

// Words keep inner dots, dashes, slashes and apostrophes ("gpt-5.1", "don't")
fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | '\'' | '/')))
        .map(|w| w.trim_matches(|c: char| matches!(c, '.' | '\'' | '/')))
        .filter(|w| !w.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(terms: &[Term], kind: TermKind) -> Vec<String> {
        terms
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.text.clone())
            .collect()
    }

    #[test]
    fn test_extract_terms() {
        let lex = Lexicon::new().unwrap();

        let terms = lex.extract_terms("Prefer gpt-5.1 over gpt-5 for reasoning.");
        assert_eq!(kinds(&terms, TermKind::Model), vec!["gpt-5.1", "gpt-5"]);

        let terms = lex.extract_terms("no, use Postgres not SQLite");
        assert_eq!(kinds(&terms, TermKind::Datastore), vec!["postgres", "sqlite"]);

        let terms = lex.extract_terms("run cargo test with --nocapture in src/api/");
        assert!(kinds(&terms, TermKind::Tool).contains(&"cargo".to_string()));
        assert!(kinds(&terms, TermKind::Flag).contains(&"--nocapture".to_string()));
        assert!(kinds(&terms, TermKind::Path).contains(&"src/api/".to_string()));

        assert!(lex.extract_terms("please be more careful next time").is_empty());
    }

    #[test]
    fn test_strip_fillers() {
        let lex = Lexicon::new().unwrap();
        assert_eq!(lex.strip_fillers("no, use Postgres"), "use Postgres");
        assert_eq!(lex.strip_fillers("Actually, I meant the other file"), "the other file");
        assert_eq!(lex.strip_fillers("no tests in src"), "no tests in src");
    }

    #[test]
    fn test_acknowledgement() {
        assert!(is_acknowledgement("ok"));
        assert!(is_acknowledgement("Looks good!"));
        assert!(is_acknowledgement("ok thanks, done"));
        assert!(!is_acknowledgement("ok but use uv"));
        assert!(!is_acknowledgement(""));
    }

    #[test]
    fn test_keywords_and_normalize() {
        assert_eq!(
            keywords("Always use the venv for Python projects."),
            vec!["venv", "python", "projects"]
        );
        assert_eq!(normalize("  Use   gpt-5.1, please. "), "use gpt-5.1 please");
    }

    #[test]
    fn test_vocab() {
        let lex = Lexicon::new().unwrap();
        assert!(lex.has_config_guidance("set the timeout to 30 seconds"));
        assert!(lex.has_environment_vocab("always use venv for Python projects"));
        assert!(lex.has_error_vocab("the build fails on CI"));
        assert!(lex.has_tool_vocab("configure the MCP server plugin"));
        assert!(lex.is_generalizing("never commit secrets"));
        assert!(lex.references_project("in this repo we use tabs"));
    }
}
