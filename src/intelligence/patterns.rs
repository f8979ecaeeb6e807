// Correction phrase sets, one per language
//
// The detector never decides language itself. A scan picks a language once,
// looks up its PatternSet here, and keeps it for the whole pass.

use regex::Regex;
use std::collections::HashMap;

/// Family a correction phrase belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternFamily {
    Negation,
    Actually,
    IMeant,
    XNotY,
    Rejection,
}

impl PatternFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternFamily::Negation => "negation",
            PatternFamily::Actually => "actually",
            PatternFamily::IMeant => "i-meant",
            PatternFamily::XNotY => "x-not-y",
            PatternFamily::Rejection => "rejection",
        }
    }
}

/// Languages we carry phrase sets for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[default]
    English,
    Spanish,
    French,
    German,
    Portuguese,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Language::English => "en",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::German => "de",
            Language::Portuguese => "pt",
        };
        write!(f, "{}", s)
    }
}

type PhraseTable = &'static [(PatternFamily, &'static str, &'static str)];

use PatternFamily::*;

const ENGLISH_MARKER: &str = r"(?i)\bremember:";

const ENGLISH_PATTERNS: PhraseTable = &[
    (Negation, "no-use", r"(?i)^\s*no[,.!]?\s+(?:use|do|try|it's|it is|that's|we)\b"),
    (Negation, "dont-use", r"(?i)\b(?:don't|dont|do not)\s+(?:use|do|add|call|run|write|create|put|make|touch)\b"),
    (Negation, "stop-using", r"(?i)\bstop\s+(?:using|doing|adding|calling|running)\b"),
    (Negation, "never-use", r"(?i)\bnever\s+(?:use|do|add|call|run|commit|push)\b"),
    (Actually, "actually", r"(?i)\bactually\b"),
    (IMeant, "i-meant", r"(?i)\bi\s+meant\b"),
    (IMeant, "i-said", r"(?i)\bi\s+(?:said|told you)\b"),
    (IMeant, "what-i-wanted", r"(?i)\bwhat\s+i\s+(?:wanted|asked for)\b"),
    (XNotY, "use-x-not-y", r"(?i)\b(?:use|prefer|it's|it is|should be)\s+[\w.\-/]+(?:\s+[\w.\-/]+)?,?\s+not\s+[\w.\-/]+"),
    (XNotY, "instead-of", r"(?i)\binstead\s+of\b"),
    (XNotY, "rather-than", r"(?i)\brather\s+than\b"),
    (Rejection, "thats-wrong", r"(?i)\bthat(?:'s| is)\s+(?:wrong|incorrect|not right)\b"),
    (Rejection, "not-what-i-asked", r"(?i)\bnot\s+what\s+i\s+(?:asked|wanted|meant)\b"),
    (Rejection, "misunderstood", r"(?i)\byou\s+misunderstood\b"),
    (Rejection, "wrong-thing", r"(?i)\bwrong\s+(?:file|path|approach|command|one|directory)\b"),
];

const SPANISH_MARKER: &str = r"(?i)\brecuerda:";

const SPANISH_PATTERNS: PhraseTable = &[
    (Negation, "no-usa", r"(?i)^\s*no[,.!]?\s+(?:usa|utiliza|hagas)\b"),
    (Negation, "no-uses", r"(?i)\bno\s+(?:uses|utilices|hagas|agregues|añadas)\b"),
    (Actually, "en-realidad", r"(?i)\ben\s+realidad\b"),
    (IMeant, "quise-decir", r"(?i)\bquise\s+decir\b"),
    (XNotY, "en-lugar-de", r"(?i)\ben\s+(?:lugar|vez)\s+de\b"),
    (Rejection, "esta-mal", r"(?i)\beso\s+(?:está|esta)\s+mal\b"),
];

const FRENCH_MARKER: &str = r"(?i)\brappelle-toi\s*:";

const FRENCH_PATTERNS: PhraseTable = &[
    (Negation, "n-utilise-pas", r"(?i)\bn'(?:utilise|ajoute|fais)\s+pas\b"),
    (Negation, "ne-pas", r"(?i)\bne\s+\w+\s+pas\b"),
    (Actually, "en-fait", r"(?i)\ben\s+fait\b"),
    (IMeant, "je-voulais-dire", r"(?i)\bje\s+voulais\s+dire\b"),
    (XNotY, "au-lieu-de", r"(?i)\b(?:au\s+lieu\s+de|plutôt\s+que)\b"),
    (Rejection, "c-est-faux", r"(?i)\bc'est\s+(?:faux|incorrect)\b"),
];

const GERMAN_MARKER: &str = r"(?i)\bmerke\s*:";

const GERMAN_PATTERNS: PhraseTable = &[
    (Negation, "nicht-verwenden", r"(?i)\b(?:benutze|verwende|nutze)\s+(?:\w+\s+)?nicht\b"),
    (Negation, "kein", r"(?i)\b(?:nicht|kein)\s+\w+\s+(?:verwenden|benutzen|nutzen)\b"),
    (Actually, "eigentlich", r"(?i)\beigentlich\b"),
    (IMeant, "ich-meinte", r"(?i)\bich\s+meinte\b"),
    (XNotY, "statt", r"(?i)\b(?:statt|anstatt|anstelle\s+von)\b"),
    (Rejection, "das-ist-falsch", r"(?i)\bdas\s+ist\s+falsch\b"),
];

const PORTUGUESE_MARKER: &str = r"(?i)\blembre(?:-se)?\s*:";

const PORTUGUESE_PATTERNS: PhraseTable = &[
    (Negation, "nao-use", r"(?i)\bnão\s+(?:use|usa|faça|adicione)\b"),
    (Actually, "na-verdade", r"(?i)\bna\s+verdade\b"),
    (IMeant, "quis-dizer", r"(?i)\bquis\s+dizer\b"),
    (XNotY, "em-vez-de", r"(?i)\b(?:em\s+vez\s+de|ao\s+invés\s+de)\b"),
    (Rejection, "esta-errado", r"(?i)\bisso\s+(?:está|esta)\s+errado\b"),
];

// Words frequent enough in each language to vote for it
const STOPWORDS: &[(Language, &[&str])] = &[
    (
        Language::English,
        &["the", "and", "is", "to", "not", "you", "it", "this", "that", "with", "for", "use", "of"],
    ),
    (
        Language::Spanish,
        &["el", "la", "los", "las", "que", "y", "en", "usa", "por", "para", "con", "es", "esto", "del"],
    ),
    (
        Language::French,
        &["le", "la", "les", "et", "est", "pas", "une", "des", "pour", "avec", "ce", "je", "du", "il"],
    ),
    (
        Language::German,
        &["der", "die", "das", "und", "ist", "nicht", "ich", "mit", "für", "ein", "eine", "zu", "auch"],
    ),
    (
        Language::Portuguese,
        &["o", "os", "não", "um", "uma", "para", "com", "você", "isso", "do", "da", "e", "em"],
    ),
];

struct CorrectionPattern {
    family: PatternFamily,
    name: &'static str,
    regex: Regex,
}

/// Compiled marker and phrase patterns for one language
pub struct PatternSet {
    language: Language,
    markers: Vec<Regex>,
    patterns: Vec<CorrectionPattern>,
}

impl PatternSet {
    /// English only
    pub fn english() -> Self {
        Self::for_language(Language::English)
    }

    /// English plus the given language's phrases
    ///
    /// English stays in every set: people mix it into technical talk.
    pub fn for_language(language: Language) -> Self {
        let mut set = Self {
            language,
            markers: Vec::new(),
            patterns: Vec::new(),
        };
        set.extend(ENGLISH_MARKER, ENGLISH_PATTERNS);

        match language {
            Language::English => {}
            Language::Spanish => set.extend(SPANISH_MARKER, SPANISH_PATTERNS),
            Language::French => set.extend(FRENCH_MARKER, FRENCH_PATTERNS),
            Language::German => set.extend(GERMAN_MARKER, GERMAN_PATTERNS),
            Language::Portuguese => set.extend(PORTUGUESE_MARKER, PORTUGUESE_PATTERNS),
        }

        set
    }

    fn extend(&mut self, marker: &str, table: PhraseTable) {
        // Tables are static and covered by tests, so a bad entry just drops out
        if let Ok(regex) = Regex::new(marker) {
            self.markers.push(regex);
        }
        self.patterns.extend(table.iter().filter_map(|(family, name, pattern)| {
            Regex::new(pattern).ok().map(|regex| CorrectionPattern {
                family: *family,
                name,
                regex,
            })
        }));
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// True when the text carries an explicit "remember:" style marker
    pub fn has_explicit_marker(&self, text: &str) -> bool {
        self.markers.iter().any(|m| m.is_match(text))
    }

    /// Remove every explicit marker from the text
    pub fn strip_markers(&self, text: &str) -> String {
        self.markers
            .iter()
            .fold(text.to_string(), |acc, m| m.replace_all(&acc, "").into_owned())
            .trim()
            .to_string()
    }

    /// All matching phrases as (family, name), in table order
    pub fn matches(&self, text: &str) -> Vec<(PatternFamily, &'static str)> {
        self.patterns
            .iter()
            .filter(|p| p.regex.is_match(text))
            .map(|p| (p.family, p.name))
            .collect()
    }
}

/// Guess the dominant language of a handful of sample turns
///
/// Plain stopword voting. English wins ties.
pub fn detect_language<S: AsRef<str>>(samples: &[S]) -> Language {
    let mut votes: HashMap<Language, usize> = HashMap::new();

    for sample in samples {
        for word in sample.as_ref().split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            if word.is_empty() {
                continue;
            }
            for (language, words) in STOPWORDS {
                if words.contains(&word.as_str()) {
                    *votes.entry(*language).or_insert(0) += 1;
                }
            }
        }
    }

    let mut best = (Language::English, 0);
    for (language, _) in STOPWORDS {
        let count = votes.get(language).copied().unwrap_or(0);
        if count > best.1 {
            best = (*language, count);
        }
    }

    best.0
}
