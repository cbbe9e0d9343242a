//! Outbound message content moderation.
//!
//! Text is checked against four rule sets in a fixed order and the first
//! failing rule is reported:
//!
//! 1. profanity dictionary (word match after leetspeak folding)
//! 2. spam keywords (case-insensitive substring)
//! 3. explicit-content patterns (regex)
//! 4. links (scheme prefix, `www.`, or a known top-level domain)
//!
//! Filtering is pure and deterministic.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

const PROFANITY: &[&str] = &[
    "arse", "asshole", "bastard", "bitch", "bollocks", "cunt", "dick", "dickhead", "fag",
    "fuck", "fucker", "fucking", "motherfucker", "piss", "prick", "shit", "slut", "twat",
    "wanker", "whore",
];

const SPAM_KEYWORDS: &[&str] = &[
    "free robux",
    "robux generator",
    "free giveaway",
    "click here",
    "join my server",
    "discord.gg",
    "dupe method",
    "dm me for free",
    "subscribe to my channel",
    "follow me on",
    "cheap robux",
];

const EXPLICIT_PATTERNS: &[&str] = &[
    r"\bn[s5]fw\b",
    r"\bp[o0]rn\w*",
    r"\bnudes?\b",
    r"\bs[e3]x(?:y|ting)?\b",
    r"\bonly\s*fans\b",
    r"\bhorny\b",
    r"\bboobs?\b",
    r"\bd[i1]ck\s*pics?\b",
];

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\b(?:https?|ftp)://|\bwww\.|\b[a-z0-9-]+\.(?:com|net|org|io|gg|co|me|xyz|ly|app|dev|info|biz|tv|us|uk|ru|link|site|online|shop)\b)",
    )
    .expect("Invalid regex")
});

/// Why a message was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationReason {
    Profanity,
    Spam,
    Inappropriate,
    Link,
}

impl fmt::Display for ModerationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::Profanity => "Your message contains inappropriate language.",
            Self::Spam => "Your message looks like spam.",
            Self::Inappropriate => "Your message contains inappropriate content.",
            Self::Link => "Links are not allowed in chat.",
        };
        f.write_str(message)
    }
}

/// Result of running the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationVerdict {
    Clean,
    Rejected(ModerationReason),
}

impl ModerationVerdict {
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Clean)
    }

    pub const fn reason(self) -> Option<ModerationReason> {
        match self {
            Self::Clean => None,
            Self::Rejected(reason) => Some(reason),
        }
    }
}

/// Compiled moderation rules.
#[derive(Debug, Clone)]
pub struct ModerationFilter {
    profanity: HashSet<String>,
    spam_keywords: Vec<String>,
    explicit_patterns: Vec<Regex>,
}

impl Default for ModerationFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModerationFilter {
    /// Filter with the built-in rule lists.
    pub fn new() -> Self {
        Self::with_rules(PROFANITY, SPAM_KEYWORDS, EXPLICIT_PATTERNS)
            .expect("built-in moderation patterns are valid")
    }

    /// Filter with caller-provided rule lists.
    pub fn with_rules(
        profanity: &[&str],
        spam_keywords: &[&str],
        explicit_patterns: &[&str],
    ) -> Result<Self> {
        let explicit_patterns = explicit_patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!("(?i){pattern}")).map_err(|error| {
                    Error::InvalidInput(format!("invalid moderation pattern '{pattern}': {error}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            profanity: profanity.iter().map(|word| word.to_lowercase()).collect(),
            spam_keywords: spam_keywords.iter().map(|word| word.to_lowercase()).collect(),
            explicit_patterns,
        })
    }

    /// Run every rule, links included.
    pub fn validate(&self, text: &str) -> ModerationVerdict {
        self.validate_with(text, false)
    }

    /// Run the rules, optionally skipping the link rule for privileged senders.
    pub fn validate_with(&self, text: &str, allow_links: bool) -> ModerationVerdict {
        if self.is_profane(text) {
            return ModerationVerdict::Rejected(ModerationReason::Profanity);
        }
        if self.is_spam(text) {
            return ModerationVerdict::Rejected(ModerationReason::Spam);
        }
        if self.is_explicit(text) {
            return ModerationVerdict::Rejected(ModerationReason::Inappropriate);
        }
        if !allow_links && contains_link(text) {
            return ModerationVerdict::Rejected(ModerationReason::Link);
        }
        ModerationVerdict::Clean
    }

    pub fn is_profane(&self, text: &str) -> bool {
        text.split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '?' | ';' | ':' | '"' | '(' | ')'))
            .map(|word| word.trim_end_matches('!'))
            .filter(|word| !word.is_empty())
            .map(fold_leetspeak)
            .any(|word| self.profanity.contains(&word))
    }

    pub fn is_spam(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.spam_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }

    pub fn is_explicit(&self, text: &str) -> bool {
        self.explicit_patterns
            .iter()
            .any(|pattern| pattern.is_match(text))
    }
}

/// Whether `text` contains anything that looks like a URL.
pub fn contains_link(text: &str) -> bool {
    LINK_PATTERN.is_match(text)
}

fn fold_leetspeak(word: &str) -> String {
    word.chars()
        .filter_map(|c| match c.to_ascii_lowercase() {
            '0' => Some('o'),
            '1' | '!' => Some('i'),
            '3' => Some('e'),
            '4' | '@' => Some('a'),
            '5' | '$' => Some('s'),
            '7' => Some('t'),
            '*' | '-' | '_' | '\'' => None,
            other => Some(other),
        })
        .collect()
}
