//! Short human-readable agent ids derived from task text
//!
//! "Please fix the flaky login test" becomes `fix-flaky-login`. Names are
//! unique for the lifetime of a [`NameGenerator`]; a repeated base name gets
//! a random three character suffix.

use rand::Rng;
use std::collections::HashSet;
use tracing::debug;

/// Longest base name before the uniqueness suffix
pub const MAX_NAME_LEN: usize = 20;

/// Used when nothing meaningful survives filtering
pub const FALLBACK_NAME: &str = "agent";

const WORDS_PER_NAME: usize = 3;
const SUFFIX_LEN: usize = 3;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Words that carry no meaning in a name
pub const STOP_WORDS: &[&str] = &[
    // articles and conjunctions
    "a", "an", "the", "and", "or", "but", "so", "then", "also",
    // auxiliary and modal verbs
    "is", "are", "was", "were", "be", "been", "being", "am", "do", "does", "did",
    "have", "has", "had", "will", "would", "could", "should", "can", "may", "might",
    "must", "shall",
    // prepositions
    "to", "for", "of", "in", "on", "at", "by", "with", "from", "into", "onto",
    "about", "as",
    // pronouns and determiners
    "it", "its", "this", "that", "these", "those", "me", "my", "we", "our", "us",
    "you", "your", "some",
    // casual filler
    "please", "hey", "hi", "hello", "just", "want", "wanna", "like", "get", "make",
    "go", "need", "let", "lets",
];

/// Derive the base name for a task, without uniqueness handling.
pub fn base_name(task: &str) -> String {
    let normalized: String = task
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let words: Vec<&str> = normalized
        .split_whitespace()
        .filter(|word| word.len() > 1 && !STOP_WORDS.contains(word))
        .take(WORDS_PER_NAME)
        .collect();

    if words.is_empty() {
        return FALLBACK_NAME.to_string();
    }

    truncate_name(&words.join("-"))
}

/// Cut to `MAX_NAME_LEN`, dropping a trailing word fragment of 1-2 chars.
fn truncate_name(name: &str) -> String {
    // Names are ASCII after normalisation, so byte slicing is safe
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }

    let cut = &name[..MAX_NAME_LEN];
    match cut.rfind('-') {
        Some(hyphen) if hyphen > 0 && cut.len() - hyphen - 1 <= 2 => cut[..hyphen].to_string(),
        _ => cut.to_string(),
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// Issues agent names, remembering every name handed out this session
#[derive(Debug, Default)]
pub struct NameGenerator {
    used: HashSet<String>,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a name for `task` that has not been issued before.
    pub fn generate(&mut self, task: &str) -> String {
        let base = base_name(task);
        let mut name = base.clone();
        while self.used.contains(&name) {
            name = format!("{}-{}", base, random_suffix());
        }
        self.used.insert(name.clone());

        debug!(component = "names", event = "name_generated", name = %name, base = %base, "Generated agent name");
        name
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Forget every issued name.
    pub fn reset_used_names(&mut self) {
        self.used.clear();
    }
}
