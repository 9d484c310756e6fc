//! Extraction of unlock parameters from free-form post text.
//!
//! A mention looks like `@bot lock:0.5 id:<resource> proof:<token>`. Tags are
//! matched case-insensitively and only at the start of a word. Each field is
//! independent, the first occurrence wins, and anything that does not match
//! is left out rather than guessed.

use std::sync::LazyLock;

use regex::Regex;

/// Fields found in a mention. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionParams {
    pub resource_id: Option<String>,
    pub proof: Option<String>,
    /// Decimal dollar amount as written, e.g. `"0.5"`.
    pub price: Option<String>,
}

impl MentionParams {
    /// A mention can only trigger verification when it names both a
    /// resource and a proof.
    pub fn is_actionable(&self) -> bool {
        self.resource_id.is_some() && self.proof.is_some()
    }
}

// A tag counts only at the start of a word; the leading group eats the
// boundary character.
static ID_RE: LazyLock<Regex> = LazyLock::new(|| tag_regex("id", "[A-Za-z0-9-]+"));
static PROOF_RE: LazyLock<Regex> = LazyLock::new(|| tag_regex("proof", "[A-Za-z0-9-]+"));
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| tag_regex("(?:lock|price)", r"[0-9]+(?:\.[0-9]*)?"));

fn tag_regex(tag: &str, value: &str) -> Regex {
    Regex::new(&format!("(?i)(?:^|[^A-Za-z0-9_]){tag}:({value})"))
        .unwrap_or_else(|e| panic!("invalid mention pattern for {tag}: {e}"))
}

pub fn parse_mention(text: &str) -> MentionParams {
    MentionParams {
        resource_id: first_value(&ID_RE, text),
        proof: first_value(&PROOF_RE, text),
        price: first_value(&PRICE_RE, text),
    }
}

fn first_value(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
