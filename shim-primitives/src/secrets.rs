//! Secret alias table.

/// Environment spellings mapped to the canonical secret they expose.
pub const SECRET_ALIASES: &[(&str, &str)] = &[
    ("TOOLSHIM_OPENAI_API_KEY", "OPENAI_API_KEY"),
    ("OPENAI_API_KEY", "OPENAI_API_KEY"),
    ("TOOLSHIM_ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY"),
    ("ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY"),
    ("TOOLSHIM_GEMINI_API_KEY", "GEMINI_API_KEY"),
    ("GEMINI_API_KEY", "GEMINI_API_KEY"),
    ("TOOLSHIM_MISTRAL_API_KEY", "MISTRAL_API_KEY"),
    ("MISTRAL_API_KEY", "MISTRAL_API_KEY"),
    ("TOOLSHIM_DATABASE_URL", "DATABASE_URL"),
    ("DATABASE_URL", "DATABASE_URL"),
    ("TOOLSHIM_EDGE_KV_URL", "EDGE_KV_URL"),
    ("EDGE_KV_URL", "EDGE_KV_URL"),
];

/// Resolves an environment key to its canonical secret name, if it names one.
///
/// Keys are trimmed and upper-cased before lookup.
#[must_use]
pub fn canonical_secret_name(key: &str) -> Option<&'static str> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let key = key.to_ascii_uppercase();
    SECRET_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| *canonical)
}
