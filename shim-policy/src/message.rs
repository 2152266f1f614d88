//! Remediation messages attached to capability violations.

/// Renders the four-line block message: what happened, why, fix, example.
#[must_use]
pub fn build_block_message(tool_name: &str, action: &str, why: &str, example: &str) -> String {
    [
        format!("What happened: Tool \"{tool_name}\" {action}."),
        format!("Why: {why}"),
        "Fix: Remove the restriction or choose a tool that does not need the capability.".to_owned(),
        format!("Example: {example}"),
    ]
    .join("\n")
}

/// Example `[capability_overrides]` snippet lifting a boolean guarantee.
pub(crate) fn override_example(tool_name: &str, guarantee: &str) -> String {
    format!("[capability_overrides]\n\"{tool_name}\" = {{ {guarantee} = false }}")
}

/// Example `[capability_overrides]` snippet allowing one secret.
pub(crate) fn secrets_example(tool_name: &str, secret: &str) -> String {
    format!("[capability_overrides]\n\"{tool_name}\" = {{ secrets_allowed = [\"{secret}\"] }}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_message_has_four_sections() {
        let message = build_block_message(
            "fetcher",
            "cannot access the network",
            "Effective guarantees forbid network access (GET https://example.com).",
            &override_example("fetcher", "no_network"),
        );
        let lines: Vec<_> = message.lines().collect();
        assert_eq!(lines[0], "What happened: Tool \"fetcher\" cannot access the network.");
        assert!(lines[1].starts_with("Why: "));
        assert!(lines[2].starts_with("Fix: "));
        assert_eq!(lines[3], "Example: [capability_overrides]");
        assert_eq!(lines[4], "\"fetcher\" = { no_network = false }");
    }

    #[test]
    fn secrets_example_names_secret() {
        assert!(secrets_example("t", "OPENAI_API_KEY").contains("secrets_allowed = [\"OPENAI_API_KEY\"]"));
    }
}
