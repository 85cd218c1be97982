//! Strips markup and script fragments from raw command text.

use regex::Regex;
use std::sync::OnceLock;

fn script_scheme() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)javascript\s*:").expect("valid scheme regex"))
}

fn event_handler() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bon[a-z]+\s*=").expect("valid handler regex"))
}

/// Removes angle brackets, the `javascript:` scheme and inline `on<event>=`
/// handlers, then trims surrounding whitespace.
pub fn sanitize_command(raw: &str) -> String {
    let without_brackets: String = raw.chars().filter(|c| *c != '<' && *c != '>').collect();
    let without_scheme = script_scheme().replace_all(&without_brackets, "");
    let without_handlers = event_handler().replace_all(&without_scheme, "");
    without_handlers.trim().to_string()
}

/// True when sanitizing changed anything beyond surrounding whitespace.
pub fn was_altered(raw: &str, sanitized: &str) -> bool {
    raw.trim() != sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_commands_pass_through() {
        assert_eq!(sanitize_command("  cat research_notes.md "), "cat research_notes.md");
        assert!(!was_altered("  ls ", "ls"));
    }

    #[test]
    fn markup_and_scripts_are_removed() {
        assert_eq!(sanitize_command("cat <script>x</script>"), "cat scriptx/script");
        assert_eq!(sanitize_command("cd JavaScript:alert(1)"), "cd alert(1)");
        assert_eq!(sanitize_command("ls img onerror=steal()"), "ls img steal()");
    }

    #[test]
    fn alteration_is_detected() {
        let raw = "ls <b>";
        assert!(was_altered(raw, &sanitize_command(raw)));
    }
}
