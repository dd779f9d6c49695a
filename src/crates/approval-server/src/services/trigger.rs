//! Escalation trigger detection for rejection comments
//!
//! A stage-1 rejection opens the enhanced due diligence stage only when its
//! comment carries an explicit routing directive. Matching is
//! case-insensitive and tolerant of extra whitespace:
//!
//! | Marker | Example |
//! |--------|---------|
//! | `route: edd` | `Reject. Route: EDD.` |
//! | `route to edd` | `please route to EDD` |
//! | `escalate to edd` | `Escalate to edd, sanctions hit` |
//! | `edd required` | `EDD required for this vendor` |
//! | `requires edd` | `Requires EDD` |
//! | `[demo:edd]` | demo-mode sentinel |
//!
//! Anything else, including an empty comment, does not trigger.

use regex::Regex;
use std::sync::LazyLock;

static ESCALATION_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\broute\s*:\s*edd\b|\broute\s+to\s+edd\b|\bescalate\s+to\s+edd\b|\bedd\s+required\b|\brequires\s+edd\b|\[\s*demo\s*:\s*edd\s*\]",
    )
    .expect("escalation marker pattern is valid")
});

/// Whether a rejection comment asks for enhanced due diligence
pub fn is_escalation_trigger(text: &str) -> bool {
    ESCALATION_MARKERS.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_routing_directives_trigger() {
        for text in [
            "Reject. Route: EDD.",
            "route:edd",
            "Please ROUTE TO EDD before onboarding",
            "Escalate to EDD - adverse media",
            "EDD required",
            "This vendor requires   edd.",
            "[demo:edd] reject",
            "[DEMO: EDD]",
        ] {
            assert!(is_escalation_trigger(text), "expected trigger: {text:?}");
        }
    }

    #[test]
    fn test_ordinary_comments_do_not_trigger() {
        for text in [
            "",
            "   ",
            "Missing documents.",
            "edd",
            "needs more edding",
            "route: eddie",
            "reroute to edda",
            "demo:edd without brackets",
        ] {
            assert!(!is_escalation_trigger(text), "unexpected trigger: {text:?}");
        }
    }

    proptest! {
        #[test]
        fn detector_is_total(text in "\\PC*") {
            let _ = is_escalation_trigger(&text);
        }

        #[test]
        fn directive_survives_surrounding_text(prefix in "[a-z .,]{0,20}", suffix in "[a-z .,]{0,20}") {
            let text = format!("{prefix} Route: EDD {suffix}");
            prop_assert!(is_escalation_trigger(&text));
        }
    }
}
