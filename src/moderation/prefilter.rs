#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Stage-1 deterministic keyword prefilter.
//!
//! A hit short-circuits the pipeline with a flagged verdict and a
//! category-specific user-facing reason; the contextual classifier is
//! never consulted for prefiltered content.

/// A keyword group with its rejection reason.
#[derive(Debug, Clone, Copy)]
pub struct KeywordGroup {
    pub id: &'static str,
    pub reason: &'static str,
    keywords: &'static [&'static str],
}

const GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        id: "pii",
        reason: "Posts must not ask for or share personal identifying information.",
        keywords: &[
            "social security",
            "ssn",
            "passport number",
            "driver's license number",
            "bank account number",
            "routing number",
            "credit card number",
        ],
    },
    KeywordGroup {
        id: "romantic",
        reason: "This board is for practical help requests, not romantic or explicit content.",
        keywords: &[
            "hookup",
            "hook up with me",
            "sugar daddy",
            "sugar baby",
            "nudes",
            "onlyfans",
            "friends with benefits",
        ],
    },
    KeywordGroup {
        id: "substances",
        reason: "Requests involving controlled substances are not allowed.",
        keywords: &[
            "adderall",
            "xanax",
            "oxycodone",
            "ritalin",
            "weed",
            "marijuana",
            "cocaine",
            "mdma",
            "shrooms",
            "fake prescription",
        ],
    },
    KeywordGroup {
        id: "academic_dishonesty",
        reason: "Requests to complete graded work for someone else are not allowed.",
        keywords: &[
            "write my essay",
            "write my paper",
            "take my exam",
            "take my test for",
            "do my homework for me",
            "do my assignment for me",
            "sit my exam",
            "buy an essay",
        ],
    },
    KeywordGroup {
        id: "financial",
        reason: "Money transfers and financial transactions are not allowed here.",
        keywords: &[
            "venmo me",
            "cashapp me",
            "zelle me",
            "wire transfer",
            "western union",
            "crypto investment",
            "guaranteed returns",
            "payday loan",
        ],
    },
    KeywordGroup {
        id: "illegal",
        reason: "Requests involving illegal activity are not allowed.",
        keywords: &[
            "fake id",
            "stolen",
            "counterfeit",
            "pick a lock for me",
            "hack into",
            "shoplift",
        ],
    },
];

/// Scan a title/description concatenation for a keyword hit.
/// Matching is case-insensitive substring over the whole text; the
/// first matching group wins.
#[must_use]
pub fn scan(text: &str) -> Option<&'static KeywordGroup> {
    let haystack = text.to_lowercase();
    GROUPS
        .iter()
        .find(|group| group.keywords.iter().any(|kw| haystack.contains(kw)))
}

#[cfg(test)]
mod tests {
    use super::scan;

    #[test]
    fn adderall_hits_the_substances_group() {
        let hit = scan("Need focus help, anyone have adderall to spare?");
        assert_eq!(hit.map(|g| g.id), Some("substances"));
        assert!(hit.is_some_and(|g| g.reason.contains("controlled substances")));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(scan("Selling my OnlyFans").map(|g| g.id), Some("romantic"));
        assert_eq!(scan("FAKE ID needed").map(|g| g.id), Some("illegal"));
    }

    #[test]
    fn ordinary_homework_help_passes() {
        assert!(scan("need help with my calculus homework").is_none());
        assert!(scan("Can someone help me move a couch on Saturday?").is_none());
    }

    #[test]
    fn graded_work_for_hire_is_flagged() {
        assert_eq!(
            scan("will pay someone to write my essay tonight").map(|g| g.id),
            Some("academic_dishonesty")
        );
    }

    #[test]
    fn first_group_wins_on_multi_category_text() {
        // Contains both a pii and a financial keyword; pii is declared first.
        let hit = scan("send your ssn and venmo me the fee");
        assert_eq!(hit.map(|g| g.id), Some("pii"));
    }
}
