#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Local keyword-count classifier over the fixed category taxonomy.
//!
//! This is the categorization fallback: it can never fail, so a
//! classifier outage degrades categorization quality without blocking
//! request creation.

use crate::types::Category;

/// Priority order for tie resolution: the first category with the
/// highest keyword count wins. Emergency outranks everything.
const PRIORITY: &[Category] = &[
    Category::Emergency,
    Category::Health,
    Category::Academic,
    Category::Technical,
    Category::Transportation,
    Category::Moving,
    Category::Food,
    Category::Social,
];

const fn keywords_for(category: Category) -> &'static [&'static str] {
    match category {
        Category::Emergency => &[
            "emergency", "urgent help", "911", "fire", "flood", "break-in", "locked out",
        ],
        Category::Health => &[
            "sick", "injury", "injured", "medicine", "pharmacy", "doctor", "clinic",
            "first aid", "allergy",
        ],
        Category::Academic => &[
            "homework", "study", "studying", "exam", "class", "calculus", "essay",
            "tutor", "tutoring", "lecture", "assignment", "course",
        ],
        Category::Technical => &[
            "laptop", "computer", "wifi", "printer", "software", "install", "debug",
            "phone screen", "password reset",
        ],
        Category::Transportation => &[
            "ride", "drive", "pick up", "pickup", "airport", "carpool", "bus",
            "jump start", "flat tire",
        ],
        Category::Moving => &[
            "move", "moving", "couch", "furniture", "carry", "lift", "boxes", "heavy",
        ],
        Category::Food => &[
            "food", "meal", "groceries", "grocery", "cook", "lunch", "dinner", "hungry",
        ],
        Category::Social => &[
            "hang out", "company", "lonely", "walk with", "event", "club", "game night",
        ],
        Category::Other => &[],
    }
}

/// Default effort estimate for a category, in minutes.
#[must_use]
pub const fn default_minutes(category: Category) -> u32 {
    match category {
        Category::Emergency => 10,
        Category::Food => 15,
        Category::Transportation => 20,
        Category::Social | Category::Health | Category::Other => 30,
        Category::Technical => 45,
        Category::Academic => 60,
        Category::Moving => 90,
    }
}

/// Default tags attached when the remote classifier supplied none.
#[must_use]
pub fn default_tags(category: Category) -> Vec<String> {
    vec![category.as_str().to_string()]
}

/// Classify text by counting keyword hits per category.
///
/// Ties resolve to the first higher-priority category encountered;
/// text with no hits resolves to `Other`.
#[must_use]
pub fn classify_keywords(text: &str) -> Category {
    let haystack = text.to_lowercase();
    let mut best = Category::Other;
    let mut best_count = 0_usize;
    for &category in PRIORITY {
        let count = keywords_for(category)
            .iter()
            .filter(|kw| haystack.contains(*kw))
            .count();
        if count > best_count {
            best = category;
            best_count = count;
        }
    }
    best
}
