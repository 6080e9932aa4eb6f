//! The `"[Category] Title"` convention.
//!
//! The local store has no category field, so a remote note's category is
//! folded into the local title as a bracketed prefix. Folding must
//! round-trip: `decompose_title(&compose_title(c, t)) == (c, t)` for every
//! category that satisfies the rules below.
//!
//! A category is recognized only when the title starts with `[`, a `]`
//! follows, and the text between them is non-empty after trimming and
//! contains no `[`. One space after the `]` is consumed.

/// Folds a category into a title.
pub fn compose_title(category: Option<&str>, title: &str) -> String {
    match category.map(str::trim).filter(|c| is_valid_category(c)) {
        Some(category) if title.is_empty() => format!("[{category}]"),
        Some(category) => format!("[{category}] {title}"),
        None => title.to_string(),
    }
}

/// Splits a folded title into category and plain title.
pub fn decompose_title(folded: &str) -> (Option<String>, String) {
    let Some(rest) = folded.strip_prefix('[') else {
        return (None, folded.to_string());
    };
    let Some(close) = rest.find(']') else {
        return (None, folded.to_string());
    };

    let category = rest[..close].trim();
    if !is_valid_category(category) {
        return (None, folded.to_string());
    }

    let after = &rest[close + 1..];
    let title = after.strip_prefix(' ').unwrap_or(after);
    (Some(category.to_string()), title.to_string())
}

fn is_valid_category(category: &str) -> bool {
    !category.is_empty() && !category.contains('[') && !category.contains(']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn compose_with_category() {
        assert_eq!(compose_title(Some("Work"), "Plan"), "[Work] Plan");
    }

    #[test]
    fn compose_without_category() {
        assert_eq!(compose_title(None, "Plan"), "Plan");
        assert_eq!(compose_title(Some("   "), "Plan"), "Plan");
    }

    #[test]
    fn compose_empty_title() {
        assert_eq!(compose_title(Some("Work"), ""), "[Work]");
        assert_eq!(decompose_title("[Work]"), (Some("Work".into()), String::new()));
    }

    #[test]
    fn decompose_plain() {
        assert_eq!(decompose_title("Plan"), (None, "Plan".into()));
    }

    #[test]
    fn decompose_prefixed() {
        assert_eq!(
            decompose_title("[Work] Plan for Q3"),
            (Some("Work".into()), "Plan for Q3".into())
        );
    }

    #[test]
    fn decompose_consumes_single_space() {
        assert_eq!(decompose_title("[Work]  Plan"), (Some("Work".into()), " Plan".into()));
        assert_eq!(decompose_title("[Work]Plan"), (Some("Work".into()), "Plan".into()));
    }

    #[test]
    fn malformed_prefixes_are_title_text() {
        assert_eq!(decompose_title("[] Plan"), (None, "[] Plan".into()));
        assert_eq!(decompose_title("[  ] Plan"), (None, "[  ] Plan".into()));
        assert_eq!(decompose_title("[Work Plan"), (None, "[Work Plan".into()));
        assert_eq!(decompose_title("[[x] y"), (None, "[[x] y".into()));
        assert_eq!(decompose_title(" [Work] Plan"), (None, " [Work] Plan".into()));
    }

    #[test]
    fn only_first_bracket_pair_is_category() {
        assert_eq!(
            decompose_title("[Work] [Draft] Plan"),
            (Some("Work".into()), "[Draft] Plan".into())
        );
    }

    #[test]
    fn category_is_trimmed() {
        assert_eq!(decompose_title("[ Work ] Plan"), (Some("Work".into()), "Plan".into()));
    }

    proptest! {
        #[test]
        fn roundtrip(category in "[A-Za-z0-9][A-Za-z0-9 _-]{0,12}[A-Za-z0-9]", title in "[^\\[]{0,40}") {
            let folded = compose_title(Some(&category), &title);
            prop_assert_eq!(decompose_title(&folded), (Some(category), title));
        }

        #[test]
        fn plain_titles_survive(title in "[^\\[].{0,40}") {
            prop_assert_eq!(decompose_title(&title), (None, title.clone()));
        }
    }
}
