use crate::vocab::{Category, TimeRange};
use serde::Serialize;

/// A validated search request.
///
/// Constructors assume their inputs already hold the invariants (non-empty text, page in
/// `1..=MAX_PAGE`, closed-vocabulary members); the tool layer is responsible for checking
/// caller input before building one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    pub text: String,
    pub language: Option<String>,
    pub time_range: Option<TimeRange>,
    /// Ordered, duplicate-free. Empty means "no category filter".
    pub categories: Vec<Category>,
    pub page: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvancedOptions {
    pub language: Option<String>,
    pub time_range: Option<TimeRange>,
    pub page: Option<u32>,
}

impl Query {
    pub const DEFAULT_PAGE: u32 = 1;
    pub const MAX_PAGE: u32 = 50;

    pub fn simple(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            time_range: None,
            categories: vec![Category::General],
            page: Self::DEFAULT_PAGE,
        }
    }

    pub fn with_categories(
        text: impl Into<String>,
        categories: impl IntoIterator<Item = Category>,
    ) -> Self {
        let mut uniq: Vec<Category> = Vec::new();
        for c in categories {
            if !uniq.contains(&c) {
                uniq.push(c);
            }
        }
        Self {
            text: text.into(),
            language: None,
            time_range: None,
            categories: uniq,
            page: Self::DEFAULT_PAGE,
        }
    }

    /// Advanced queries stay on the default `general` category.
    pub fn advanced(text: impl Into<String>, opts: AdvancedOptions) -> Self {
        Self {
            text: text.into(),
            language: opts.language,
            time_range: opts.time_range,
            categories: vec![Category::General],
            page: opts.page.unwrap_or(Self::DEFAULT_PAGE),
        }
    }

    pub fn page_in_range(page: i64) -> bool {
        (i64::from(Self::DEFAULT_PAGE)..=i64::from(Self::MAX_PAGE)).contains(&page)
    }

    /// Comma-joined literal tokens, as SearXNG expects in its `categories` field.
    pub fn categories_param(&self) -> Option<String> {
        if self.categories.is_empty() {
            return None;
        }
        Some(
            self.categories
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_defaults_to_general_first_page() {
        let q = Query::simple("golang");
        assert_eq!(q.text, "golang");
        assert_eq!(q.categories, vec![Category::General]);
        assert_eq!(q.page, 1);
        assert!(q.language.is_none());
        assert!(q.time_range.is_none());
    }

    #[test]
    fn with_categories_dedups_and_keeps_first_order() {
        let q = Query::with_categories(
            "ml",
            [Category::Science, Category::It, Category::Science],
        );
        assert_eq!(q.categories, vec![Category::Science, Category::It]);
        assert_eq!(q.categories_param().as_deref(), Some("science,it"));
        assert_eq!(q.page, 1);
    }

    #[test]
    fn advanced_keeps_general_and_applies_options() {
        let q = Query::advanced(
            "rust",
            AdvancedOptions {
                language: Some("en".to_string()),
                time_range: Some(TimeRange::Month),
                page: Some(3),
            },
        );
        assert_eq!(q.categories, vec![Category::General]);
        assert_eq!(q.language.as_deref(), Some("en"));
        assert_eq!(q.time_range, Some(TimeRange::Month));
        assert_eq!(q.page, 3);

        let q = Query::advanced("rust", AdvancedOptions::default());
        assert_eq!(q.page, Query::DEFAULT_PAGE);
    }

    #[test]
    fn empty_categories_have_no_param() {
        let q = Query::with_categories("x", []);
        assert_eq!(q.categories_param(), None);
    }

    #[test]
    fn categories_param_keeps_multi_word_token() {
        let q = Query::with_categories("x", [Category::SocialMedia, Category::News]);
        assert_eq!(q.categories_param().as_deref(), Some("social media,news"));
    }

    #[test]
    fn page_range_bounds() {
        assert!(!Query::page_in_range(0));
        assert!(Query::page_in_range(1));
        assert!(Query::page_in_range(50));
        assert!(!Query::page_in_range(51));
        assert!(!Query::page_in_range(-3));
    }
}
