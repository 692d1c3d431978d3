//! Column resolution for keyword tables
//!
//! Input files come from many tools, so the keyword and category columns are
//! found by loose name matching rather than exact headers. Resolution never
//! fails: a missing keyword column falls back to the first column, a missing
//! category column to a constant category.

/// Header fragments that mark a keyword column.
pub const KEYWORD_SYNONYMS: &[&str] = &["keyword", "term", "phrase", "word"];

/// Header fragments that mark a category column.
pub const CATEGORY_SYNONYMS: &[&str] = &["category", "type", "class", "group"];

/// Category assigned when the table has no category column or the cell is blank.
pub const DEFAULT_CATEGORY: &str = "general";

/// Keyword values that count as missing data.
const MISSING_MARKERS: &[&str] = &["", "nan", "none"];

/// Which columns of a table hold keywords and categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    /// Index of the keyword column
    pub keyword: usize,
    /// Index of the category column, if one was found
    pub category: Option<usize>,
}

impl ColumnMap {
    /// Resolve keyword and category columns from header names.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Self {
        let keyword = find_column(headers, KEYWORD_SYNONYMS, None).unwrap_or(0);
        let category = find_column(headers, CATEGORY_SYNONYMS, Some(keyword));
        Self { keyword, category }
    }

    /// Extract a `(keyword, category)` pair from a row.
    ///
    /// Returns `None` when the keyword cell is missing or blank.
    pub fn extract(&self, row: &[String]) -> Option<(String, String)> {
        let keyword = row.get(self.keyword).map(|s| s.trim()).unwrap_or_default();
        if is_missing(keyword) {
            return None;
        }

        let category = self
            .category
            .and_then(|idx| row.get(idx))
            .map(|s| s.trim())
            .filter(|s| !is_missing(s))
            .unwrap_or(DEFAULT_CATEGORY);

        Some((keyword.to_string(), category.to_string()))
    }
}

fn find_column<S: AsRef<str>>(headers: &[S], synonyms: &[&str], skip: Option<usize>) -> Option<usize> {
    headers.iter().enumerate().find_map(|(idx, name)| {
        if Some(idx) == skip {
            return None;
        }
        let lower = name.as_ref().to_lowercase();
        synonyms
            .iter()
            .any(|syn| lower.contains(syn))
            .then_some(idx)
    })
}

/// True for blank cells and textual renderings of missing values.
pub fn is_missing(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    MISSING_MARKERS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn resolves_named_columns() {
        let map = ColumnMap::resolve(&["id", "Category", "Search Term"]);
        assert_eq!(map.keyword, 2);
        assert_eq!(map.category, Some(1));
    }

    #[test]
    fn keyword_falls_back_to_first_column() {
        let map = ColumnMap::resolve(&["text", "group"]);
        assert_eq!(map.keyword, 0);
        assert_eq!(map.category, Some(1));
    }

    #[test]
    fn first_matching_column_wins() {
        let map = ColumnMap::resolve(&["Keyword", "Phrase", "Type", "Class"]);
        assert_eq!(map.keyword, 0);
        assert_eq!(map.category, Some(2));
    }

    #[test]
    fn keyword_column_is_not_reused_as_category() {
        // "keyword type" matches both synonym sets; it belongs to keywords.
        let map = ColumnMap::resolve(&["keyword type", "volume"]);
        assert_eq!(map.keyword, 0);
        assert_eq!(map.category, None);
    }

    #[test]
    fn missing_category_column_yields_general() {
        let map = ColumnMap::resolve(&["keyword", "volume"]);
        assert_eq!(
            map.extract(&row(&["ginseng", "1200"])),
            Some(("ginseng".to_string(), "general".to_string()))
        );
    }

    #[test]
    fn blank_category_cell_yields_general() {
        let map = ColumnMap::resolve(&["keyword", "category"]);
        assert_eq!(
            map.extract(&row(&["ginseng", "  "])),
            Some(("ginseng".to_string(), "general".to_string()))
        );
    }

    #[test]
    fn missing_keywords_are_dropped() {
        let map = ColumnMap::resolve(&["keyword", "category"]);
        for value in ["", "   ", "nan", "NaN", "None", "NONE"] {
            assert_eq!(map.extract(&row(&[value, "experts"])), None, "{value:?}");
        }
    }

    #[test]
    fn keyword_is_trimmed() {
        let map = ColumnMap::resolve(&["keyword", "category"]);
        assert_eq!(
            map.extract(&row(&["  chamomile tea ", " beginners"])),
            Some(("chamomile tea".to_string(), "beginners".to_string()))
        );
    }

    #[test]
    fn short_rows_are_tolerated() {
        let map = ColumnMap::resolve(&["category", "keyword"]);
        assert_eq!(map.extract(&row(&["experts"])), None);
    }
}
