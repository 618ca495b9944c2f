//! Recommendation query settings and change detection.
//!
//! Settings are cheap to mutate; whether a mutation warrants a new query is
//! decided by comparing [`QuerySettings::fingerprint`] values, which are
//! invariant under reordering of category tokens and selected keys.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// One entry in the closed arXiv category vocabulary.
#[derive(Debug, Clone, Copy)]
pub struct CategoryOption {
    pub code: &'static str,
    pub label: &'static str,
}

/// ArXiv 类别选项（人工智能理工科相关）。
///
/// The server validates tokens; unknown ones pass through opaquely.
pub const ARXIV_CATEGORIES: &[CategoryOption] = &[
    CategoryOption { code: "cs.AI", label: "人工智能 (cs.AI)" },
    CategoryOption { code: "cs.CV", label: "计算机视觉 (cs.CV)" },
    CategoryOption { code: "cs.LG", label: "机器学习 (cs.LG)" },
    CategoryOption { code: "cs.CL", label: "自然语言处理 (cs.CL)" },
    CategoryOption { code: "cs.NE", label: "神经网络 (cs.NE)" },
    CategoryOption { code: "cs.RO", label: "机器人学 (cs.RO)" },
    CategoryOption { code: "cs.SY", label: "系统与控制 (cs.SY)" },
    CategoryOption { code: "cs.IT", label: "信息论 (cs.IT)" },
    CategoryOption { code: "cs.DS", label: "数据结构与算法 (cs.DS)" },
    CategoryOption { code: "cs.CR", label: "密码学与安全 (cs.CR)" },
    CategoryOption { code: "cs.CC", label: "计算复杂性 (cs.CC)" },
    CategoryOption { code: "cs.MA", label: "多智能体系统 (cs.MA)" },
    CategoryOption { code: "cs.SI", label: "社交和信息网络 (cs.SI)" },
    CategoryOption { code: "cs.MM", label: "多媒体 (cs.MM)" },
    CategoryOption { code: "cs.DC", label: "分布式计算 (cs.DC)" },
    CategoryOption { code: "stat.ML", label: "统计机器学习 (stat.ML)" },
    CategoryOption { code: "math.OC", label: "优化与控制 (math.OC)" },
    CategoryOption { code: "eess.IV", label: "图像与视频处理 (eess.IV)" },
    CategoryOption { code: "eess.SP", label: "信号处理 (eess.SP)" },
    CategoryOption { code: "cs.PL", label: "编程语言 (cs.PL)" },
];

/// Categories selected on a fresh settings object.
pub const DEFAULT_CATEGORIES: &[&str] = &["cs.AI", "cs.CV", "cs.LG", "cs.CL"];

static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// An inclusive publication date range, both ends `YYYY-MM-DD`.
///
/// Only the shape is validated client-side; the server owns calendar
/// validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    start: String,
    end: String,
}

impl DateRange {
    /// Build a range from two ISO date strings. Returns `None` unless both
    /// are present and shaped like `YYYY-MM-DD` (both-or-neither).
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        let start = start.trim();
        let end = end.trim();
        if start.is_empty() || end.is_empty() {
            return None;
        }
        if !ISO_DATE_RE.is_match(start) || !ISO_DATE_RE.is_match(end) {
            return None;
        }
        Some(Self {
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    /// Wire form sent as the `date_range` query parameter.
    pub fn wire(&self) -> String {
        format!("{},{}", self.start, self.end)
    }
}

/// The current recommendation query parameters.
///
/// `selected_keys: None` is the sentinel for "all available items" — distinct
/// from an explicit (possibly empty) set. The sentinel keeps the fingerprint
/// stable as the library grows and avoids shipping enormous key lists when
/// everything is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    categories: Vec<String>,
    date_range: Option<DateRange>,
    selected_keys: Option<BTreeSet<String>>,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            date_range: None,
            selected_keys: None,
        }
    }
}

impl QuerySettings {
    /// Settings with no categories selected; invalid to query with until
    /// categories are set.
    pub fn empty() -> Self {
        Self {
            categories: Vec::new(),
            date_range: None,
            selected_keys: None,
        }
    }

    /// Replace the category set. Duplicates and blank tokens are dropped,
    /// first-seen order is kept. An empty set yields an empty query, which
    /// the caller must surface as a validation error before starting a
    /// session.
    pub fn set_categories<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        self.categories = tokens
            .into_iter()
            .map(Into::into)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.clone()))
            .collect();
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Plus-joined category tokens; `""` means no categories selected.
    pub fn category_query(&self) -> String {
        self.categories.join("+")
    }

    /// Set or clear the date range. Partial or malformed input clears it.
    pub fn set_date_range(&mut self, start: &str, end: &str) {
        self.date_range = DateRange::parse(start, end);
    }

    pub fn date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref()
    }

    /// Record which library items are selected. When `keys` covers all of
    /// `total_available`, the "all" sentinel is stored instead of the
    /// explicit enumeration.
    pub fn set_selected_keys<I, S>(&mut self, keys: I, total_available: usize)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        if set.len() >= total_available {
            self.selected_keys = None;
        } else {
            self.selected_keys = Some(set);
        }
    }

    /// Revert to the "all items" sentinel.
    pub fn select_all_keys(&mut self) {
        self.selected_keys = None;
    }

    pub fn selected_keys(&self) -> Option<&BTreeSet<String>> {
        self.selected_keys.as_ref()
    }

    /// Comma-joined key list for the `selected_paper_keys` parameter, or
    /// `None` when the sentinel is in effect (or the set is explicitly
    /// empty — the original client omits the parameter in both cases).
    pub fn selected_keys_param(&self) -> Option<String> {
        match &self.selected_keys {
            Some(keys) if !keys.is_empty() => {
                Some(keys.iter().cloned().collect::<Vec<_>>().join(","))
            }
            _ => None,
        }
    }

    /// Order-independent identity of this configuration, used purely to
    /// decide whether re-querying is necessary.
    pub fn fingerprint(&self) -> String {
        let mut cats: Vec<&str> = self.categories.iter().map(String::as_str).collect();
        cats.sort_unstable();
        let range = self
            .date_range
            .as_ref()
            .map(|r| r.wire())
            .unwrap_or_else(|| "all".to_string());
        let keys = match &self.selected_keys {
            None => "all".to_string(),
            // BTreeSet iterates sorted, so insertion order never leaks in.
            Some(keys) => keys.iter().cloned().collect::<Vec<_>>().join(","),
        };
        format!("{}_{}_{}", cats.join("+"), range, keys)
    }

    pub fn has_changed_since(&self, previous_fingerprint: Option<&str>) -> bool {
        previous_fingerprint != Some(self.fingerprint().as_str())
    }

    /// Restore defaults: default categories, no date range, all items.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_categories_are_plus_joined() {
        let settings = QuerySettings::default();
        assert_eq!(settings.category_query(), "cs.AI+cs.CV+cs.LG+cs.CL");
    }

    #[test]
    fn empty_categories_yield_empty_query() {
        let mut settings = QuerySettings::default();
        settings.set_categories(Vec::<String>::new());
        assert_eq!(settings.category_query(), "");
    }

    #[test]
    fn set_categories_drops_blanks_and_duplicates() {
        let mut settings = QuerySettings::empty();
        settings.set_categories(["cs.AI", "", " cs.CV ", "cs.AI"]);
        assert_eq!(settings.category_query(), "cs.AI+cs.CV");
    }

    #[test]
    fn fingerprint_invariant_under_category_reorder() {
        let mut a = QuerySettings::empty();
        a.set_categories(["cs.CV", "cs.AI"]);
        let mut b = QuerySettings::empty();
        b.set_categories(["cs.AI", "cs.CV"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_invariant_under_key_reorder() {
        let mut a = QuerySettings::default();
        a.set_selected_keys(["KEY2", "KEY1"], 5);
        let mut b = QuerySettings::default();
        b.set_selected_keys(["KEY1", "KEY2"], 5);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn full_selection_collapses_to_sentinel() {
        let mut settings = QuerySettings::default();
        settings.set_selected_keys(["A", "B", "C"], 3);
        assert!(settings.selected_keys().is_none());
        assert!(settings.selected_keys_param().is_none());
    }

    #[test]
    fn partial_selection_keeps_explicit_set() {
        let mut settings = QuerySettings::default();
        settings.set_selected_keys(["B", "A"], 3);
        assert_eq!(settings.selected_keys_param().as_deref(), Some("A,B"));
    }

    #[test]
    fn explicit_empty_set_differs_from_sentinel_in_fingerprint() {
        let mut none_selected = QuerySettings::default();
        none_selected.set_selected_keys(Vec::<String>::new(), 3);
        let all = QuerySettings::default();
        assert!(none_selected.selected_keys().is_some());
        assert_ne!(none_selected.fingerprint(), all.fingerprint());
        // But neither sends the parameter.
        assert!(none_selected.selected_keys_param().is_none());
    }

    #[test]
    fn date_range_requires_both_ends() {
        let mut settings = QuerySettings::default();
        settings.set_date_range("2024-01-01", "");
        assert!(settings.date_range().is_none());
        settings.set_date_range("", "2024-12-31");
        assert!(settings.date_range().is_none());
        settings.set_date_range("2024-01-01", "2024-12-31");
        assert_eq!(
            settings.date_range().map(|r| r.wire()).as_deref(),
            Some("2024-01-01,2024-12-31")
        );
    }

    #[test]
    fn malformed_date_clears_range() {
        let mut settings = QuerySettings::default();
        settings.set_date_range("2024-01-01", "2024-12-31");
        settings.set_date_range("01/01/2024", "2024-12-31");
        assert!(settings.date_range().is_none());
    }

    #[test]
    fn has_changed_since_detects_equal_fingerprints() {
        let settings = QuerySettings::default();
        let fp = settings.fingerprint();
        assert!(!settings.has_changed_since(Some(&fp)));
        assert!(settings.has_changed_since(None));
        assert!(settings.has_changed_since(Some("something_else")));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut settings = QuerySettings::default();
        settings.set_categories(["cs.PL"]);
        settings.set_date_range("2024-01-01", "2024-12-31");
        settings.set_selected_keys(["A"], 3);
        settings.reset();
        assert_eq!(settings, QuerySettings::default());
    }
}
