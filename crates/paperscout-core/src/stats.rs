//! Mining cumulative statistics out of free-text progress messages.
//!
//! The progress channel is human-readable text, not structured data, so the
//! accumulator runs an ordered list of independent pattern extractors over
//! each message. A message may yield zero, one, or several facts; a fact,
//! once known, is only ever overwritten by a new match — absence of a match
//! never clears it. Unknown message text is accepted with no effect, which
//! keeps the miner forward-compatible with new server wording.

use once_cell::sync::Lazy;
use regex::Regex;

/// Cumulative display facts for one session.
///
/// Reset exactly once per session start; monotonically accumulating after
/// that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsAccumulator {
    reference_count: Option<String>,
    rss_count: Option<String>,
    candidate_count: Option<String>,
    batch_progress: Option<String>,
    fetch_progress: Option<String>,
    max_score: Option<String>,
    recommended_count: Option<String>,
}

/// Ordered extractor table. Later rules win within a single message, which
/// matters for the combined "candidates vs references" wording.
const RULES: &[fn(&mut StatsAccumulator, &str)] = &[
    extract_reference_count,
    extract_loaded_reference_count,
    extract_rss_count,
    extract_candidate_count,
    extract_batch_progress,
    extract_fetch_progress,
    extract_scoring_counts,
    extract_max_score,
    extract_recommended_count,
];

// 匹配格式：X 篇 Zotero 论文
fn extract_reference_count(acc: &mut StatsAccumulator, message: &str) {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*篇\s*Zotero\s*论文").unwrap());
    if let Some(caps) = RE.captures(message) {
        acc.reference_count = Some(caps[1].to_string());
    }
}

// 匹配格式：已加载 X 篇选中的 Zotero 论文（从 Y 篇中筛选）
fn extract_loaded_reference_count(acc: &mut StatsAccumulator, message: &str) {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"已加载\s*(\d+)\s*篇\s*(?:选中的\s*)?Zotero\s*论文").unwrap());
    if let Some(caps) = RE.captures(message) {
        acc.reference_count = Some(caps[1].to_string());
    }
}

// Feed counts only count when the message is actually about the RSS feed.
fn extract_rss_count(acc: &mut StatsAccumulator, message: &str) {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*篇\s*(?:新论文|论文)").unwrap());
    if message.contains("RSS Feed") {
        if let Some(caps) = RE.captures(message) {
            acc.rss_count = Some(caps[1].to_string());
        }
    }
}

fn extract_candidate_count(acc: &mut StatsAccumulator, message: &str) {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*篇\s*候选论文").unwrap());
    if let Some(caps) = RE.captures(message) {
        acc.candidate_count = Some(caps[1].to_string());
    }
}

fn extract_batch_progress(acc: &mut StatsAccumulator, message: &str) {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)/(\d+)\s*批").unwrap());
    if let Some(caps) = RE.captures(message) {
        acc.batch_progress = Some(format!("{}/{}", &caps[1], &caps[2]));
    }
}

fn extract_fetch_progress(acc: &mut StatsAccumulator, message: &str) {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)/(\d+)\s*篇\s*论文详情").unwrap());
    if let Some(caps) = RE.captures(message) {
        acc.fetch_progress = Some(format!("{}/{}", &caps[1], &caps[2]));
    }
}

// 匹配格式：X 篇候选论文 vs Y 篇 Zotero — one message, two facts.
fn extract_scoring_counts(acc: &mut StatsAccumulator, message: &str) {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\d+)\s*篇\s*候选论文\s*vs\s*(\d+)\s*篇\s*Zotero").unwrap());
    if let Some(caps) = RE.captures(message) {
        acc.candidate_count = Some(caps[1].to_string());
        acc.reference_count = Some(caps[2].to_string());
    }
}

fn extract_max_score(acc: &mut StatsAccumulator, message: &str) {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"最高分[:\s]+([\d.]+)").unwrap());
    if let Some(caps) = RE.captures(message) {
        acc.max_score = Some(caps[1].to_string());
    }
}

fn extract_recommended_count(acc: &mut StatsAccumulator, message: &str) {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"共推荐\s*(\d+)\s*篇").unwrap());
    if let Some(caps) = RE.captures(message) {
        acc.recommended_count = Some(caps[1].to_string());
    }
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all facts. Called exactly once per session start.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Run every extractor over `message` in table order.
    pub fn ingest(&mut self, message: &str) {
        for rule in RULES {
            rule(self, message);
        }
    }

    /// Bullet-joined display line in fixed priority order. Absent facts are
    /// omitted, never shown as zero or blank. Empty string when nothing is
    /// known yet.
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(n) = &self.reference_count {
            parts.push(format!("参考: {} 篇", n));
        }
        if let Some(n) = &self.rss_count {
            parts.push(format!("ArXiv RSS: {} 篇", n));
        }
        if let Some(n) = &self.candidate_count {
            parts.push(format!("候选: {} 篇", n));
        }
        if let Some(p) = &self.batch_progress {
            parts.push(format!("批次: {}", p));
        }
        if let Some(p) = &self.fetch_progress {
            parts.push(format!("已获取: {}", p));
        }
        if let Some(s) = &self.max_score {
            parts.push(format!("最高分: {}", s));
        }
        if let Some(n) = &self.recommended_count {
            parts.push(format!("推荐: {} 篇", n));
        }
        parts.join(" • ")
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_message_has_no_effect() {
        let mut acc = StatsAccumulator::new();
        acc.ingest("正在初始化...");
        assert!(acc.is_empty());
        assert_eq!(acc.render(), "");
    }

    #[test]
    fn scenario_reference_candidate_recommended() {
        let mut acc = StatsAccumulator::new();
        acc.ingest("已加载 12 篇 Zotero 论文");
        acc.ingest("35 篇候选论文");
        acc.ingest("共推荐 8 篇");
        assert_eq!(acc.render(), "参考: 12 篇 • 候选: 35 篇 • 推荐: 8 篇");
    }

    #[test]
    fn render_order_fixed_regardless_of_arrival_order() {
        let mut a = StatsAccumulator::new();
        a.ingest("共推荐 8 篇");
        a.ingest("35 篇候选论文");
        a.ingest("已加载 12 篇 Zotero 论文");

        let mut b = StatsAccumulator::new();
        b.ingest("已加载 12 篇 Zotero 论文");
        b.ingest("35 篇候选论文");
        b.ingest("共推荐 8 篇");

        assert_eq!(a.render(), b.render());
        assert_eq!(a.render(), "参考: 12 篇 • 候选: 35 篇 • 推荐: 8 篇");
    }

    #[test]
    fn one_message_can_carry_two_facts() {
        let mut acc = StatsAccumulator::new();
        acc.ingest("正在计算推荐分数（35 篇候选论文 vs 12 篇 Zotero 论文）...");
        assert_eq!(acc.render(), "参考: 12 篇 • 候选: 35 篇");
    }

    #[test]
    fn later_match_overwrites_earlier_value() {
        let mut acc = StatsAccumulator::new();
        acc.ingest("已加载 10 篇 Zotero 论文");
        acc.ingest("已加载 12 篇选中的 Zotero 论文（从 20 篇中筛选）");
        assert_eq!(acc.render(), "参考: 12 篇");
    }

    #[test]
    fn absence_never_clears_a_known_fact() {
        let mut acc = StatsAccumulator::new();
        acc.ingest("已加载 12 篇 Zotero 论文");
        acc.ingest("正在获取第 2/5 批论文详情...");
        acc.ingest("一条完全无关的消息");
        assert_eq!(acc.render(), "参考: 12 篇 • 批次: 2/5");
    }

    #[test]
    fn rss_count_requires_feed_context() {
        let mut acc = StatsAccumulator::new();
        // Mentions a paper count but not the feed — must not set the fact.
        acc.ingest("已获取 3 篇论文");
        assert!(acc.is_empty());

        acc.ingest("✓ 从 ArXiv RSS Feed 找到 40 篇新论文（共 120 篇），将处理全部");
        assert!(acc.render().contains("ArXiv RSS: 40 篇"));
    }

    #[test]
    fn fetch_and_batch_and_score_extract() {
        let mut acc = StatsAccumulator::new();
        acc.ingest("正在获取第 3/6 批论文详情...");
        acc.ingest("✓ 已获取 60/120 篇论文详情");
        acc.ingest("✓ 推荐分数计算完成（最高分: 0.87）");
        assert_eq!(acc.render(), "批次: 3/6 • 已获取: 60/120 • 最高分: 0.87");
    }

    #[test]
    fn reset_clears_everything() {
        let mut acc = StatsAccumulator::new();
        acc.ingest("已加载 12 篇 Zotero 论文");
        acc.reset();
        assert!(acc.is_empty());
    }

    #[test]
    fn duplicate_matches_within_one_message_are_idempotent() {
        let mut acc = StatsAccumulator::new();
        acc.ingest("已加载 12 篇 Zotero 论文，共 12 篇 Zotero 论文");
        assert_eq!(acc.render(), "参考: 12 篇");
    }
}
