//! SSE consumption for the recommendation stream.
//!
//! The service pushes `data: <json>` frames separated by blank lines. Frames
//! carrying a `success` field are terminal; everything else is a progress
//! payload with `message` and an optional `progress` percent. Chunk
//! boundaries fall anywhere, so lines are reassembled through a buffer
//! before parsing. Unparseable frames are skipped with a warning — the
//! wording of the progress channel changes server-side and must never kill
//! the stream.

use std::future::Future;
use std::pin::Pin;

use futures_util::StreamExt;
use serde::Deserialize;

use paperscout_core::session::{EventStream, RecommendationTransport};
use paperscout_core::settings::QuerySettings;
use paperscout_core::{RecommendedPaper, StreamEvent, TerminalPayload, TransportError};

/// Raw JSON shape of one SSE frame from `/api/recommendations/stream`.
#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    /// Present exactly once, on the terminal frame.
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    papers: Vec<RecommendedPaper>,
    #[serde(default)]
    cached: Option<bool>,
    #[serde(default)]
    reference_count: Option<usize>,
    #[serde(default)]
    error: Option<String>,
}

impl RawPayload {
    fn into_event(self) -> StreamEvent {
        match self.success {
            Some(ok) => StreamEvent::Terminal(TerminalPayload {
                ok,
                papers: self.papers,
                reference_count: self.reference_count,
                cached: self.cached.unwrap_or(false),
                message: self.message,
                error: self.error,
            }),
            None => StreamEvent::Progress {
                percent: self.progress,
                message: self.message.unwrap_or_default(),
            },
        }
    }
}

/// Reassembles complete lines out of arbitrarily-split byte chunks.
///
/// Accumulates raw bytes and splits on `\n` at the byte level: a chunk
/// boundary can fall inside a multi-byte UTF-8 character, so decoding must
/// wait until a line is complete.
#[derive(Debug, Default)]
struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    /// Feed one chunk; returns every line completed by it.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(end) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

/// Parse one SSE line into a stream event. `None` for blank separators,
/// non-`data:` lines, and frames whose JSON does not parse.
fn parse_event_line(line: &str) -> Option<StreamEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let json = trimmed.strip_prefix("data:")?.trim_start();
    match serde_json::from_str::<RawPayload>(json) {
        Ok(raw) => Some(raw.into_event()),
        Err(err) => {
            tracing::warn!(error = %err, "skipping unparseable SSE frame");
            None
        }
    }
}

/// Build the stream request URL. The query string is assembled by hand so
/// the plus-joined category tokens stay literal; `date_range` and
/// `selected_paper_keys` are omitted entirely when there is no range and the
/// "all" sentinel is in effect.
fn recommendations_url(base_url: &str, settings: &QuerySettings, force_refresh: bool) -> String {
    let mut url = format!(
        "{}/api/recommendations/stream?arxiv_query={}&force_refresh={}",
        base_url,
        settings.category_query(),
        force_refresh,
    );
    if let Some(range) = settings.date_range() {
        url.push_str("&date_range=");
        url.push_str(&urlencoding::encode(&range.wire()));
    }
    if let Some(keys) = settings.selected_keys_param() {
        url.push_str("&selected_paper_keys=");
        url.push_str(&urlencoding::encode(&keys));
    }
    url
}

/// [`RecommendationTransport`] over the service's SSE endpoint.
///
/// Shares the cookie jar of the [`LibraryClient`](crate::LibraryClient) that
/// created it. Dropping the returned stream aborts the request, which is how
/// session cancellation releases the connection.
#[derive(Debug, Clone)]
pub struct SseTransport {
    http: reqwest::Client,
    base_url: String,
}

impl SseTransport {
    pub(crate) fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

impl RecommendationTransport for SseTransport {
    fn open<'a>(
        &'a self,
        settings: &'a QuerySettings,
        force_refresh: bool,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let url = recommendations_url(&self.base_url, settings, force_refresh);
            tracing::debug!(%url, "opening recommendation stream");

            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(TransportError::Connect(format!("HTTP {}", resp.status())));
            }

            let mut buffer = SseLineBuffer::default();
            let events = resp
                .bytes_stream()
                .map(move |chunk| -> Vec<Result<StreamEvent, TransportError>> {
                    match chunk {
                        Ok(bytes) => buffer
                            .push(&bytes)
                            .iter()
                            .filter_map(|line| parse_event_line(line))
                            .map(Ok)
                            .collect(),
                        Err(err) => vec![Err(TransportError::Connect(err.to_string()))],
                    }
                })
                .map(futures_util::stream::iter)
                .flatten();

            Ok(Box::pin(events) as EventStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_contains_literal_plus_joined_categories() {
        let mut settings = QuerySettings::empty();
        settings.set_categories(["cs.AI", "cs.CV"]);
        let url = recommendations_url("http://localhost:5000", &settings, false);
        assert!(url.contains("arxiv_query=cs.AI+cs.CV"));
        assert!(url.contains("force_refresh=false"));
        assert!(!url.contains("date_range"));
        assert!(!url.contains("selected_paper_keys"));
    }

    #[test]
    fn url_carries_range_and_keys_when_set() {
        let mut settings = QuerySettings::empty();
        settings.set_categories(["cs.AI"]);
        settings.set_date_range("2024-01-01", "2024-12-31");
        settings.set_selected_keys(["KEY1", "KEY2"], 5);
        let url = recommendations_url("http://localhost:5000", &settings, true);
        assert!(url.contains("force_refresh=true"));
        assert!(url.contains("date_range=2024-01-01%2C2024-12-31"));
        assert!(url.contains("selected_paper_keys=KEY1%2CKEY2"));
    }

    #[test]
    fn url_omits_keys_for_full_selection() {
        let mut settings = QuerySettings::empty();
        settings.set_categories(["cs.AI"]);
        settings.set_selected_keys(["K1", "K2"], 2);
        let url = recommendations_url("http://localhost:5000", &settings, false);
        assert!(!url.contains("selected_paper_keys"));
    }

    #[test]
    fn progress_frame_parses() {
        let event =
            parse_event_line(r#"data: {"message": "已加载 12 篇 Zotero 论文", "progress": 20}"#)
                .unwrap();
        match event {
            StreamEvent::Progress { percent, message } => {
                assert_eq!(percent, Some(20.0));
                assert_eq!(message, "已加载 12 篇 Zotero 论文");
            }
            other => panic!("expected progress, got {:?}", other),
        }
    }

    #[test]
    fn terminal_frame_parses_with_metadata() {
        let event = parse_event_line(
            r#"data: {"success": true, "papers": [{"title": "T", "arxiv_id": "2401.00001", "score": 0.9}], "total": 1, "cached": true, "reference_count": 12}"#,
        )
        .unwrap();
        match event {
            StreamEvent::Terminal(payload) => {
                assert!(payload.ok);
                assert_eq!(payload.papers.len(), 1);
                assert!(payload.cached);
                assert_eq!(payload.reference_count, Some(12));
            }
            other => panic!("expected terminal, got {:?}", other),
        }
    }

    #[test]
    fn terminal_failure_frame_parses() {
        let event =
            parse_event_line(r#"data: {"success": false, "error": "Zotero 库为空"}"#).unwrap();
        match event {
            StreamEvent::Terminal(payload) => {
                assert!(!payload.ok);
                assert_eq!(payload.error.as_deref(), Some("Zotero 库为空"));
            }
            other => panic!("expected terminal, got {:?}", other),
        }
    }

    #[test]
    fn blank_and_foreign_lines_are_skipped() {
        assert!(parse_event_line("").is_none());
        assert!(parse_event_line("   ").is_none());
        assert!(parse_event_line(": keep-alive comment").is_none());
        assert!(parse_event_line("event: message").is_none());
    }

    #[test]
    fn malformed_json_is_skipped_not_fatal() {
        assert!(parse_event_line("data: {not json").is_none());
    }

    #[test]
    fn line_buffer_handles_chunk_boundaries() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: {\"message\": \"one").is_empty());
        let lines = buffer.push("\"}\n\ndata: {\"message\": \"二\"}\n".as_bytes());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], r#"data: {"message": "one"}"#);
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], r#"data: {"message": "二"}"#);
    }

    #[test]
    fn line_buffer_reassembles_characters_split_across_chunks() {
        let frame = "data: {\"message\": \"已加载 12 篇 Zotero 论文\"}\n";
        // Split inside the byte sequence of "已".
        let cut = 20;
        assert!(!frame.is_char_boundary(cut));
        let frame = frame.as_bytes();

        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(&frame[..cut]).is_empty());
        let lines = buffer.push(&frame[cut..]);
        assert_eq!(lines.len(), 1);

        let event = parse_event_line(&lines[0]).unwrap();
        match event {
            StreamEvent::Progress { message, .. } => {
                assert_eq!(message, "已加载 12 篇 Zotero 论文");
            }
            other => panic!("expected progress, got {:?}", other),
        }
    }

    #[test]
    fn line_buffer_survives_every_split_point() {
        let frame = "data: {\"message\": \"✓ 推荐分数计算完成（最高分: 0.87）\"}\n".as_bytes();
        for cut in 1..frame.len() {
            let mut buffer = SseLineBuffer::default();
            let mut lines = buffer.push(&frame[..cut]);
            lines.extend(buffer.push(&frame[cut..]));
            assert_eq!(lines.len(), 1, "split at byte {}", cut);
            match parse_event_line(&lines[0]).unwrap() {
                StreamEvent::Progress { message, .. } => {
                    assert_eq!(message, "✓ 推荐分数计算完成（最高分: 0.87）");
                }
                other => panic!("expected progress, got {:?}", other),
            }
        }
    }

    #[test]
    fn line_buffer_strips_carriage_returns() {
        let mut buffer = SseLineBuffer::default();
        let lines = buffer.push(b"data: {}\r\n");
        assert_eq!(lines, vec!["data: {}".to_string()]);
    }

    #[test]
    fn full_frame_sequence_parses_in_order() {
        let mut buffer = SseLineBuffer::default();
        let wire = "data: {\"message\": \"正在初始化...\", \"progress\": 5}\n\n\
                    data: {\"success\": true, \"papers\": [], \"total\": 0}\n\n";
        let events: Vec<StreamEvent> = buffer
            .push(wire.as_bytes())
            .iter()
            .filter_map(|l| parse_event_line(l))
            .collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Progress { .. }));
        assert!(matches!(events[1], StreamEvent::Terminal(_)));
    }
}
