use serde_json::Value;
use tracing::{debug, warn};

/// The sentinel returned when the runtime stream produced no usable
/// text at all.
pub const EMPTY_RESPONSE_SENTINEL: &str = "I could not produce a response for that.";

const MAX_EXTRACTION_RETRIES: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 20;

/// One heterogeneous chunk as emitted by the underlying tool-using LLM
/// runtime. Its shape varies by provider and even within a single
/// stream, so it's kept as opaque JSON until [`StreamExtractor`] probes it.
#[derive(Debug, Clone)]
pub struct RawChunk(pub Value);

/// Probe a chunk for a `(text, partial)` pair by trying, in priority
/// order: content-with-parts, a direct text attribute, a dict with
/// known keys, and a list of sub-chunks to recurse into. Returns `None`
/// when the shape is unrecognized — never invents text.
fn probe(value: &Value) -> Option<(String, bool)> {
    let partial = value.get("partial").and_then(Value::as_bool).unwrap_or(false);

    if let Some(parts) = value.get("content").and_then(Value::as_array) {
        let mut combined = String::new();
        for part in parts {
            if let Some(t) = part.get("text").and_then(Value::as_str) {
                combined.push_str(t);
            } else if let Some(t) = part.as_str() {
                combined.push_str(t);
            }
        }
        if !combined.is_empty() {
            return Some((combined, partial));
        }
    }

    if let Some(t) = value.get("text").and_then(Value::as_str) {
        return Some((t.to_string(), partial));
    }

    for key in ["delta", "chunk", "data"] {
        if let Some(nested) = value.get(key) {
            if let Some((t, p)) = probe(nested) {
                return Some((t, p || partial));
            }
        }
    }

    if let Some(items) = value.as_array() {
        let mut combined = String::new();
        let mut any_partial = false;
        let mut matched = false;
        for item in items {
            if let Some((t, p)) = probe(item) {
                combined.push_str(&t);
                any_partial = any_partial || p;
                matched = true;
            }
        }
        if matched {
            return Some((combined, any_partial || partial));
        }
    }

    if let Some(s) = value.as_str() {
        return Some((s.to_string(), partial));
    }

    None
}

/// Extracts text from a chunk, retrying a small number of times with a
/// short backoff when the shape can't be recognized on the first pass —
/// real runtimes occasionally deliver a chunk tree that only resolves
/// once a buffered sub-chunk arrives; this never invents text, it only
/// gives the tree a few more chances to be read the same way.
pub async fn extract_with_retry(value: &Value) -> Option<(String, bool)> {
    for attempt in 0..MAX_EXTRACTION_RETRIES {
        if let Some(result) = probe(value) {
            return Some(result);
        }
        if attempt + 1 < MAX_EXTRACTION_RETRIES {
            tokio::time::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS)).await;
        }
    }
    warn!("could not extract text from chunk after retries");
    None
}

/// Accumulates a streaming assistant turn into one deterministic string.
pub struct StreamExtractor {
    partial_buffer: String,
    completed_segments: Vec<String>,
}

impl Default for StreamExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamExtractor {
    pub fn new() -> Self {
        Self {
            partial_buffer: String::new(),
            completed_segments: Vec::new(),
        }
    }

    /// Feed one chunk. If extraction fails after retries, the chunk is
    /// silently skipped rather than corrupting the accumulated text.
    ///
    /// Returns the segment that just completed, if this chunk closed one
    /// out (`partial: false`), so callers can forward it to a client in
    /// real time without waiting for [`Self::finish`]. The final
    /// replacement-chain reconciliation in `finish` still runs over the
    /// full segment list, so what's forwarded here is a live preview, not
    /// necessarily what ends up persisted as the assistant message.
    pub async fn feed(&mut self, chunk: &RawChunk) -> Option<String> {
        let (text, partial) = extract_with_retry(&chunk.0).await?;

        self.partial_buffer.push_str(&text);
        if partial {
            None
        } else if self.partial_buffer.is_empty() {
            None
        } else {
            let segment = std::mem::take(&mut self.partial_buffer);
            self.completed_segments.push(segment.clone());
            Some(segment)
        }
    }

    /// Assembles the final assistant text. Detects the case where the
    /// runtime redelivered cumulative replacements rather than deltas:
    /// if every successive segment contains its predecessor as a
    /// prefix/substring, only the longest is kept; otherwise unique
    /// segments are concatenated in order.
    pub fn finish(mut self) -> String {
        if !self.partial_buffer.is_empty() {
            self.completed_segments.push(self.partial_buffer);
        }

        if self.completed_segments.is_empty() {
            return EMPTY_RESPONSE_SENTINEL.to_string();
        }

        let is_replacement_chain = self
            .completed_segments
            .windows(2)
            .all(|pair| pair[1].contains(&pair[0]));

        let text = if is_replacement_chain {
            self.completed_segments
                .into_iter()
                .max_by_key(|s| s.len())
                .unwrap_or_default()
        } else {
            let mut seen = std::collections::HashSet::new();
            self.completed_segments
                .into_iter()
                .filter(|s| seen.insert(s.clone()))
                .collect::<Vec<_>>()
                .join("")
        };

        if text.trim().is_empty() {
            debug!("stream produced only whitespace, returning sentinel");
            EMPTY_RESPONSE_SENTINEL.to_string()
        } else {
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(chunks: Vec<Value>) -> String {
        let mut extractor = StreamExtractor::new();
        for c in chunks {
            extractor.feed(&RawChunk(c)).await;
        }
        extractor.finish()
    }

    #[tokio::test]
    async fn direct_text_attribute() {
        let out = run(vec![json!({"text": "hello", "partial": false})]).await;
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn content_with_parts() {
        let out = run(vec![json!({"content": [{"type": "text", "text": "hi "}, {"type": "text", "text": "there"}]})]).await;
        assert_eq!(out, "hi there");
    }

    #[tokio::test]
    async fn partial_chunks_accumulate_into_one_segment() {
        let out = run(vec![
            json!({"text": "He", "partial": true}),
            json!({"text": "llo", "partial": true}),
            json!({"text": " world", "partial": false}),
        ])
        .await;
        assert_eq!(out, "Hello world");
    }

    #[tokio::test]
    async fn replacement_chain_keeps_longest() {
        let out = run(vec![
            json!({"text": "Hel", "partial": false}),
            json!({"text": "Hello", "partial": false}),
            json!({"text": "Hello there", "partial": false}),
        ])
        .await;
        assert_eq!(out, "Hello there");
    }

    #[tokio::test]
    async fn explicitly_empty_returns_sentinel() {
        let out = run(vec![json!({"text": "", "partial": false})]).await;
        assert_eq!(out, EMPTY_RESPONSE_SENTINEL);
    }

    #[tokio::test]
    async fn unrecognized_shape_never_invents_text() {
        let out = run(vec![json!({"unknown_field": 123})]).await;
        assert_eq!(out, EMPTY_RESPONSE_SENTINEL);
    }

    #[tokio::test]
    async fn list_of_sub_chunks() {
        let out = run(vec![json!([{"text": "a"}, {"text": "b"}])]).await;
        assert_eq!(out, "ab");
    }

    #[tokio::test]
    async fn feed_reports_completed_segments_as_they_close() {
        let mut extractor = StreamExtractor::new();
        let first = extractor.feed(&RawChunk(json!({"text": "He", "partial": true}))).await;
        assert_eq!(first, None);
        let second = extractor.feed(&RawChunk(json!({"text": "llo", "partial": false}))).await;
        assert_eq!(second, Some("Hello".to_string()));
        let third = extractor.feed(&RawChunk(json!({"text": "!", "partial": false}))).await;
        assert_eq!(third, Some("!".to_string()));
        assert_eq!(extractor.finish(), "Hello!");
    }
}
