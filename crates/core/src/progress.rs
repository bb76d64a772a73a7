//! Decoding of the clipping service's live log stream.
//!
//! The status endpoint writes one JSON log record per chunk, with or without
//! newlines between them. Network reads do not respect record boundaries, so
//! the decoder buffers bytes until a complete object is available.

use crate::error::{ClipError, Result};
use futures::{Stream, StreamExt};
use regex::Regex;
use serde::Deserialize;
use std::fmt::Display;
use std::sync::LazyLock;

/// Logger namespace of the raster-processing library on the server.
pub const PROGRESS_SOURCE: &str = "pygeoprocessing";

/// Label shown once pixel processing is done but the upload is still running.
pub const FINALIZING_LABEL: &str = "Finalizing upload";

static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("percent pattern compiles"));

/// One server-side log record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawLogRecord")]
pub struct LogRecord {
    pub name: String,
    pub message: String,
}

/// Wire shape: the server dumps the whole record dict, which carries the
/// formatted `message`, the raw `msg`, or both.
#[derive(Deserialize)]
struct RawLogRecord {
    name: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<serde_json::Value>,
}

impl From<RawLogRecord> for LogRecord {
    fn from(raw: RawLogRecord) -> Self {
        let message = raw.message.unwrap_or_else(|| match raw.msg {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        });
        Self {
            name: raw.name,
            message,
        }
    }
}

/// Progress parsed from a log record.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// Pixel processing is under way; `text` is the matched percentage.
    Percent { text: String, fraction: f32 },
    /// Pixel processing reached 100%; the result is being uploaded.
    Finalizing,
}

impl ProgressUpdate {
    /// Text for the progress indicator.
    pub fn label(&self) -> &str {
        match self {
            ProgressUpdate::Percent { text, .. } => text,
            ProgressUpdate::Finalizing => FINALIZING_LABEL,
        }
    }

    /// Bar width in `0.0..=1.0`.
    pub fn fraction(&self) -> f32 {
        match self {
            ProgressUpdate::Percent { fraction, .. } => *fraction,
            ProgressUpdate::Finalizing => 1.0,
        }
    }
}

impl LogRecord {
    /// Extracts a progress update, ignoring records from other loggers and
    /// messages without a percentage.
    pub fn progress(&self) -> Option<ProgressUpdate> {
        if !self.name.starts_with(PROGRESS_SOURCE) {
            return None;
        }

        let captures = PERCENT.captures(&self.message)?;
        let text = captures.get(0)?.as_str().to_string();
        let value: f32 = captures.get(1)?.as_str().parse().ok()?;

        if value >= 100.0 {
            Some(ProgressUpdate::Finalizing)
        } else {
            Some(ProgressUpdate::Percent {
                text,
                fraction: (value / 100.0).clamp(0.0, 1.0),
            })
        }
    }
}

/// Incremental decoder for concatenated JSON log records.
#[derive(Debug, Default)]
pub struct LogRecordDecoder {
    buffer: Vec<u8>,
}

impl LogRecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every item completed by it, in order.
    ///
    /// Incomplete trailing bytes are kept for the next chunk. A well-formed
    /// JSON value that is not a log record comes back as an error in its own
    /// slot. Invalid JSON ends the batch and discards the rest of the buffer.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<std::result::Result<LogRecord, serde_json::Error>> {
        self.buffer.extend_from_slice(chunk);

        let mut items = Vec::new();
        let mut consumed = 0;
        let mut corrupt = false;
        {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buffer).into_iter::<serde_json::Value>();
            loop {
                match stream.next() {
                    Some(Ok(value)) => {
                        items.push(serde_json::from_value::<LogRecord>(value));
                        consumed = stream.byte_offset();
                    }
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        items.push(Err(e));
                        corrupt = true;
                        break;
                    }
                    None => {
                        consumed = stream.byte_offset();
                        break;
                    }
                }
            }
        }

        if corrupt {
            self.buffer.clear();
        } else {
            self.buffer.drain(..consumed);
        }
        items
    }

    /// Whether undecoded bytes (other than whitespace) remain buffered.
    pub fn has_partial(&self) -> bool {
        self.buffer.iter().any(|b| !b.is_ascii_whitespace())
    }
}

/// Turns a byte-chunk stream into a stream of log records.
///
/// Undecodable records surface as [`ClipError::MalformedResponse`] and
/// transport errors as [`ClipError::StreamInterrupted`]; both are items, not
/// stream termination, so the consumer decides whether to keep reading.
pub fn decode_log_stream<S, B, E>(
    chunks: S,
    endpoint: String,
) -> impl Stream<Item = Result<LogRecord>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut decoder = LogRecordDecoder::new();
    chunks
        .map(move |chunk| -> Vec<Result<LogRecord>> {
            match chunk {
                Ok(bytes) => decoder
                    .push(bytes.as_ref())
                    .into_iter()
                    .map(|item| item.map_err(|e| ClipError::malformed(endpoint.as_str(), e)))
                    .collect(),
                Err(e) => vec![Err(ClipError::interrupted(format!("{}: {}", endpoint, e)))],
            }
        })
        .flat_map(futures::stream::iter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, message: &str) -> LogRecord {
        LogRecord {
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    fn records(decoder: &mut LogRecordDecoder, chunk: &[u8]) -> Vec<LogRecord> {
        decoder
            .push(chunk)
            .into_iter()
            .map(|item| item.unwrap())
            .collect()
    }

    #[test]
    fn percentage_is_taken_from_processing_records() {
        let update = record("pygeoprocessing.geoprocessing", "warp 57.3% complete")
            .progress()
            .unwrap();
        assert_eq!(update.label(), "57.3%");
        assert!((update.fraction() - 0.573).abs() < 1e-6);
    }

    #[test]
    fn full_percentage_becomes_finalizing() {
        let update = record("pygeoprocessing.x", "100.0% complete").progress();
        assert_eq!(update, Some(ProgressUpdate::Finalizing));
        assert_eq!(update.unwrap().label(), FINALIZING_LABEL);

        let update = record("pygeoprocessing", "100% complete").progress();
        assert_eq!(update, Some(ProgressUpdate::Finalizing));
    }

    #[test]
    fn other_loggers_and_plain_messages_are_ignored() {
        assert_eq!(record("app", "57.3% complete").progress(), None);
        assert_eq!(record("pygeoprocessing", "starting warp").progress(), None);
    }

    #[test]
    fn decoder_handles_records_split_across_chunks() {
        let mut decoder = LogRecordDecoder::new();
        let first = records(&mut decoder, br#"{"name":"pygeoprocessing","message":"1"#);
        assert!(first.is_empty());
        assert!(decoder.has_partial());

        let second = records(&mut decoder, br#"0.0% done"}"#);
        assert_eq!(second, vec![record("pygeoprocessing", "10.0% done")]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn decoder_handles_concatenated_and_newline_delimited_records() {
        let mut decoder = LogRecordDecoder::new();
        let decoded = records(
            &mut decoder,
            b"{\"name\":\"a\",\"msg\":\"x\"}{\"name\":\"b\",\"message\":\"y\"}\n{\"name\":\"c\"",
        );
        assert_eq!(decoded, vec![record("a", "x"), record("b", "y")]);

        let rest = records(&mut decoder, b",\"levelno\":20,\"message\":\"z\"}\n");
        assert_eq!(rest, vec![record("c", "z")]);
    }

    #[test]
    fn formatted_message_wins_over_raw_msg() {
        let mut decoder = LogRecordDecoder::new();
        let decoded = records(
            &mut decoder,
            br#"{"name":"pygeoprocessing","msg":"%.1f%% complete","message":"42.0% complete","args":null}"#,
        );
        assert_eq!(decoded[0].message, "42.0% complete");
    }

    #[test]
    fn decoder_reports_garbage_and_recovers() {
        let mut decoder = LogRecordDecoder::new();
        let items = decoder.push(b"not json");
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
        assert!(!decoder.has_partial());
        let decoded = records(&mut decoder, br#"{"name":"a","message":"b"}"#);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn misshapen_record_does_not_drop_its_neighbours() {
        let mut decoder = LogRecordDecoder::new();
        let items = decoder.push(
            br#"{"name":null,"message":"x"}{"name":"pygeoprocessing","message":"50.0% complete"}{"name":"a","message":7}"#,
        );
        assert_eq!(items.len(), 3);
        assert!(items[0].is_err());
        let good = items[1].as_ref().unwrap();
        assert_eq!(good.progress().unwrap().label(), "50.0%");
        assert!(items[2].is_err());
        assert!(!decoder.has_partial());

        let next = records(&mut decoder, br#"{"name":"b","message":"c"}"#);
        assert_eq!(next, vec![record("b", "c")]);
    }

    #[tokio::test]
    async fn byte_stream_is_decoded_across_chunk_boundaries() {
        let chunks: Vec<std::result::Result<&[u8], String>> = vec![
            Ok(br#"{"name":"pygeoprocessing","message":"5"#.as_slice()),
            Ok(br#"7.3% complete"}{"name":"other","message":"x"}"#.as_slice()),
            Err("connection reset".to_string()),
        ];
        let items: Vec<_> = decode_log_stream(futures::stream::iter(chunks), "status".into())
            .collect()
            .await;

        assert_eq!(items.len(), 3);
        let first = items[0].as_ref().unwrap();
        assert_eq!(first.progress().unwrap().label(), "57.3%");
        assert_eq!(items[1].as_ref().unwrap().name, "other");
        assert!(matches!(items[2], Err(ClipError::StreamInterrupted(_))));
    }
}
