//! Delimited text format for log records.
//!
//! Each record is written as one logical line whose fields are joined by
//! [`RECORD_SEPARATOR`]:
//!
//! ```text
//! timestamp|>severity|>file|>function|>line|>body
//! ```
//!
//! The body is the final field and is written verbatim, so a body with
//! embedded newlines spans several physical lines. Decoding is therefore
//! separator-aware: a physical line containing the separator starts a new
//! record, and a physical line without it continues the body of the record
//! before it. Encoding rejects any text field that contains the separator,
//! which keeps this scan unambiguous.
//!
//! # Malformed input
//!
//! Decoding is lenient. [`RecordCodec::decode`] returns every record it
//! could parse together with a [`MalformedRecord`] for each one it could not,
//! in file order. Callers that prefer to fail on the first bad record use
//! [`DecodedSlot::into_strict`].

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::{CodecError, ConfigError, MalformedReason, MalformedRecord, Result};
use crate::record::{LogRecord, RecordHeader, Severity, SourceLocation};

/// Sequence that separates fields within an encoded record.
pub const RECORD_SEPARATOR: &str = "|>";

/// Default strftime format for the timestamp field.
///
/// RFC 3339 with automatic sub-second precision and an explicit offset, so
/// that every `DateTime<Utc>` survives a round trip unchanged.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";

/// Number of fields in an encoded record.
const FIELD_COUNT: usize = 6;

/// Encoder and decoder for the delimited record format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCodec {
    timestamp_format: String,
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self {
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl RecordCodec {
    /// Creates a codec that renders timestamps with the given strftime format.
    ///
    /// Formats without a UTC offset are read back as UTC.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimestampFormat`] if the format is empty,
    /// contains an unknown specifier, a line break, or the record separator.
    pub fn new(timestamp_format: impl Into<String>) -> std::result::Result<Self, ConfigError> {
        let timestamp_format = timestamp_format.into();
        validate_timestamp_format(&timestamp_format)?;
        Ok(Self { timestamp_format })
    }

    /// Returns the configured timestamp format.
    pub fn timestamp_format(&self) -> &str {
        &self.timestamp_format
    }

    /// Encodes a record as a single logical line without a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if a text field contains the separator, the
    /// file or function name contains a line break, or the line number is 0.
    pub fn encode(&self, record: &LogRecord) -> std::result::Result<String, CodecError> {
        check_field("file", &record.location.file, true)?;
        check_field("function", &record.location.function, true)?;
        check_field("body", &record.body, false)?;
        if record.location.line == 0 {
            return Err(CodecError::InvalidLineNumber);
        }

        let mut line = String::with_capacity(
            64 + record.location.file.len() + record.location.function.len() + record.body.len(),
        );
        write!(
            line,
            "{}",
            record.header.timestamp.format(&self.timestamp_format)
        )
        .map_err(|_| CodecError::TimestampFormat {
            format: self.timestamp_format.clone(),
        })?;

        for field in [
            record.header.severity.as_str(),
            record.location.file.as_str(),
            record.location.function.as_str(),
        ] {
            line.push_str(RECORD_SEPARATOR);
            line.push_str(field);
        }
        line.push_str(RECORD_SEPARATOR);
        line.push_str(&record.location.line.to_string());
        line.push_str(RECORD_SEPARATOR);
        line.push_str(&record.body);

        Ok(line)
    }

    /// Decodes the contents of a slot file.
    ///
    /// The final line terminator of `text`, if any, is not part of the last
    /// record's body. Empty text decodes to no records.
    pub fn decode(&self, text: &str) -> DecodedSlot {
        let text = text.strip_suffix('\n').unwrap_or(text);
        if text.is_empty() {
            return DecodedSlot::default();
        }
        self.decode_lines(text.split('\n').map(Some))
    }

    /// Decodes raw slot file bytes.
    ///
    /// Behaves like [`decode`](Self::decode), except that a physical line
    /// which is not valid UTF-8 is reported as
    /// [`MalformedReason::InvalidUtf8`]. It ends the record in progress, and
    /// continuation lines following it belong to the same corrupt run.
    pub fn decode_bytes(&self, bytes: &[u8]) -> DecodedSlot {
        let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        if bytes.is_empty() {
            return DecodedSlot::default();
        }
        self.decode_lines(
            bytes
                .split(|&b| b == b'\n')
                .map(|line| std::str::from_utf8(line).ok()),
        )
    }

    /// Groups physical lines into records. `None` marks an undecodable line.
    fn decode_lines<'a>(&self, lines: impl Iterator<Item = Option<&'a str>>) -> DecodedSlot {
        let mut decoded = DecodedSlot::default();
        let mut pending: Option<(usize, String)> = None;
        let mut in_orphan_run = false;

        for (index, physical) in lines.enumerate() {
            let line_number = index + 1;

            let Some(physical) = physical else {
                if let Some((start, raw)) = pending.take() {
                    decoded.push(start, self.parse_record(&raw));
                }
                decoded.malformed.push(MalformedRecord {
                    line: line_number,
                    reason: MalformedReason::InvalidUtf8,
                });
                in_orphan_run = true;
                continue;
            };

            if physical.contains(RECORD_SEPARATOR) {
                if let Some((start, raw)) = pending.take() {
                    decoded.push(start, self.parse_record(&raw));
                }
                pending = Some((line_number, physical.to_string()));
                in_orphan_run = false;
            } else if let Some((_, raw)) = pending.as_mut() {
                raw.push('\n');
                raw.push_str(physical);
            } else if !in_orphan_run {
                decoded.malformed.push(MalformedRecord {
                    line: line_number,
                    reason: MalformedReason::OrphanContinuation,
                });
                in_orphan_run = true;
            }
        }

        if let Some((start, raw)) = pending {
            decoded.push(start, self.parse_record(&raw));
        }

        decoded
    }

    /// Parses one logical record (header fields plus full body).
    fn parse_record(&self, raw: &str) -> std::result::Result<LogRecord, MalformedReason> {
        let mut fields = raw.splitn(FIELD_COUNT, RECORD_SEPARATOR);

        let timestamp = required(fields.next(), "timestamp")?;
        let severity = required(fields.next(), "severity")?;
        let file = fields.next().ok_or(MalformedReason::MissingField("file"))?;
        let function = fields
            .next()
            .ok_or(MalformedReason::MissingField("function"))?;
        let line = required(fields.next(), "line")?;
        let body = fields.next().ok_or(MalformedReason::MissingField("body"))?;

        let severity: Severity = severity
            .parse()
            .map_err(|_| MalformedReason::UnknownSeverity(severity.to_string()))?;

        let line = match line.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => return Err(MalformedReason::InvalidLineNumber(line.to_string())),
        };

        let timestamp = self
            .parse_timestamp(timestamp)
            .ok_or_else(|| MalformedReason::InvalidTimestamp(timestamp.to_string()))?;

        Ok(LogRecord {
            header: RecordHeader {
                timestamp,
                severity,
            },
            location: SourceLocation {
                file: file.to_string(),
                function: function.to_string(),
                line,
            },
            body: body.to_string(),
        })
    }

    fn parse_timestamp(&self, raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_str(raw, &self.timestamp_format)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(raw, &self.timestamp_format)
                    .map(|naive| Utc.from_utc_datetime(&naive))
            })
            .ok()
    }
}

/// Records recovered from a slot file, plus any that failed to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedSlot {
    /// Successfully decoded records, in file order.
    pub records: Vec<LogRecord>,
    /// Records that failed to decode, in file order.
    pub malformed: Vec<MalformedRecord>,
}

impl DecodedSlot {
    fn push(&mut self, line: usize, parsed: std::result::Result<LogRecord, MalformedReason>) {
        match parsed {
            Ok(record) => self.records.push(record),
            Err(reason) => self.malformed.push(MalformedRecord { line, reason }),
        }
    }

    /// Returns true when every record decoded.
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty()
    }

    /// Returns the decoded records, failing on the first malformed one.
    ///
    /// # Errors
    ///
    /// Returns [`DaylogError::MalformedRecord`](crate::DaylogError::MalformedRecord)
    /// for the earliest record that failed to decode.
    pub fn into_strict(self) -> Result<Vec<LogRecord>> {
        match self.malformed.into_iter().next() {
            Some(first) => Err(first.into()),
            None => Ok(self.records),
        }
    }
}

fn required<'a>(
    field: Option<&'a str>,
    name: &'static str,
) -> std::result::Result<&'a str, MalformedReason> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MalformedReason::MissingField(name)),
    }
}

fn check_field(
    field: &'static str,
    value: &str,
    single_line: bool,
) -> std::result::Result<(), CodecError> {
    if value.contains(RECORD_SEPARATOR) {
        return Err(CodecError::SeparatorInField { field });
    }
    if single_line && value.contains(['\n', '\r']) {
        return Err(CodecError::LineBreakInField { field });
    }
    Ok(())
}

pub(crate) fn validate_timestamp_format(format: &str) -> std::result::Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTimestampFormat {
        format: format.to_string(),
        reason: reason.to_string(),
    };

    if format.is_empty() {
        return Err(invalid("format is empty"));
    }
    if format.contains(RECORD_SEPARATOR) {
        return Err(invalid("format contains the record separator"));
    }
    if format.contains(['\n', '\r']) {
        return Err(invalid("format contains a line break"));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(invalid("format contains an unrecognized specifier"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(body: &str) -> LogRecord {
        LogRecord::new(
            Severity::Info,
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            "main.rs",
            "run",
            42,
            body,
        )
    }

    #[test]
    fn test_encode_field_order() {
        let codec = RecordCodec::default();
        let line = codec.encode(&sample("hello")).unwrap();
        assert_eq!(line, "2023-11-14T22:13:20+00:00|>info|>main.rs|>run|>42|>hello");
    }

    #[test]
    fn test_multiline_body_round_trip() {
        let codec = RecordCodec::default();
        let record = sample("Warning message\nThis is test!");
        let line = codec.encode(&record).unwrap();
        assert_eq!(line.lines().count(), 2);

        let decoded = codec.decode(&line);
        assert!(decoded.is_clean());
        assert_eq!(decoded.records, vec![record]);
    }

    #[test]
    fn test_decode_several_records() {
        let codec = RecordCodec::default();
        let first = sample("first");
        let second = sample("second\nwith\n\ncontinuation");
        let third = sample("");

        let mut text = String::new();
        for record in [&first, &second, &third] {
            text.push_str(&codec.encode(record).unwrap());
            text.push('\n');
        }

        let decoded = codec.decode(&text);
        assert!(decoded.is_clean());
        assert_eq!(decoded.records, vec![first, second, third]);
    }

    #[test]
    fn test_decode_empty_text() {
        let codec = RecordCodec::default();
        assert_eq!(codec.decode(""), DecodedSlot::default());
        assert_eq!(codec.decode("\n"), DecodedSlot::default());
    }

    #[test]
    fn test_body_with_trailing_newline_survives_terminator() {
        let codec = RecordCodec::default();
        let record = sample("ends with newline\n");
        let text = format!("{}\n", codec.encode(&record).unwrap());
        assert_eq!(codec.decode(&text).records, vec![record]);
    }

    #[test]
    fn test_missing_severity_is_isolated() {
        let codec = RecordCodec::default();
        let good = sample("kept");
        let text = format!(
            "{}\n2023-11-14T22:13:20+00:00|>main.rs|>run|>7|>lost\n",
            codec.encode(&good).unwrap()
        );

        let decoded = codec.decode(&text);
        assert_eq!(decoded.records, vec![good]);
        assert_eq!(decoded.malformed.len(), 1);
        assert_eq!(decoded.malformed[0].line, 2);
        assert_eq!(
            decoded.malformed[0].reason,
            MalformedReason::UnknownSeverity("main.rs".to_string())
        );
    }

    #[test]
    fn test_malformed_reasons() {
        let codec = RecordCodec::default();
        let cases = [
            (
                "2023-11-14T22:13:20+00:00|>|>f|>g|>1|>b",
                MalformedReason::MissingField("severity"),
            ),
            (
                "2023-11-14T22:13:20+00:00|>info|>f|>g|>0|>b",
                MalformedReason::InvalidLineNumber("0".to_string()),
            ),
            (
                "2023-11-14T22:13:20+00:00|>info|>f|>g|>-3|>b",
                MalformedReason::InvalidLineNumber("-3".to_string()),
            ),
            (
                "yesterday|>info|>f|>g|>1|>b",
                MalformedReason::InvalidTimestamp("yesterday".to_string()),
            ),
            (
                "2023-11-14T22:13:20+00:00|>info|>f|>g|>1",
                MalformedReason::MissingField("body"),
            ),
            (
                "2023-11-14T22:13:20+00:00|>fatal|>f|>g|>1|>b",
                MalformedReason::UnknownSeverity("fatal".to_string()),
            ),
        ];

        for (text, expected) in cases {
            let decoded = codec.decode(text);
            assert!(decoded.records.is_empty(), "{text}");
            assert_eq!(decoded.malformed[0].reason, expected, "{text}");
        }
    }

    #[test]
    fn test_orphan_text_reported_once() {
        let codec = RecordCodec::default();
        let good = sample("ok");
        let text = format!("garbage\nmore garbage\n{}\n", codec.encode(&good).unwrap());

        let decoded = codec.decode(&text);
        assert_eq!(decoded.records, vec![good]);
        assert_eq!(
            decoded.malformed,
            vec![MalformedRecord {
                line: 1,
                reason: MalformedReason::OrphanContinuation,
            }]
        );
    }

    #[test]
    fn test_decode_bytes_isolates_invalid_utf8_lines() {
        let codec = RecordCodec::default();
        let first = sample("before");
        let last = sample("after");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(codec.encode(&first).unwrap().as_bytes());
        bytes.extend_from_slice(b"\n\xff\xfe garbage\nstill garbage\n");
        bytes.extend_from_slice(codec.encode(&last).unwrap().as_bytes());
        bytes.push(b'\n');

        let decoded = codec.decode_bytes(&bytes);
        assert_eq!(decoded.records, vec![first, last]);
        assert_eq!(
            decoded.malformed,
            vec![MalformedRecord {
                line: 2,
                reason: MalformedReason::InvalidUtf8,
            }]
        );
    }

    #[test]
    fn test_decode_bytes_matches_decode_for_text() {
        let codec = RecordCodec::default();
        let text = format!(
            "{}\n{}\n",
            codec.encode(&sample("one\ntwo")).unwrap(),
            codec.encode(&sample("three")).unwrap()
        );

        assert_eq!(codec.decode_bytes(text.as_bytes()), codec.decode(&text));
        assert_eq!(codec.decode_bytes(b""), DecodedSlot::default());
    }

    #[test]
    fn test_into_strict_fails_on_first_malformed() {
        let codec = RecordCodec::default();
        let text = "bad|>info|>f|>g|>1|>b\nworse|>info|>f|>g|>1|>b\n";
        let err = codec.decode(text).into_strict().unwrap_err();
        match err {
            crate::DaylogError::MalformedRecord(record) => assert_eq!(record.line, 1),
            other => panic!("Expected MalformedRecord error, got: {other:?}"),
        }
    }

    #[test]
    fn test_encode_rejects_separator_and_line_breaks() {
        let codec = RecordCodec::default();

        let mut record = sample("a |> b");
        assert_eq!(
            codec.encode(&record),
            Err(CodecError::SeparatorInField { field: "body" })
        );

        record.body = "fine".to_string();
        record.location.function = "split\nname".to_string();
        assert_eq!(
            codec.encode(&record),
            Err(CodecError::LineBreakInField { field: "function" })
        );

        record.location.function = "run".to_string();
        record.location.file = "odd|>file.rs".to_string();
        assert_eq!(
            codec.encode(&record),
            Err(CodecError::SeparatorInField { field: "file" })
        );

        record.location.file = "main.rs".to_string();
        record.location.line = 0;
        assert_eq!(codec.encode(&record), Err(CodecError::InvalidLineNumber));
    }

    #[test]
    fn test_custom_format_without_offset_reads_as_utc() {
        let codec = RecordCodec::new("%d.%m.%Y %H:%M:%S").unwrap();
        let record = sample("custom");
        let line = codec.encode(&record).unwrap();
        assert!(line.starts_with("14.11.2023 22:13:20|>"));
        assert_eq!(codec.decode(&line).records, vec![record]);
    }

    #[test]
    fn test_invalid_timestamp_formats_rejected() {
        for format in ["", "%Y|>%m", "%Y\n%m", "%Q"] {
            assert!(
                matches!(
                    RecordCodec::new(format),
                    Err(ConfigError::InvalidTimestampFormat { .. })
                ),
                "{format:?}"
            );
        }
    }

    fn arb_record() -> impl Strategy<Value = LogRecord> {
        (
            0i64..4_102_444_800,
            0u32..1_000_000_000,
            prop::sample::select(Severity::ALL.to_vec()),
            "[a-zA-Z0-9_./-]{0,24}",
            "[a-zA-Z0-9_:<>()]{0,24}",
            1u32..=u32::MAX,
            "[a-zA-Z0-9 .,;!?>\n]{0,120}",
        )
            .prop_map(|(secs, nanos, severity, file, function, line, body)| {
                let timestamp = DateTime::from_timestamp(secs, nanos).unwrap();
                LogRecord::new(severity, timestamp, file, function, line, body)
            })
    }

    proptest! {
        #[test]
        fn prop_stored_records_decode_unchanged(records in prop::collection::vec(arb_record(), 1..8)) {
            let codec = RecordCodec::default();
            let mut text = String::new();
            for record in &records {
                text.push_str(&codec.encode(record).unwrap());
                text.push('\n');
            }

            let decoded = codec.decode(&text);
            prop_assert!(decoded.is_clean());
            prop_assert_eq!(decoded.records, records);
        }
    }
}
