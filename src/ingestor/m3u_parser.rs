//! Streaming extended-M3U parser
//!
//! Bytes are pushed in with [`StreamingPlaylistParser::feed`] in chunks of
//! any size; lines may be split anywhere, including between `\r` and `\n`.
//! Channels are built as soon as a URL line completes an `#EXTINF` block, so
//! a caller can show partial results while the download is still running.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::errors::IngestError;
use crate::ingestor::events::EventSender;
use crate::models::{Channel, ChannelMetadata};

const EXTINF_PREFIX: &str = "#EXTINF:";
const HEADER_PREFIX: &str = "#EXTM3U";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Group title used when an entry has none
pub const DEFAULT_GROUP: &str = "OTHER";

/// Tuning knobs for one parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Emit a partial snapshot every this many channels
    pub partial_snapshot_interval: usize,
    /// Emit progress once this many unreported bytes have been consumed
    pub progress_step_bytes: u64,
    /// Read buffer size used by [`parse_stream`]
    pub read_buffer_bytes: usize,
    /// Longest line kept; longer lines are dropped up to the next newline
    pub max_line_bytes: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            partial_snapshot_interval: 500,
            progress_step_bytes: 100 * 1024,
            read_buffer_bytes: 64 * 1024,
            max_line_bytes: 1024 * 1024,
        }
    }
}

/// Outcome of a complete parse
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPlaylist {
    pub channels: Vec<Channel>,
    /// Guide URL announced by the `#EXTM3U` header, if any
    pub epg_url: Option<String>,
    /// URL lines that had no preceding `#EXTINF` block
    pub skipped_urls: usize,
    /// Lines dropped for exceeding [`ParserOptions::max_line_bytes`]
    pub malformed_lines: usize,
    /// Total bytes fed to the parser
    pub bytes: u64,
}

#[derive(Debug)]
enum ParseState {
    AwaitingMetadata,
    AwaitingUrl(Box<ChannelMetadata>),
}

/// Push-based M3U parser; one instance per parse run
pub struct StreamingPlaylistParser {
    options: ParserOptions,
    events: EventSender,
    total_hint: u64,
    state: ParseState,
    line_buf: Vec<u8>,
    discarding: bool,
    channels: Vec<Channel>,
    groups: HashSet<Arc<str>>,
    epg_url: Option<String>,
    skipped_urls: usize,
    malformed_lines: usize,
    bytes_consumed: u64,
    last_reported: u64,
    at_start: bool,
    header_seen: bool,
}

impl StreamingPlaylistParser {
    /// Create a parser. `total_hint` is the expected byte length, 0 if unknown.
    pub fn new(total_hint: u64, options: ParserOptions, events: EventSender) -> Self {
        Self {
            options,
            events,
            total_hint,
            state: ParseState::AwaitingMetadata,
            line_buf: Vec::new(),
            discarding: false,
            channels: Vec::new(),
            groups: HashSet::new(),
            epg_url: None,
            skipped_urls: 0,
            malformed_lines: 0,
            bytes_consumed: 0,
            last_reported: 0,
            at_start: true,
            header_seen: false,
        }
    }

    /// Number of channels built so far
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Feed the next chunk of raw playlist bytes
    pub fn feed(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.bytes_consumed += chunk.len() as u64;

        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.complete_line(&rest[..pos]);
            rest = &rest[pos + 1..];
        }
        self.buffer_partial_line(rest);

        self.maybe_report_progress();
    }

    fn complete_line(&mut self, tail: &[u8]) {
        if self.discarding {
            self.discarding = false;
            return;
        }
        if self.line_buf.len() + tail.len() > self.options.max_line_bytes {
            self.line_buf.clear();
            self.reject_long_line();
            return;
        }
        if self.line_buf.is_empty() {
            self.process_line_bytes(tail);
        } else {
            self.line_buf.extend_from_slice(tail);
            let line = std::mem::take(&mut self.line_buf);
            self.process_line_bytes(&line);
        }
    }

    fn buffer_partial_line(&mut self, bytes: &[u8]) {
        if self.discarding || bytes.is_empty() {
            return;
        }
        if self.line_buf.len() + bytes.len() > self.options.max_line_bytes {
            self.line_buf = Vec::new();
            self.discarding = true;
            self.reject_long_line();
            return;
        }
        self.line_buf.extend_from_slice(bytes);
    }

    fn reject_long_line(&mut self) {
        self.malformed_lines += 1;
        debug!(
            "Dropping playlist line longer than {} bytes",
            self.options.max_line_bytes
        );
    }

    /// Read an async source to its end, feeding every chunk
    pub async fn consume<R>(&mut self, mut reader: R) -> Result<(), IngestError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.options.read_buffer_bytes.max(1)];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| IngestError::io("reading playlist stream", &e))?;
            if n == 0 {
                return Ok(());
            }
            self.feed(&buf[..n]);
        }
    }

    /// Flush the last unterminated line and return the result
    ///
    /// A trailing `#EXTINF` block without a URL is discarded.
    pub fn finish(mut self) -> ParsedPlaylist {
        if !self.discarding && !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.process_line_bytes(&line);
        }

        debug!(
            "Parsed {} channels from {} bytes ({} orphan URLs, {} overlong lines, {} groups)",
            self.channels.len(),
            self.bytes_consumed,
            self.skipped_urls,
            self.malformed_lines,
            self.groups.len()
        );

        ParsedPlaylist {
            channels: self.channels,
            epg_url: self.epg_url,
            skipped_urls: self.skipped_urls,
            malformed_lines: self.malformed_lines,
            bytes: self.bytes_consumed,
        }
    }

    fn maybe_report_progress(&mut self) {
        if self.total_hint == 0 {
            return;
        }
        if self.bytes_consumed - self.last_reported > self.options.progress_step_bytes {
            self.last_reported = self.bytes_consumed;
            self.events
                .progress(self.bytes_consumed as f32 / self.total_hint as f32);
        }
    }

    fn process_line_bytes(&mut self, raw: &[u8]) {
        let mut raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if self.at_start {
            self.at_start = false;
            raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
        }
        let line = String::from_utf8_lossy(raw);
        self.process_line(line.trim());
    }

    fn process_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }

        if let Some(rest) = line.strip_prefix(EXTINF_PREFIX) {
            let metadata = self.parse_extinf(rest);
            // A second #EXTINF before a URL replaces the pending block
            self.state = ParseState::AwaitingUrl(Box::new(metadata));
            return;
        }

        if line.starts_with('#') {
            if !self.header_seen && line.starts_with(HEADER_PREFIX) {
                self.header_seen = true;
                self.epg_url = header_epg_url(&line[HEADER_PREFIX.len()..]);
            }
            return;
        }

        match std::mem::replace(&mut self.state, ParseState::AwaitingMetadata) {
            ParseState::AwaitingUrl(metadata) => {
                if let Some(channel) = Channel::new(*metadata, line) {
                    self.push_channel(channel);
                }
            }
            ParseState::AwaitingMetadata => {
                self.skipped_urls += 1;
                trace!("Skipping URL line without #EXTINF metadata");
            }
        }
    }

    fn push_channel(&mut self, channel: Channel) {
        self.channels.push(channel);

        let interval = self.options.partial_snapshot_interval;
        if interval > 0
            && self.channels.len() % interval == 0
            && self.events.has_subscriber()
        {
            self.events.partial(Arc::new(self.channels.clone()));
        }
    }

    fn intern_group(&mut self, group: &str) -> Arc<str> {
        if let Some(existing) = self.groups.get(group) {
            return Arc::clone(existing);
        }
        let interned: Arc<str> = Arc::from(group);
        self.groups.insert(Arc::clone(&interned));
        interned
    }

    fn parse_extinf(&mut self, rest: &str) -> ChannelMetadata {
        let (attributes, name) = split_extinf(rest);

        let mut metadata = ChannelMetadata {
            name: name.to_string(),
            ..Default::default()
        };
        let mut group: Option<String> = None;

        for (key, value) in scan_attributes(attributes) {
            let value = value.trim();
            match key.as_str() {
                // Present but empty stays empty; only a missing title falls back
                "group-title" => group = Some(value.to_string()),
                _ if value.is_empty() => {}
                "tvg-id" => metadata.tvg_id = Some(value.to_string()),
                "tvg-name" => metadata.tvg_name = Some(value.to_string()),
                "tvg-logo" => metadata.tvg_logo = Some(value.to_string()),
                "logo" => metadata.logo = Some(value.to_string()),
                "tvg-shift" => metadata.tvg_shift = Some(value.to_string()),
                "radio" => {
                    metadata.radio = ["true", "1", "yes"]
                        .iter()
                        .any(|t| value.eq_ignore_ascii_case(t))
                }
                "catchup" => metadata.catchup = Some(value.to_string()),
                "catchup-days" => metadata.catchup_days = Some(value.to_string()),
                "catchup-source" => metadata.catchup_source = Some(value.to_string()),
                _ => {}
            }
        }

        if metadata.tvg_logo.is_none() {
            metadata.tvg_logo = metadata.logo.clone();
        }
        metadata.group = Some(self.intern_group(group.as_deref().unwrap_or(DEFAULT_GROUP)));
        metadata
    }
}

/// Parse a whole async stream and finish with `Progress(1.0)`
pub async fn parse_stream<R>(
    reader: R,
    total_length_hint: u64,
    options: ParserOptions,
    events: EventSender,
) -> Result<ParsedPlaylist, IngestError>
where
    R: AsyncRead + Unpin,
{
    let mut parser = StreamingPlaylistParser::new(total_length_hint, options, events.clone());
    parser.consume(reader).await?;
    let parsed = parser.finish();
    events.final_progress();
    Ok(parsed)
}

/// Guide URL from the `#EXTM3U` header attributes
///
/// `x-tvg-url` may list several comma separated URLs; the first is used.
fn header_epg_url(attributes: &str) -> Option<String> {
    scan_attributes(attributes)
        .into_iter()
        .filter(|(key, _)| key == "x-tvg-url" || key == "url-tvg")
        .find_map(|(_, value)| {
            value
                .split(',')
                .map(str::trim)
                .find(|url| !url.is_empty())
                .map(str::to_string)
        })
}

/// Split `#EXTINF` text into its attribute part and the display name
///
/// The name follows the last comma outside a quoted attribute value, so
/// `group-title="News, Sport"` stays intact. A quote only opens directly
/// after `=`. Without such a comma the name is empty.
fn split_extinf(rest: &str) -> (&str, &str) {
    let mut quote: Option<char> = None;
    let mut previous = None;
    let mut split = None;

    for (idx, c) in rest.char_indices() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None if (c == '"' || c == '\'') && previous == Some('=') => quote = Some(c),
            None if c == ',' => split = Some(idx),
            None => {}
        }
        previous = Some(c);
    }

    match split {
        Some(pos) => (&rest[..pos], rest[pos + 1..].trim()),
        None => (rest, ""),
    }
}

/// Tolerant `key=value` scanner for EXTINF and EXTM3U attributes
///
/// Values may be double quoted, single quoted or bare. Tokens without `=`
/// (such as the `-1` duration) are skipped and an unterminated quote runs to
/// the end of the input. Keys are lower-cased.
fn scan_attributes(input: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let mut key_end = start;
        while let Some(&(idx, c)) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key_end = idx + c.len_utf8();
            chars.next();
        }

        if !matches!(chars.peek(), Some(&(_, '='))) {
            continue;
        }
        chars.next();

        let key = input[start..key_end].trim().to_ascii_lowercase();
        let value = match chars.peek() {
            Some(&(idx, quote)) if quote == '"' || quote == '\'' => {
                chars.next();
                let value_start = idx + 1;
                let mut value_end = input.len();
                for (i, c) in chars.by_ref() {
                    if c == quote {
                        value_end = i;
                        break;
                    }
                }
                &input[value_start..value_end.max(value_start)]
            }
            Some(&(idx, _)) => {
                let mut value_end = input.len();
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_whitespace() {
                        value_end = i;
                        break;
                    }
                    chars.next();
                }
                &input[idx..value_end]
            }
            None => "",
        };

        if !key.is_empty() {
            attrs.push((key, value.to_string()));
        }
    }

    attrs
}
