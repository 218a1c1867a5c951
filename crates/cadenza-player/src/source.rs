//! Audio source descriptors and the readers that back them.
//!
//! An [`AudioSource`] names where the compressed audio lives; opening one
//! yields a Symphonia [`MediaSource`] plus a probe hint. Sources are cheap to
//! clone so the decode-failure recovery protocol can re-open the same source
//! after disposing a broken decoder.
//!
//! Remote sources honor a [`CancelToken`]: the player fires it when playback
//! stops or the source is swapped, so a reader blocked on the network lets
//! go instead of riding out its timeout.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;

use crate::error::DecodeError;

/// Shared cancellation flag handed to source readers.
///
/// Clones share the underlying flag. Once fired, readers report end of data
/// without touching the network; `reset` re-arms the flag for the next
/// session.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Where to read compressed audio from.
#[derive(Clone, Debug)]
pub enum AudioSource {
    /// Local file path.
    File(PathBuf),
    /// Remote HTTP(S) URL, fetched with range requests.
    Url(String),
    /// In-memory byte buffer (the equivalent of loading from a stream).
    Bytes(Arc<[u8]>),
}

impl AudioSource {
    /// Reject obviously unusable sources before any I/O happens.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            AudioSource::File(path) if path.as_os_str().is_empty() => {
                Err("empty file path".to_string())
            }
            AudioSource::Url(url) if url.trim().is_empty() => Err("empty url".to_string()),
            AudioSource::Bytes(bytes) if bytes.is_empty() => {
                Err("empty byte buffer".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Human-readable label for log records.
    pub fn describe(&self) -> String {
        match self {
            AudioSource::File(path) => path.display().to_string(),
            AudioSource::Url(url) => url.clone(),
            AudioSource::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }

    /// Open the source as a seekable Symphonia media source with a format
    /// hint derived from the file extension, when one is present. Remote
    /// reads observe `cancel`.
    pub fn open(&self, cancel: &CancelToken) -> Result<(Box<dyn MediaSource>, Hint), DecodeError> {
        match self {
            AudioSource::File(path) => {
                let file = File::open(path)?;
                let mut hint = Hint::new();
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    hint.with_extension(ext);
                }
                Ok((Box::new(file), hint))
            }
            AudioSource::Url(url) => {
                let mut hint = Hint::new();
                if let Some(ext) = infer_ext_from_url(url) {
                    hint.with_extension(&ext);
                }
                let reader =
                    HttpReader::new(url.clone(), HttpReaderConfig::default(), cancel.clone());
                Ok((Box::new(reader), hint))
            }
            AudioSource::Bytes(bytes) => {
                Ok((Box::new(BytesSource::new(bytes.clone())), Hint::new()))
            }
        }
    }
}

/// Infer a file extension from the URL path if present.
fn infer_ext_from_url(url: &str) -> Option<String> {
    let tail = url.split('?').next().unwrap_or(url);
    let file = tail.rsplit('/').next().unwrap_or(tail);
    let mut parts = file.rsplit('.');
    let ext = parts.next()?;
    if parts.next().is_some() {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

/// Seekable reader over an in-memory buffer.
struct BytesSource {
    cursor: Cursor<Arc<[u8]>>,
}

impl BytesSource {
    fn new(bytes: Arc<[u8]>) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }
}

impl Read for BytesSource {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(out)
    }
}

impl Seek for BytesSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl MediaSource for BytesSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.cursor.get_ref().len() as u64)
    }
}

/// Tunables for HTTP range fetching.
#[derive(Clone, Debug)]
pub struct HttpReaderConfig {
    /// Bytes requested per fetch.
    pub block_size: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpReaderConfig {
    fn default() -> Self {
        Self {
            block_size: 512 * 1024,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Range-request HTTP reader caching one fetched block at a time.
///
/// Sequential decode reads are served from the cached block; seeks simply
/// move the logical position and the next read fetches the block covering
/// it. A fired cancel token makes every read report end of data.
pub struct HttpReader {
    url: String,
    config: HttpReaderConfig,
    cancel: CancelToken,
    pos: u64,
    total: Option<u64>,
    cache: Vec<u8>,
    cache_start: u64,
}

impl HttpReader {
    pub fn new(url: String, config: HttpReaderConfig, cancel: CancelToken) -> Self {
        Self {
            url,
            config,
            cancel,
            pos: 0,
            total: None,
            cache: Vec::new(),
            cache_start: 0,
        }
    }

    /// Offset into the cache for the current position, with the byte count
    /// available from there, or `None` when the position falls outside the
    /// cached block.
    fn cache_window(&self) -> Option<(usize, usize)> {
        if self.cache.is_empty() || self.pos < self.cache_start {
            return None;
        }
        let offset = (self.pos - self.cache_start) as usize;
        if offset >= self.cache.len() {
            return None;
        }
        Some((offset, self.cache.len() - offset))
    }

    /// Learn the total length, issuing a one-byte range probe if needed.
    fn probe_total(&mut self) -> io::Result<u64> {
        if let Some(total) = self.total {
            return Ok(total);
        }
        let (data, total) = self.fetch(0, 0)?;
        let total = total.ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "server did not report a total length")
        })?;
        self.cache = data;
        self.cache_start = 0;
        self.total = Some(total);
        Ok(total)
    }

    /// Issue one range request, returning the body and the total length when
    /// the server reports one.
    fn fetch(&self, start: u64, end: u64) -> io::Result<(Vec<u8>, Option<u64>)> {
        let resp = ureq::get(&self.url)
            .config()
            .timeout_per_call(Some(self.config.timeout))
            .build()
            .header("Range", &format!("bytes={start}-{end}"))
            .call()
            .map_err(|e| {
                io::Error::new(io::ErrorKind::Other, format!("range request failed: {e}"))
            })?;

        let status = resp.status();
        let content_range = header_str(&resp, "Content-Range");
        let content_length = header_str(&resp, "Content-Length").and_then(|s| s.parse().ok());

        let mut data = Vec::new();
        let (_, body) = resp.into_parts();
        body.into_reader()
            .read_to_end(&mut data)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("body read failed: {e}")))?;

        let total = match status {
            ureq::http::StatusCode::PARTIAL_CONTENT => content_range
                .as_deref()
                .and_then(content_range_total)
                .or(content_length),
            ureq::http::StatusCode::OK => content_length,
            _ => None,
        };

        Ok((data, total))
    }

    /// Fetch the block covering the current position into the cache. A fired
    /// cancel token leaves the cache empty instead of going to the network.
    fn fill_cache(&mut self) -> io::Result<()> {
        if self.cancel.is_canceled() {
            self.cache.clear();
            return Ok(());
        }

        let start = self.pos;
        let block = self.config.block_size.saturating_sub(1) as u64;
        let mut end = start.saturating_add(block);
        if let Some(total) = self.total.filter(|t| *t > 0) {
            end = end.min(total - 1);
        }

        let (data, total) = self.fetch(start, end)?;
        if total.is_some() {
            self.total = total;
        }
        self.cache = data;
        self.cache_start = start;
        Ok(())
    }
}

impl Read for HttpReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.cancel.is_canceled() {
            return Ok(0);
        }
        if let Some(total) = self.total {
            if self.pos >= total {
                return Ok(0);
            }
        }

        if self.cache_window().is_none() {
            self.fill_cache()?;
        }
        let Some((offset, available)) = self.cache_window() else {
            return Ok(0);
        };

        let count = available.min(out.len());
        out[..count].copy_from_slice(&self.cache[offset..offset + count]);
        self.pos += count as u64;
        Ok(count)
    }
}

impl Seek for HttpReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(x) => x,
            SeekFrom::Current(d) => offset_by(self.pos, d),
            SeekFrom::End(d) => {
                let total = self.probe_total()?;
                offset_by(total, d)
            }
        };
        Ok(self.pos)
    }
}

impl MediaSource for HttpReader {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.total
    }
}

fn header_str(resp: &ureq::http::Response<ureq::Body>, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Total length from a Content-Range header ("bytes start-end/total").
fn content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.parse().ok()
}

/// Apply a signed delta to an unsigned position, saturating at the bounds.
fn offset_by(base: u64, delta: i64) -> u64 {
    if delta < 0 {
        base.saturating_sub(delta.unsigned_abs())
    } else {
        base.saturating_add(delta as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_sources() {
        assert!(AudioSource::Url(String::new()).validate().is_err());
        assert!(AudioSource::File(PathBuf::new()).validate().is_err());
        assert!(AudioSource::Bytes(Arc::from(Vec::new())).validate().is_err());
        assert!(AudioSource::Url("http://example/a.flac".to_string())
            .validate()
            .is_ok());
    }

    #[test]
    fn bytes_source_reads_and_seeks() {
        let data: Arc<[u8]> = Arc::from(vec![1u8, 2, 3, 4, 5]);
        let mut source = BytesSource::new(data);
        assert_eq!(source.byte_len(), Some(5));

        let mut out = [0u8; 2];
        assert_eq!(source.read(&mut out).unwrap(), 2);
        assert_eq!(out, [1, 2]);

        source.seek(SeekFrom::Start(4)).unwrap();
        assert_eq!(source.read(&mut out).unwrap(), 1);
        assert_eq!(out[0], 5);
    }

    #[test]
    fn infer_ext_from_url_handles_query_and_missing_ext() {
        assert_eq!(
            infer_ext_from_url("http://example/a.flac?x=1"),
            Some("flac".to_string())
        );
        assert_eq!(infer_ext_from_url("http://example/a"), None);
    }

    #[test]
    fn infer_ext_from_url_handles_multiple_dots() {
        assert_eq!(
            infer_ext_from_url("http://example/archive.track.flac"),
            Some("flac".to_string())
        );
    }

    #[test]
    fn cancel_token_clones_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_canceled());

        token.cancel();
        assert!(clone.is_canceled());

        clone.reset();
        assert!(!token.is_canceled());
    }

    #[test]
    fn canceled_reader_reads_nothing() {
        let cancel = CancelToken::new();
        let mut reader = HttpReader::new(
            "http://example/track.flac".to_string(),
            HttpReaderConfig::default(),
            cancel.clone(),
        );
        cancel.cancel();

        // No request goes out once the token has fired.
        let mut out = [0u8; 8];
        assert_eq!(reader.read(&mut out).unwrap(), 0);
        assert!(reader.cache.is_empty());
    }

    #[test]
    fn new_reader_starts_empty_at_position_zero() {
        let reader = HttpReader::new(
            "http://example/track.flac".to_string(),
            HttpReaderConfig::default(),
            CancelToken::new(),
        );
        assert_eq!(reader.pos, 0);
        assert!(reader.total.is_none());
        assert!(reader.cache_window().is_none());
    }

    #[test]
    fn cache_window_tracks_the_position() {
        let mut reader = HttpReader::new(
            "http://example/track.flac".to_string(),
            HttpReaderConfig::default(),
            CancelToken::new(),
        );
        reader.cache = vec![0u8; 10];
        reader.cache_start = 100;

        reader.pos = 104;
        assert_eq!(reader.cache_window(), Some((4, 6)));

        reader.pos = 99;
        assert_eq!(reader.cache_window(), None);
        reader.pos = 110;
        assert_eq!(reader.cache_window(), None);
    }

    #[test]
    fn content_range_total_reads_total() {
        assert_eq!(content_range_total("bytes 0-99/12345"), Some(12345));
    }

    #[test]
    fn content_range_total_rejects_invalid() {
        assert_eq!(content_range_total("bytes 0-99/*"), None);
        assert_eq!(content_range_total("invalid"), None);
    }

    #[test]
    fn offset_by_saturates_both_ways() {
        assert_eq!(offset_by(10, 5), 15);
        assert_eq!(offset_by(10, -3), 7);
        assert_eq!(offset_by(5, -10), 0);
        assert_eq!(offset_by(u64::MAX, 10), u64::MAX);
    }
}
