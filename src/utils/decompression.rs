//! Compression detection and streaming decoders for guide downloads
//!
//! Formats are detected by magic bytes with `infer`. Only gzip can be decoded
//! (behind the `compression-gzip` feature); anything else is reported so the
//! caller can fail the fetch instead of feeding binary data to the XML reader.

use std::io::{BufRead, Cursor, Read};

use tracing::debug;

use crate::errors::EpgError;
use crate::utils::url::UrlUtils;

/// Number of leading bytes inspected for magic numbers
const SNIFF_LEN: usize = 16;

/// Supported compression formats detected by magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Bzip2,
    Xz,
    Zip,
    Zstd,
    Lz4,
    Uncompressed,
}

impl CompressionFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Zip => "zip",
            Self::Zstd => "zstd",
            Self::Lz4 => "lz4",
            Self::Uncompressed => "none",
        }
    }
}

/// Magic file detection and decoder selection
pub struct DecompressionService;

impl DecompressionService {
    /// Detect compression format using magic bytes
    pub fn detect_compression_format(data: &[u8]) -> CompressionFormat {
        // infer has no LZ4 matcher
        if data.len() >= 4 && data[0..4] == [0x04, 0x22, 0x4D, 0x18] {
            return CompressionFormat::Lz4;
        }

        match infer::get(data).map(|kind| kind.mime_type()) {
            Some("application/gzip") => CompressionFormat::Gzip,
            Some("application/x-bzip2") => CompressionFormat::Bzip2,
            Some("application/x-xz") => CompressionFormat::Xz,
            Some("application/zip") => CompressionFormat::Zip,
            Some("application/zstd") => CompressionFormat::Zstd,
            _ => CompressionFormat::Uncompressed,
        }
    }

    /// Whether the request or response declares a gzip body
    ///
    /// True for a `.gz` path, a `gz=1` query parameter or a
    /// `Content-Encoding: gzip` header.
    pub fn declares_gzip(url: &str, content_encoding: Option<&str>) -> bool {
        let path = UrlUtils::strip_query_and_fragment(url).to_ascii_lowercase();
        if path.ends_with(".gz") {
            return true;
        }

        if let Some((_, query)) = url.split_once('?') {
            let query = query.split('#').next().unwrap_or_default();
            if query
                .split('&')
                .any(|pair| pair.eq_ignore_ascii_case("gz=1"))
            {
                return true;
            }
        }

        content_encoding
            .map(|encoding| {
                encoding
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("gzip"))
            })
            .unwrap_or(false)
    }

    /// Wrap a body reader in the decoder its leading bytes call for
    ///
    /// The sniffed prefix is replayed in front of the remaining stream, so
    /// nothing is buffered beyond [`SNIFF_LEN`] bytes. When gzip was declared
    /// but the magic is absent the body is read as plain XML.
    pub fn open_reader<R>(mut reader: R, declared_gzip: bool) -> Result<Box<dyn Read + Send>, EpgError>
    where
        R: BufRead + Send + 'static,
    {
        let mut prefix = Vec::with_capacity(SNIFF_LEN);
        (&mut reader)
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut prefix)
            .map_err(|e| crate::utils::xmltv_parser::epg_error_from_io(&e))?;

        let format = Self::detect_compression_format(&prefix);
        if declared_gzip && format != CompressionFormat::Gzip {
            debug!(
                "Guide declared gzip but magic bytes say {}, reading as-is",
                format.as_str()
            );
        }

        let replayed = Cursor::new(prefix).chain(reader);

        match format {
            CompressionFormat::Uncompressed => Ok(Box::new(replayed)),
            CompressionFormat::Gzip => Self::gzip_reader(replayed),
            other => Err(EpgError::UnsupportedCompression {
                format: other.as_str().to_string(),
            }),
        }
    }

    #[cfg(feature = "compression-gzip")]
    fn gzip_reader<R: Read + Send + 'static>(reader: R) -> Result<Box<dyn Read + Send>, EpgError> {
        debug!("Decoding gzip guide stream");
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    #[cfg(not(feature = "compression-gzip"))]
    fn gzip_reader<R: Read + Send + 'static>(_reader: R) -> Result<Box<dyn Read + Send>, EpgError> {
        Err(EpgError::UnsupportedCompression {
            format: CompressionFormat::Gzip.as_str().to_string(),
        })
    }
}
