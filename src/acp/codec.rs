//! NDJSON line codec for JSON-RPC streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so an
//! unterminated or oversized message from the client or the engine cannot
//! exhaust memory. The same codec frames both directions of both peers.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Default maximum accepted line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited JSON codec.
///
/// Inbound lines longer than the limit return
/// [`AppError::Acp`]`("line too long: …")` instead of allocating; the
/// decoder discards the rest of that line and resumes at the next newline.
/// I/O errors map to [`AppError::Io`].
#[derive(Debug)]
pub struct AcpCodec {
    inner: LinesCodec,
    max_length: usize,
}

impl AcpCodec {
    /// Codec with the [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
            max_length,
        }
    }

    /// Configured line limit.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn map_error(&self, err: LinesCodecError) -> AppError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => AppError::Acp(format!(
                "line too long: exceeded {} bytes",
                self.max_length
            )),
            LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
        }
    }
}

impl Default for AcpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AcpCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode(src).map_err(|err| self.map_error(err))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode_eof(src).map_err(|err| self.map_error(err))
    }
}

impl Encoder<String> for AcpCodec {
    type Error = AppError;

    /// Encode `item` as one `\n`-terminated line. The length limit only
    /// applies when decoding.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.inner.encode(item, dst).map_err(|err| self.map_error(err))
    }
}
