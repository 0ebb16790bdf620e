//! Line codec for engine streams.
//!
//! The engine speaks plain text: one decimal column per line on stdin and
//! free-form log lines (some of them `AI move: <n>`) on stdout. Reads can
//! split a line anywhere, so the decoder buffers until `\n` and only then
//! yields the line.
//!
//! Unlike [`tokio_util::codec::LinesCodec`] the decoder never fails on engine
//! output: invalid UTF-8 is replaced lossily and over-long lines are
//! discarded up to the next newline. A single garbled log line must not
//! end the session.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::engine::Column;
use crate::{AppError, Result};

/// Maximum accepted stdout line length: 64 KiB.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Newline-delimited codec for engine stdout (decode) and stdin (encode).
#[derive(Debug, Default)]
pub struct EngineLineCodec {
    /// Offset up to which the buffer is known to contain no `\n`.
    next_index: usize,
    /// Set while skipping the tail of an over-long line.
    discarding: bool,
}

impl EngineLineCodec {
    /// Create a codec with empty framing state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for EngineLineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| offset + self.next_index);

            match (self.discarding, newline) {
                (true, Some(end)) => {
                    src.advance(end + 1);
                    self.next_index = 0;
                    self.discarding = false;
                }
                (true, None) => {
                    src.advance(src.len());
                    self.next_index = 0;
                    return Ok(None);
                }
                (false, Some(end)) => {
                    let line = src.split_to(end + 1);
                    self.next_index = 0;
                    return Ok(Some(to_text(&line[..end])));
                }
                (false, None) if src.len() > MAX_LINE_BYTES => {
                    warn!(
                        buffered = src.len(),
                        "engine line exceeded {MAX_LINE_BYTES} bytes, discarding"
                    );
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        self.next_index = 0;
        if self.discarding || src.is_empty() {
            self.discarding = false;
            src.clear();
            return Ok(None);
        }

        let rest = src.split_to(src.len());
        Ok(Some(to_text(&rest)))
    }
}

impl Encoder<Column> for EngineLineCodec {
    type Error = AppError;

    /// Encode a column as its decimal text followed by `\n`.
    fn encode(&mut self, column: Column, dst: &mut BytesMut) -> Result<()> {
        let text = column.to_string();
        dst.reserve(text.len() + 1);
        dst.put_slice(text.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

fn to_text(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
