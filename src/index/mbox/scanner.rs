//! Streaming mbox scanner.
//!
//! Reads the file line by line through a large buffer and reports the
//! boundaries and header block of every message. Never loads the whole file.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, TagviewError};

/// Read buffer size (1 MB).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Progress is reported every 4 MB.
const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

/// Messages larger than this are refused by [`read_message_at`].
pub const MAX_MESSAGE_SIZE: u64 = 256 * 1024 * 1024;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Sequential scanner over one mbox file.
///
/// Tolerates mixed `\n` / `\r\n` line endings, a UTF-8 BOM, a truncated
/// last message and binary content in bodies. A `From ` line only starts a
/// new message at the top of the file or after a blank line.
pub struct MboxScanner {
    path: PathBuf,
    file_size: u64,
}

impl MboxScanner {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TagviewError::IndexUnavailable(format!("mbox not found: {}", path.display()))
            } else {
                TagviewError::io(&path, e)
            }
        })?;
        Ok(Self {
            path,
            file_size: metadata.len(),
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Scan the file, calling `on_message(offset, length, header_bytes)` for
    /// every message. `length` covers the `From ` line, headers and body.
    /// Returning `false` from the callback stops the scan.
    ///
    /// Returns the number of messages reported.
    pub fn scan_headers(
        &self,
        on_message: &mut dyn FnMut(u64, u64, &[u8]) -> bool,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| TagviewError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut offset: u64 = 0;
        let mut last_progress: u64 = 0;
        let mut message_start: Option<u64> = None;
        let mut header_buf: Vec<u8> = Vec::with_capacity(16 * 1024);
        let mut in_headers = false;
        let mut prev_blank = true;
        let mut line: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line.clear();
            let line_len = {
                let buf = reader
                    .fill_buf()
                    .map_err(|e| TagviewError::io(&self.path, e))?;
                if buf.is_empty() {
                    break;
                }
                let take = buf
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(buf.len(), |pos| pos + 1);
                line.extend_from_slice(&buf[..take]);
                reader.consume(take);
                take as u64
            };

            if is_mbox_separator(&line) {
                if prev_blank {
                    if let Some(start) = message_start {
                        if !on_message(start, offset - start, &header_buf) {
                            return Ok(count);
                        }
                        count += 1;
                    }
                    message_start = Some(offset);
                    header_buf.clear();
                    in_headers = true;
                } else {
                    warn!(offset, "Ignoring 'From ' line without preceding blank line");
                }
            } else if in_headers {
                if is_blank_line(&line) {
                    in_headers = false;
                } else {
                    header_buf.extend_from_slice(&line);
                }
            }

            prev_blank = is_blank_line(&line);
            offset += line_len;

            if let Some(cb) = progress {
                if offset - last_progress >= PROGRESS_INTERVAL {
                    cb(offset, self.file_size);
                    last_progress = offset;
                }
            }
        }

        if let Some(start) = message_start {
            if on_message(start, offset - start, &header_buf) {
                count += 1;
            }
        }

        if let Some(cb) = progress {
            cb(self.file_size, self.file_size);
        }

        Ok(count)
    }
}

/// Read one message by offset and length, with its `From ` line removed.
pub fn read_message_at(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
    if length > MAX_MESSAGE_SIZE {
        return Err(TagviewError::InvalidIndex {
            path: path.to_path_buf(),
            reason: format!("message at offset {offset} is {length} bytes"),
        });
    }
    let mut file = File::open(path).map_err(|e| TagviewError::io(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| TagviewError::io(path, e))?;
    let mut buffer = vec![0u8; length as usize];
    file.read_exact(&mut buffer)
        .map_err(|e| TagviewError::io(path, e))?;

    let skip = skip_from_line(&buffer);
    buffer.drain(..skip);
    Ok(buffer)
}

/// Length of the leading BOM and `From ` line, if present.
fn skip_from_line(data: &[u8]) -> usize {
    let bom = if data.starts_with(UTF8_BOM) {
        UTF8_BOM.len()
    } else {
        0
    };
    if !data[bom..].starts_with(b"From ") {
        return bom;
    }
    data[bom..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(data.len(), |pos| bom + pos + 1)
}

fn is_mbox_separator(line: &[u8]) -> bool {
    line.strip_prefix(UTF8_BOM)
        .unwrap_or(line)
        .starts_with(b"From ")
}

fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
