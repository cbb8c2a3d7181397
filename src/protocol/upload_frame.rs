//! Binary multi-file upload frame.
//!
//! Layout:
//!
//! ```text
//! +------+---------------------------+------------+-----------------------------+
//! | 0x21 | UTF-8 JSON header         | "\r\n\r\n" | file 0 bytes | file 1 | ...  |
//! +------+---------------------------+------------+-----------------------------+
//! ```
//!
//! The header lists `{name, size}` per file in call order; the payload region
//! is the files' bytes concatenated in that same order, so `size` doubles as
//! the offset table. Compact JSON never contains a raw CR/LF, so the first
//! separator after the marker always ends the header.

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, Result};

/// Leading byte of every upload frame (`!`).
pub const UPLOAD_MARKER: u8 = 0x21;

/// Separator between header and payload.
pub const HEADER_SEPARATOR: &[u8; 4] = b"\r\n\r\n";

/// Task name carried in the header.
pub const UPLOAD_TASK: &str = "upload_files";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadHeader {
    pub module: String,
    pub task: String,
    pub partition_id: u64,
    pub files: Vec<FileMeta>,
}

impl UploadHeader {
    pub fn new(module: impl Into<String>, partition_id: u64, files: Vec<FileMeta>) -> Self {
        Self {
            module: module.into(),
            task: UPLOAD_TASK.to_owned(),
            partition_id,
            files,
        }
    }

    fn payload_len(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Build the frame. `payloads[i]` must be exactly `header.files[i].size` bytes.
pub fn encode_upload_frame(header: &UploadHeader, payloads: &[&[u8]]) -> Result<Vec<u8>> {
    if payloads.len() != header.files.len() {
        return Err(FeedError::protocol(
            UPLOAD_TASK,
            format!(
                "{} payloads for {} files",
                payloads.len(),
                header.files.len()
            ),
        ));
    }
    for (meta, bytes) in header.files.iter().zip(payloads) {
        if bytes.len() as u64 != meta.size {
            return Err(FeedError::UploadSizeMismatch {
                name: meta.name.clone(),
                expected: meta.size,
                actual: bytes.len() as u64,
            });
        }
    }

    let json = serde_json::to_vec(header)?;
    let mut frame =
        Vec::with_capacity(1 + json.len() + HEADER_SEPARATOR.len() + header.payload_len() as usize);
    frame.push(UPLOAD_MARKER);
    frame.extend_from_slice(&json);
    frame.extend_from_slice(HEADER_SEPARATOR);
    for bytes in payloads {
        frame.extend_from_slice(bytes);
    }
    Ok(frame)
}

/// A parsed upload frame, as the receiving side sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFrame {
    pub header: UploadHeader,
    pub payload: Vec<u8>,
}

impl UploadFrame {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let rest = match bytes.split_first() {
            Some((&UPLOAD_MARKER, rest)) => rest,
            _ => return Err(FeedError::protocol(UPLOAD_TASK, "missing upload marker")),
        };
        let split = rest
            .windows(HEADER_SEPARATOR.len())
            .position(|w| w == HEADER_SEPARATOR)
            .ok_or_else(|| FeedError::protocol(UPLOAD_TASK, "missing header separator"))?;
        let header: UploadHeader = serde_json::from_slice(&rest[..split])?;
        let payload = rest[split + HEADER_SEPARATOR.len()..].to_vec();
        if payload.len() as u64 != header.payload_len() {
            return Err(FeedError::protocol(
                UPLOAD_TASK,
                format!(
                    "payload is {} bytes, header declares {}",
                    payload.len(),
                    header.payload_len()
                ),
            ));
        }
        Ok(Self { header, payload })
    }

    /// The bytes of the `index`-th file, sliced using the header sizes.
    pub fn file(&self, index: usize) -> Option<&[u8]> {
        let meta = self.header.files.get(index)?;
        let start: u64 = self.header.files[..index].iter().map(|f| f.size).sum();
        let start = start as usize;
        self.payload.get(start..start + meta.size as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, size: u64) -> FileMeta {
        FileMeta {
            name: name.into(),
            size,
        }
    }

    #[test]
    fn test_frame_starts_with_marker_and_header() {
        let header = UploadHeader::new("app.messages", 12, vec![meta("a.png", 3)]);
        let frame = encode_upload_frame(&header, &[b"abc".as_slice()]).unwrap();
        assert_eq!(frame[0], b'!');
        let text = String::from_utf8_lossy(&frame[1..]);
        assert!(text.starts_with("{\"module\":\"app.messages\",\"task\":\"upload_files\",\"partition_id\":12"));
        assert!(frame.ends_with(b"\r\n\r\nabc"));
    }

    #[test]
    fn test_parse_slices_files_by_size() {
        let header = UploadHeader::new("app.messages", 1, vec![meta("a", 10), meta("b", 5)]);
        let frame = encode_upload_frame(&header, &[b"aaaaaaaaaa".as_slice(), b"bbbbb".as_slice()]).unwrap();
        let parsed = UploadFrame::parse(&frame).unwrap();
        assert_eq!(parsed.header, header);
        assert_eq!(parsed.file(0), Some(&b"aaaaaaaaaa"[..]));
        assert_eq!(parsed.file(1), Some(&b"bbbbb"[..]));
        assert_eq!(parsed.file(2), None);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let header = UploadHeader::new("app.messages", 1, vec![meta("a", 4)]);
        let err = encode_upload_frame(&header, &[b"abc".as_slice()]).unwrap_err();
        assert!(matches!(err, FeedError::UploadSizeMismatch { expected: 4, actual: 3, .. }));
    }

    #[test]
    fn test_payload_count_mismatch_is_rejected() {
        let header = UploadHeader::new("app.messages", 1, vec![meta("a", 1), meta("b", 1)]);
        assert!(encode_upload_frame(&header, &[b"a".as_slice()]).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_marker() {
        assert!(UploadFrame::parse(b"{}\r\n\r\n").is_err());
        assert!(UploadFrame::parse(b"").is_err());
    }

    #[test]
    fn test_payload_may_contain_separator_bytes() {
        let header = UploadHeader::new("app.messages", 3, vec![meta("crlf.bin", 4)]);
        let frame = encode_upload_frame(&header, &[b"\r\n\r\n".as_slice()]).unwrap();
        let parsed = UploadFrame::parse(&frame).unwrap();
        assert_eq!(parsed.file(0), Some(&b"\r\n\r\n"[..]));
    }
}
