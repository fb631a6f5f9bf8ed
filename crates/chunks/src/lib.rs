//! Deterministic slicing of a completed result into a checksum-chained
//! sequence of chunks. Chunks are never stored: every page is derived on
//! read from the persisted result bytes, so any client may resume at any
//! cursor and still observe the same chain.

use sha2::{Digest, Sha256};

/// Size of one chunk, in bytes. Chunk `i` covers bytes
/// `[i * CHUNK_BYTES, min((i + 1) * CHUNK_BYTES, total))`.
pub const CHUNK_BYTES: usize = 64 * 1024;

/// `sha256:<hex>` of the given bytes.
pub fn checksum(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("sha256:{}", hex::encode(digest))
}

/// Number of chunks for a result of `total` bytes. An empty result is
/// still one (empty) chunk, so every completed instance has a first page.
pub fn total_chunks(total: usize) -> usize {
    std::cmp::max(1, total.div_ceil(CHUNK_BYTES))
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CursorError {
    #[error("cursor {0:?} is not a non-negative integer")]
    Malformed(String),
    #[error("cursor {index} is out of range [0, {total_chunks})")]
    OutOfRange { index: usize, total_chunks: usize },
}

/// Parse a request cursor against the chunk count of the result being read.
/// An absent cursor reads from the first chunk.
pub fn parse_cursor(raw: Option<&str>, total_chunks: usize) -> Result<usize, CursorError> {
    let index = match raw {
        None | Some("") => 0,
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| CursorError::Malformed(raw.to_string()))?,
    };
    if index >= total_chunks {
        return Err(CursorError::OutOfRange {
            index,
            total_chunks,
        });
    }
    Ok(index)
}

/// One derived chunk of a result.
#[derive(Debug, PartialEq)]
pub struct Chunk<'a> {
    pub index: usize,
    pub offset: usize,
    pub length: usize,
    pub data: &'a [u8],
    pub checksum: String,
    /// Checksum of the prior chunk's bytes; `None` on the first chunk.
    pub checksum_previous: Option<String>,
    /// Byte count of the full result, not of this chunk.
    pub total: usize,
    pub is_last: bool,
}

impl Chunk<'_> {
    /// Index of the next chunk as a decimal string, or `None` on the last.
    pub fn cursor(&self) -> Option<String> {
        if self.is_last {
            None
        } else {
            Some((self.index + 1).to_string())
        }
    }
}

/// Derive chunk `index` of `data`. The caller must have validated `index`
/// with [`parse_cursor`]; out-of-range indices return `None`.
pub fn slice(data: &[u8], index: usize) -> Option<Chunk<'_>> {
    let chunks = total_chunks(data.len());
    if index >= chunks {
        return None;
    }
    let offset = index * CHUNK_BYTES;
    let end = std::cmp::min(offset + CHUNK_BYTES, data.len());
    let bytes = &data[offset..end];

    let checksum_previous = index
        .checked_sub(1)
        .map(|prior| checksum(&data[prior * CHUNK_BYTES..offset]));

    Some(Chunk {
        index,
        offset,
        length: bytes.len(),
        data: bytes,
        checksum: checksum(bytes),
        checksum_previous,
        total: data.len(),
        is_last: index == chunks - 1,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn three_chunk_chain_over_150_kib() {
        let data: Vec<u8> = (0..150 * 1024).map(|i| (i % 251) as u8).collect();
        assert_eq!(total_chunks(data.len()), 3);

        let c0 = slice(&data, 0).unwrap();
        let c1 = slice(&data, 1).unwrap();
        let c2 = slice(&data, 2).unwrap();

        assert_eq!((c0.offset, c0.length), (0, 65536));
        assert_eq!((c1.offset, c1.length), (65536, 65536));
        assert_eq!((c2.offset, c2.length), (131072, 22528));

        assert_eq!(c0.checksum_previous, None);
        assert_eq!(c1.checksum_previous.as_ref(), Some(&c0.checksum));
        assert_eq!(c2.checksum_previous.as_ref(), Some(&c1.checksum));

        assert_eq!(c0.cursor().as_deref(), Some("1"));
        assert_eq!(c1.cursor().as_deref(), Some("2"));
        assert_eq!(c2.cursor(), None);
        assert!(!c0.is_last && !c1.is_last && c2.is_last);
    }

    #[test]
    fn checksum_is_sha256_of_the_raw_slice() {
        let data = b"hello, chunked world".to_vec();
        let chunk = slice(&data, 0).unwrap();
        // Independently computed: sha2 over the same bytes.
        let expected = format!("sha256:{}", hex::encode(sha2::Sha256::digest(&data)));
        assert_eq!(chunk.checksum, expected);
        assert!(chunk.checksum.starts_with("sha256:"));
        assert_eq!(chunk.checksum.len(), "sha256:".len() + 64);
    }

    #[test]
    fn single_byte_result_is_one_final_chunk() {
        let chunk = slice(b"x", 0).unwrap();
        assert_eq!(chunk.length, 1);
        assert_eq!(chunk.total, 1);
        assert!(chunk.is_last);
        assert_eq!(chunk.cursor(), None);
        assert_eq!(total_chunks(1), 1);
    }

    #[test]
    fn empty_result_still_has_a_first_chunk() {
        assert_eq!(total_chunks(0), 1);
        let chunk = slice(b"", 0).unwrap();
        assert_eq!(chunk.length, 0);
        assert!(chunk.is_last);
    }

    #[test]
    fn exact_multiple_of_chunk_size_has_no_empty_tail() {
        let data = vec![7u8; 2 * CHUNK_BYTES];
        assert_eq!(total_chunks(data.len()), 2);
        let last = slice(&data, 1).unwrap();
        assert_eq!(last.length, CHUNK_BYTES);
        assert!(last.is_last);
        assert!(slice(&data, 2).is_none());
    }

    #[test]
    fn cursor_parsing() {
        assert_eq!(parse_cursor(None, 3), Ok(0));
        assert_eq!(parse_cursor(Some(""), 3), Ok(0));
        assert_eq!(parse_cursor(Some("2"), 3), Ok(2));
        assert_eq!(
            parse_cursor(Some("3"), 3),
            Err(CursorError::OutOfRange {
                index: 3,
                total_chunks: 3
            }),
        );
        assert_eq!(
            parse_cursor(Some("-1"), 3),
            Err(CursorError::Malformed("-1".to_string())),
        );
        assert_eq!(
            parse_cursor(Some("two"), 3),
            Err(CursorError::Malformed("two".to_string())),
        );
    }

    #[test]
    fn chunks_depend_only_on_position_and_bytes() {
        let data: Vec<u8> = (0..200_000).map(|i| (i % 256) as u8).collect();
        // Reading the same cursor twice yields an identical chunk.
        assert_eq!(slice(&data, 1), slice(&data, 1));
    }
}
