//! SAUCE metadata records.
//!
//! SAUCE (Standard Architecture for Universal Comment Extensions) is a
//! 128-byte record appended to the end of art files, optionally preceded by
//! a `COMNT` block of 64-byte comment lines. The render pipeline only needs
//! to strip the record; the full parse is kept for tooling and tests.
//!
//! Record layout (128 bytes):
//! id "SAUCE" (5), version "00" (2), title (35), author (20), group (20),
//! date YYYYMMDD (8), file size (4, LE), data type (1), file type (1),
//! TInfo1..4 (4 x LE u16), comment count (1), flags (1), filler (22).

use thiserror::Error;

const SAUCE_ID: &[u8; 5] = b"SAUCE";
const COMNT_ID: &[u8; 5] = b"COMNT";
const RECORD_LEN: usize = 128;
const COMMENT_LINE_LEN: usize = 64;

/// Offset of the comment-count byte within the record.
const COMMENTS_OFFSET: usize = 104;

#[derive(Debug, Error)]
pub enum SauceError {
    /// The buffer carries no SAUCE record.
    #[error("no SAUCE record found")]
    NoRecord,
}

/// A parsed SAUCE record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sauce {
    pub title: String,
    pub author: String,
    pub group: String,
    pub date: String,
    pub data_type: u8,
    pub file_type: u8,
    pub tinfo: [u16; 4],
    pub comments: Vec<String>,
    pub flags: u8,
}

/// Remove the SAUCE record (and comment block) from `data`, if present.
///
/// A single `0x1A` DOS EOF byte immediately preceding the removed region is
/// stripped as well. Returns the input unchanged when no record is found,
/// and an empty slice when the record claims more bytes than exist.
pub fn strip(data: &[u8]) -> &[u8] {
    if data.len() < RECORD_LEN {
        return data;
    }

    let rec_start = data.len() - RECORD_LEN;
    if &data[rec_start..rec_start + SAUCE_ID.len()] != SAUCE_ID {
        return data;
    }

    let comment_count = data[rec_start + COMMENTS_OFFSET] as usize;

    let mut trim_len = RECORD_LEN;
    if comment_count > 0 {
        trim_len += COMNT_ID.len() + COMMENT_LINE_LEN * comment_count;
    }

    if trim_len > data.len() {
        return &[];
    }

    let mut content_end = data.len() - trim_len;
    if content_end > 0 && data[content_end - 1] == 0x1A {
        content_end -= 1;
    }

    &data[..content_end]
}

/// Parse the SAUCE record trailing `data`.
pub fn parse(data: &[u8]) -> Result<Sauce, SauceError> {
    if data.len() < RECORD_LEN {
        return Err(SauceError::NoRecord);
    }

    let rec_start = data.len() - RECORD_LEN;
    let rec = &data[rec_start..];
    if &rec[..SAUCE_ID.len()] != SAUCE_ID {
        return Err(SauceError::NoRecord);
    }

    let field = |start: usize, len: usize| trim_padding(&rec[start..start + len]);

    // Fixed ASCII fields follow the 7-byte id+version header.
    let mut sauce = Sauce {
        title: field(7, 35),
        author: field(42, 20),
        group: field(62, 20),
        date: field(82, 8),
        // 4-byte file size at 90 is skipped.
        data_type: rec[94],
        file_type: rec[95],
        tinfo: [
            u16::from_le_bytes([rec[96], rec[97]]),
            u16::from_le_bytes([rec[98], rec[99]]),
            u16::from_le_bytes([rec[100], rec[101]]),
            u16::from_le_bytes([rec[102], rec[103]]),
        ],
        comments: Vec::new(),
        flags: rec[105],
    };

    let comment_count = rec[COMMENTS_OFFSET] as usize;
    if comment_count > 0 {
        let block_len = COMNT_ID.len() + COMMENT_LINE_LEN * comment_count;
        if rec_start >= block_len {
            let block_start = rec_start - block_len;
            if &data[block_start..block_start + COMNT_ID.len()] == COMNT_ID {
                let lines = &data[block_start + COMNT_ID.len()..rec_start];
                sauce.comments = lines
                    .chunks(COMMENT_LINE_LEN)
                    .map(trim_padding)
                    .collect();
            }
        }
    }

    Ok(sauce)
}

fn trim_padding(raw: &[u8]) -> String {
    let end = raw
        .iter()
        .rposition(|&b| b != 0x00 && b != b' ')
        .map_or(0, |p| p + 1);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
