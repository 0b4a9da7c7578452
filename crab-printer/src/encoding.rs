//! Text encoding for receipt printers
//!
//! ESC/POS printers do not understand UTF-8 unless told so. This module:
//! - Measures how many printer columns a string occupies
//! - Truncates/pads strings to a column width
//! - Converts a finished UTF-8 buffer (with ESC/POS commands) to the printer's code page

use std::fmt;
use std::str::FromStr;

use tracing::instrument;

/// ESC @ (initialize printer)
const INIT: [u8; 2] = [0x1B, 0x40];
/// FS & - Enable Chinese (double-byte) mode
const GBK_ENTER: [u8; 2] = [0x1C, 0x26];
/// FS C 1 - Select GBK code page
const GBK_SELECT: [u8; 3] = [0x1C, 0x43, 0x01];
/// FS . - Exit Chinese mode
const GBK_EXIT: [u8; 2] = [0x1C, 0x2E];
/// ESC t 16 - Select WPC1252 code page
const LATIN1_SELECT: [u8; 3] = [0x1B, 0x74, 16];

/// Code page used for text sent to the printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// Raw UTF-8 (printers with UTF-8 firmware)
    #[default]
    Utf8,
    /// GBK double-byte mode (Chinese printers)
    Gbk,
    /// Windows-1252 (western European receipts)
    Latin1,
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "gbk" => Ok(TextEncoding::Gbk),
            "latin1" | "cp1252" | "windows-1252" => Ok(TextEncoding::Latin1),
            other => Err(format!("Unknown printer encoding: {}", other)),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => write!(f, "utf8"),
            TextEncoding::Gbk => write!(f, "gbk"),
            TextEncoding::Latin1 => write!(f, "latin1"),
        }
    }
}

/// Number of printer columns a single character occupies
fn char_width(c: char, encoding: TextEncoding) -> usize {
    match encoding {
        // GBK: Chinese characters are 2 bytes / 2 columns
        TextEncoding::Gbk => {
            let mut tmp = [0u8; 4];
            let (cow, _, _) = encoding_rs::GBK.encode(c.encode_utf8(&mut tmp));
            cow.len().min(2)
        }
        TextEncoding::Utf8 | TextEncoding::Latin1 => 1,
    }
}

/// Get the printed width of a string
pub fn text_width(s: &str, encoding: TextEncoding) -> usize {
    s.chars().map(|c| char_width(c, encoding)).sum()
}

/// Truncate a string to fit within a printed width
pub fn truncate_to_width(s: &str, max_width: usize, encoding: TextEncoding) -> String {
    let mut width = 0;
    let mut result = String::new();
    for c in s.chars() {
        let w = char_width(c, encoding);
        if width + w > max_width {
            break;
        }
        result.push(c);
        width += w;
    }
    result
}

/// Pad a string to a specific printed width
///
/// If the string is longer than the width, it will be truncated.
pub fn pad_to_width(s: &str, width: usize, align_right: bool, encoding: TextEncoding) -> String {
    let current = text_width(s, encoding);
    if current >= width {
        return truncate_to_width(s, width, encoding);
    }
    let spaces = " ".repeat(width - current);
    if align_right {
        format!("{}{}", spaces, s)
    } else {
        format!("{}{}", s, spaces)
    }
}

/// Convert a UTF-8 buffer (text mixed with ESC/POS commands) to the target code page
///
/// ASCII bytes (0x00-0x7F) are copied as is so commands survive untouched.
/// Runs of non-ASCII bytes are decoded as UTF-8 and transcoded. The code page
/// selection is re-issued after every INIT (ESC @), which resets the printer.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn encode_payload(bytes: &[u8], encoding: TextEncoding) -> Vec<u8> {
    if encoding == TextEncoding::Utf8 {
        return bytes.to_vec();
    }

    let mut result = Vec::with_capacity(bytes.len() * 2);
    push_prologue(&mut result, encoding, true);

    let mut pending = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];

        if b == INIT[0] && bytes.get(i + 1) == Some(&INIT[1]) {
            flush_pending(&mut pending, &mut result, encoding);
            result.extend_from_slice(&INIT);
            push_prologue(&mut result, encoding, false);
            i += 2;
            continue;
        }

        if b < 0x80 {
            flush_pending(&mut pending, &mut result, encoding);
            result.push(b);
        } else {
            pending.push(b);
        }
        i += 1;
    }
    flush_pending(&mut pending, &mut result, encoding);

    if encoding == TextEncoding::Gbk {
        result.extend_from_slice(&GBK_EXIT);
    }
    result
}

fn push_prologue(out: &mut Vec<u8>, encoding: TextEncoding, first: bool) {
    match encoding {
        TextEncoding::Gbk if first => {
            out.extend_from_slice(&GBK_ENTER);
            out.extend_from_slice(&GBK_SELECT);
        }
        TextEncoding::Gbk => out.extend_from_slice(&GBK_ENTER),
        TextEncoding::Latin1 => out.extend_from_slice(&LATIN1_SELECT),
        TextEncoding::Utf8 => {}
    }
}

/// Transcode the pending non-ASCII run; unmappable characters become '?'
fn flush_pending(pending: &mut Vec<u8>, out: &mut Vec<u8>, encoding: TextEncoding) {
    if pending.is_empty() {
        return;
    }

    let text = String::from_utf8_lossy(pending);
    let target = match encoding {
        TextEncoding::Gbk => encoding_rs::GBK,
        TextEncoding::Latin1 => encoding_rs::WINDOWS_1252,
        TextEncoding::Utf8 => {
            out.extend_from_slice(pending);
            pending.clear();
            return;
        }
    };

    let mut tmp = [0u8; 4];
    for c in text.chars() {
        let (cow, _, had_errors) = target.encode(c.encode_utf8(&mut tmp));
        if had_errors {
            out.push(b'?');
        } else {
            out.extend_from_slice(&cow);
        }
    }
    pending.clear();
}
