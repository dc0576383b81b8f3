//! UTF-8 character and line navigation over stored text.
//!
//! Positions are byte offsets. A position is a valid character position when
//! it sits at the end of the text or on a byte that is not a UTF-8
//! continuation byte. Malformed sequences count one character per byte.

use rvt_types::NodeRef;

use crate::error::{StoreError, StoreResult};
use crate::store::NodeStore;

/// Bytes read per step when scanning for line breaks.
const SCAN_WINDOW: usize = 256;

fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Encoded length implied by a UTF-8 lead byte.
fn lead_len(b: u8) -> usize {
    match b {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

impl NodeStore {
    fn byte_at(&self, head: NodeRef, pos: usize) -> StoreResult<u8> {
        let bytes = self.text_part(head, pos, pos + 1)?;
        Ok(bytes[0])
    }

    /// Byte length of the character starting at `pos`.
    pub fn char_len(&self, head: NodeRef, pos: usize) -> StoreResult<usize> {
        let len = self.length(head)?;
        if pos >= len {
            return Err(StoreError::OutOfRange { pos, len });
        }
        let want = lead_len(self.byte_at(head, pos)?);
        if want == 1 {
            return Ok(1);
        }
        let end = (pos + want).min(len);
        let tail = self.text_part(head, pos + 1, end)?;
        Ok(1 + tail.iter().take_while(|b| is_continuation(**b)).count())
    }

    /// Returns `true` if `pos` starts a character or is the end of the text.
    pub fn valid_char_pos(&self, head: NodeRef, pos: usize) -> StoreResult<bool> {
        let len = self.length(head)?;
        if pos > len {
            return Err(StoreError::OutOfRange { pos, len });
        }
        if pos == len {
            return Ok(true);
        }
        Ok(!is_continuation(self.byte_at(head, pos)?))
    }

    /// Position of the character after the one at `pos`.
    pub fn next_char_pos(&self, head: NodeRef, pos: usize) -> StoreResult<usize> {
        Ok(pos + self.char_len(head, pos)?)
    }

    /// Position of the character before `pos`.
    pub fn prev_char_pos(&self, head: NodeRef, pos: usize) -> StoreResult<usize> {
        let len = self.length(head)?;
        if pos == 0 || pos > len {
            return Err(StoreError::OutOfRange { pos, len });
        }
        let from = pos.saturating_sub(4);
        let window = self.text_part(head, from, pos)?;
        let mut back = window.len() - 1;
        while back > 0 && is_continuation(window[back]) {
            back -= 1;
        }
        let candidate = from + back;
        // Only accept the lead byte if its sequence actually reaches `pos`.
        if candidate + lead_len(window[back]) >= pos {
            Ok(candidate)
        } else {
            Ok(pos - 1)
        }
    }

    /// Step `char_offset` characters from `start` (negative steps backward).
    ///
    /// The result is clamped to `[0, len]`: this is the nearest valid
    /// position, never an error.
    pub fn char_pos(&self, head: NodeRef, start: usize, char_offset: isize) -> StoreResult<usize> {
        let len = self.length(head)?;
        let mut pos = start.min(len);
        if char_offset >= 0 {
            for _ in 0..char_offset {
                if pos >= len {
                    break;
                }
                pos = self.next_char_pos(head, pos)?;
            }
        } else {
            for _ in 0..char_offset.unsigned_abs() {
                if pos == 0 {
                    break;
                }
                pos = self.prev_char_pos(head, pos)?;
            }
        }
        Ok(pos)
    }

    /// Number of characters in `[start, end)`.
    pub fn length_in_chars(&self, head: NodeRef, start: usize, end: usize) -> StoreResult<usize> {
        self.check_range(head, start, end)?;
        let mut count = 0;
        // Continuation bytes still owed to the last lead byte.
        let mut owed = 0;
        let mut from = start;
        while from < end {
            let to = (from + SCAN_WINDOW).min(end);
            for &b in &self.text_part(head, from, to)? {
                if owed > 0 && is_continuation(b) {
                    owed -= 1;
                } else {
                    count += 1;
                    owed = lead_len(b) - 1;
                }
            }
            from = to;
        }
        Ok(count)
    }

    /// Start of the line containing `pos`.
    pub fn line_start(&self, head: NodeRef, pos: usize) -> StoreResult<usize> {
        let len = self.length(head)?;
        if pos > len {
            return Err(StoreError::OutOfRange { pos, len });
        }
        let mut end = pos;
        while end > 0 {
            let start = end.saturating_sub(SCAN_WINDOW);
            let window = self.text_part(head, start, end)?;
            if let Some(nl) = window.iter().rposition(|&b| b == b'\n') {
                return Ok(start + nl + 1);
            }
            end = start;
        }
        Ok(0)
    }

    /// End of the line containing `pos`, excluding the line break.
    pub fn line_end(&self, head: NodeRef, pos: usize) -> StoreResult<usize> {
        let len = self.length(head)?;
        if pos > len {
            return Err(StoreError::OutOfRange { pos, len });
        }
        let mut start = pos;
        while start < len {
            let end = (start + SCAN_WINDOW).min(len);
            let window = self.text_part(head, start, end)?;
            if let Some(nl) = window.iter().position(|&b| b == b'\n') {
                return Ok(start + nl);
            }
            start = end;
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvt_types::VersionId;

    fn store_with(text: &str) -> (NodeStore, VersionId, NodeRef) {
        let mut store = NodeStore::new();
        let v = store.open_version();
        let head = store.create_text(v, text.as_bytes()).unwrap();
        (store, v, head)
    }

    // "aé€😀b": 1 + 2 + 3 + 4 + 1 bytes.
    const MIXED: &str = "a\u{e9}\u{20ac}\u{1f600}b";

    // -----------------------------------------------------------------------
    // Character stepping
    // -----------------------------------------------------------------------

    #[test]
    fn char_lengths() {
        let (store, _, head) = store_with(MIXED);
        assert_eq!(store.char_len(head, 0).unwrap(), 1);
        assert_eq!(store.char_len(head, 1).unwrap(), 2);
        assert_eq!(store.char_len(head, 3).unwrap(), 3);
        assert_eq!(store.char_len(head, 6).unwrap(), 4);
        assert_eq!(store.char_len(head, 10).unwrap(), 1);
        assert!(store.char_len(head, 11).is_err());
    }

    #[test]
    fn next_and_prev() {
        let (store, _, head) = store_with(MIXED);
        assert_eq!(store.next_char_pos(head, 1).unwrap(), 3);
        assert_eq!(store.prev_char_pos(head, 10).unwrap(), 6);
        assert_eq!(store.prev_char_pos(head, 6).unwrap(), 3);
        assert_eq!(store.prev_char_pos(head, 1).unwrap(), 0);
        assert!(store.prev_char_pos(head, 0).is_err());
    }

    #[test]
    fn valid_positions() {
        let (store, _, head) = store_with(MIXED);
        assert!(store.valid_char_pos(head, 0).unwrap());
        assert!(store.valid_char_pos(head, 3).unwrap());
        assert!(!store.valid_char_pos(head, 4).unwrap());
        assert!(!store.valid_char_pos(head, 7).unwrap());
        assert!(store.valid_char_pos(head, 11).unwrap());
        assert!(store.valid_char_pos(head, 12).is_err());
    }

    #[test]
    fn char_pos_steps_and_clamps() {
        let (store, _, head) = store_with(MIXED);
        assert_eq!(store.char_pos(head, 0, 3).unwrap(), 6);
        assert_eq!(store.char_pos(head, 11, -2).unwrap(), 6);
        assert_eq!(store.char_pos(head, 0, 100).unwrap(), 11);
        assert_eq!(store.char_pos(head, 3, -100).unwrap(), 0);
        assert_eq!(store.char_pos(head, 500, 0).unwrap(), 11);
    }

    #[test]
    fn char_count() {
        let (store, _, head) = store_with(MIXED);
        assert_eq!(store.length_in_chars(head, 0, 11).unwrap(), 5);
        assert_eq!(store.length_in_chars(head, 1, 6).unwrap(), 2);
        assert_eq!(store.length_in_chars(head, 3, 3).unwrap(), 0);
        assert!(store.length_in_chars(head, 0, 12).is_err());
        assert!(store.length_in_chars(head, 6, 3).is_err());
    }

    #[test]
    fn char_count_spans_pieces_and_windows() {
        // The leading byte puts each two-byte character across the scan
        // window boundaries.
        let text = "\u{e9}".repeat(300);
        let (mut store, v, head) = store_with(&text);
        let head2 = store.insert(v, head, 0, b"x").unwrap();
        let len = store.length(head2).unwrap();
        assert_eq!(len, 601);
        assert_eq!(store.length_in_chars(head2, 0, len).unwrap(), 301);
        assert_eq!(store.length_in_chars(head2, 1, 5).unwrap(), 2);
        assert_eq!(store.length_in_chars(head2, 255, 259).unwrap(), 2);
    }

    #[test]
    fn stepping_across_edit_boundaries() {
        let (mut store, v, head) = store_with("\u{20ac}\u{20ac}");
        // Split the tree between the two characters.
        let head2 = store.insert(v, head, 3, b"x").unwrap();
        assert_eq!(store.char_pos(head2, 0, 2).unwrap(), 4);
        assert_eq!(store.prev_char_pos(head2, 7).unwrap(), 4);
    }

    #[test]
    fn malformed_bytes_count_singly() {
        let mut store = NodeStore::new();
        let v = store.open_version();
        let head = store.create_text(v, &[0x80, 0x80, b'a']).unwrap();
        assert_eq!(store.length_in_chars(head, 0, 3).unwrap(), 3);
        assert_eq!(store.prev_char_pos(head, 2).unwrap(), 1);
    }

    // -----------------------------------------------------------------------
    // Lines
    // -----------------------------------------------------------------------

    #[test]
    fn line_bounds() {
        let (store, _, head) = store_with("one\ntwo\n\nfour");
        assert_eq!(store.line_start(head, 5).unwrap(), 4);
        assert_eq!(store.line_end(head, 5).unwrap(), 7);
        assert_eq!(store.line_start(head, 8).unwrap(), 8);
        assert_eq!(store.line_end(head, 8).unwrap(), 8);
        assert_eq!(store.line_start(head, 2).unwrap(), 0);
        assert_eq!(store.line_end(head, 12).unwrap(), 13);
    }

    #[test]
    fn long_lines_scan_past_window() {
        let text = format!("x\n{}", "y".repeat(1000));
        let (store, _, head) = store_with(&text);
        assert_eq!(store.line_start(head, 900).unwrap(), 2);
        assert_eq!(store.line_end(head, 2).unwrap(), 1002);
    }
}
