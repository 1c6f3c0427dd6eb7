//! Buffer management for console output

mod ansi;

pub use ansi::AnsiStripper;

use bytes::BytesMut;

/// Ratio for buffer compaction strategy.
/// When buffer is full, discard oldest 1/3 and keep newest 2/3.
const DISCARD_RATIO: usize = 3;

/// Accumulates console output and tracks how much of it has already been
/// consumed by a match.
///
/// Boot menus redraw themselves continuously, so the buffer is bounded and
/// compacts itself; unmatched output is kept in preference to matched
/// output.
pub struct BufferManager {
    buffer: BytesMut,
    matched_position: usize,
    max_size: usize,
    stripper: Option<AnsiStripper>,
}

impl BufferManager {
    /// Create a new buffer manager
    pub fn new(max_size: usize, strip_ansi: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_size),
            matched_position: 0,
            max_size,
            stripper: strip_ansi.then(AnsiStripper::default),
        }
    }

    /// Append data to the buffer
    pub fn append(&mut self, data: &[u8]) {
        let data_to_append = match &mut self.stripper {
            Some(stripper) => stripper.feed(data),
            None => data.to_vec(),
        };

        if self.buffer.len() + data_to_append.len() > self.max_size {
            self.compact(data_to_append.len());
        }

        self.buffer.extend_from_slice(&data_to_append);
    }

    /// Get the buffer as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Get unmatched portion of the buffer
    pub fn unmatched(&self) -> &[u8] {
        &self.buffer[self.matched_position..]
    }

    /// Unmatched output as (lossy) text
    pub fn unmatched_text(&self) -> String {
        String::from_utf8_lossy(self.unmatched()).into_owned()
    }

    /// Mark a position as matched
    pub fn mark_matched(&mut self, end_position: usize) {
        self.matched_position = end_position.min(self.buffer.len());
    }

    /// Consume everything currently buffered
    pub fn mark_all_matched(&mut self) {
        self.matched_position = self.buffer.len();
    }

    /// Get the current buffer length
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Get the matched position
    pub fn matched_position(&self) -> usize {
        self.matched_position
    }

    /// Bytes between the last match and `position`
    pub fn since_match(&self, position: usize) -> &[u8] {
        let end = position.min(self.buffer.len());
        &self.buffer[self.matched_position.min(end)..end]
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Compact the buffer before appending `incoming` bytes.
    ///
    /// Consumed output is dropped first. Unmatched output is only dropped
    /// when the new chunk would still not fit, keeping the newest 2/3.
    fn compact(&mut self, incoming: usize) {
        let mut keep_from = self.matched_position;
        if self.buffer.len() - keep_from + incoming > self.max_size {
            let keep = (self.max_size - self.max_size / DISCARD_RATIO).saturating_sub(incoming);
            keep_from = self.buffer.len().saturating_sub(keep).max(keep_from);
        }

        let _ = self.buffer.split_to(keep_from);
        self.matched_position = self.matched_position.saturating_sub(keep_from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer() {
        let buffer = BufferManager::new(1024, false);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.matched_position(), 0);
    }

    #[test]
    fn test_multiple_appends() {
        let mut buffer = BufferManager::new(1024, false);
        buffer.append(b"sonic ");
        buffer.append(b"login: ");
        assert_eq!(buffer.as_bytes(), b"sonic login: ");
    }

    #[test]
    fn test_unmatched() {
        let mut buffer = BufferManager::new(1024, false);
        buffer.append(b"Password: admin@sonic:~$ ");
        buffer.mark_matched(9);

        assert_eq!(buffer.unmatched(), b" admin@sonic:~$ ");
    }

    #[test]
    fn test_since_match_excludes_consumed_output() {
        let mut buffer = BufferManager::new(1024, false);
        buffer.append(b"ONIE:/ # echo $boot_reason\r\ninstall\r\nONIE:/ # ");
        buffer.mark_matched(8);

        let before = buffer.since_match(37);
        assert_eq!(before, b" echo $boot_reason\r\ninstall\r\n");
    }

    #[test]
    fn test_mark_all_matched() {
        let mut buffer = BufferManager::new(1024, false);
        buffer.append(b"GNU GRUB  version 2.02");
        buffer.mark_all_matched();

        assert!(buffer.unmatched().is_empty());
        assert_eq!(buffer.matched_position(), buffer.len());
    }

    #[test]
    fn test_compact_basic() {
        let mut buffer = BufferManager::new(90, false);

        buffer.append(b"0123456789".repeat(5).as_slice());
        assert_eq!(buffer.len(), 50);

        buffer.append(b"ABCDEFGHIJ".repeat(5).as_slice());

        assert!(buffer.len() < 100);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_compact_preserves_unmatched() {
        let mut buffer = BufferManager::new(120, false);

        buffer.append(b"MATCHED_DATA_");
        buffer.mark_matched(13);
        buffer.append(b"UNMATCHED_");

        buffer.append(b"X".repeat(100).as_slice());

        assert!(buffer.unmatched_text().starts_with("UNMATCHED_"));
        assert_eq!(buffer.matched_position(), 0);
    }

    #[test]
    fn test_matched_position_after_compact() {
        let mut buffer = BufferManager::new(90, false);

        buffer.append(b"0123456789".repeat(5).as_slice());
        buffer.mark_matched(20);

        let matched_before = buffer.matched_position();
        buffer.append(b"X".repeat(50).as_slice());

        assert!(buffer.matched_position() <= matched_before);
    }

    #[test]
    fn test_strip_ansi_enabled() {
        let mut buffer = BufferManager::new(1024, true);
        buffer.append(b"\x1b[7m*ONIE: Install OS\x1b[0m");

        assert_eq!(buffer.as_bytes(), b"*ONIE: Install OS");
    }

    #[test]
    fn test_strip_ansi_across_appends() {
        let mut buffer = BufferManager::new(1024, true);
        buffer.append(b"GNU GRUB\r\n\x1b[");
        buffer.append(b"7m*SONiC-OS-HEAD\x1b[0m");

        assert_eq!(buffer.as_bytes(), b"GNU GRUB\r\n*SONiC-OS-HEAD");
    }

    #[test]
    fn test_strip_ansi_disabled() {
        let mut buffer = BufferManager::new(1024, false);
        let data = b"\x1b[7m*SONiC-OS-HEAD\x1b[0m";
        buffer.append(data);

        assert_eq!(buffer.as_bytes(), data);
    }

    #[test]
    fn test_unmatched_text_is_lossy() {
        let mut buffer = BufferManager::new(1024, false);
        buffer.append(&[0xFF, b'o', b'k']);

        assert_eq!(buffer.unmatched_text(), "\u{FFFD}ok");
    }
}
