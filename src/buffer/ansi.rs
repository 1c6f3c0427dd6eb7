//! ANSI escape sequence stripping
//!
//! GRUB and the ONIE installer paint their menus with cursor addressing
//! and reverse video; prompts only match reliably once those sequences
//! are gone.

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// Longest unfinished sequence carried over to the next read. Anything
/// longer is dropped rather than held back.
const MAX_PENDING: usize = 256;

/// Strips escape sequences from a stream of PTY reads.
///
/// A sequence split across two reads is held back until its end arrives,
/// so the bytes on either side of it still line up for matching.
#[derive(Debug, Default)]
pub struct AnsiStripper {
    pending: Vec<u8>,
}

impl AnsiStripper {
    /// Strip `data`, prefixed by whatever was held back from the last call.
    pub fn feed(&mut self, data: &[u8]) -> Vec<u8> {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(data);

        let mut result = Vec::with_capacity(input.len());
        let incomplete = strip_into(&input, &mut result);
        if input.len() - incomplete <= MAX_PENDING {
            self.pending = input[incomplete..].to_vec();
        }
        result
    }

    /// Bytes held back waiting for the end of a sequence.
    #[cfg(test)]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

/// Append `data` minus its escape sequences to `out`. Returns the offset
/// of a trailing sequence that is not finished yet, or `data.len()`.
fn strip_into(data: &[u8], out: &mut Vec<u8>) -> usize {
    let mut i = 0;

    while i < data.len() {
        if data[i] != ESC {
            out.push(data[i]);
            i += 1;
            continue;
        }

        let start = i;
        let Some(&kind) = data.get(i + 1) else {
            return start;
        };

        match kind {
            b'[' => {
                // CSI: parameters, then a final byte in 0x40..=0x7e
                i += 2;
                loop {
                    let Some(&ch) = data.get(i) else {
                        return start;
                    };
                    i += 1;
                    if (0x40..=0x7e).contains(&ch) {
                        break;
                    }
                }
            }
            b']' => {
                // OSC: terminated by BEL or ST (ESC \)
                i += 2;
                loop {
                    match data.get(i) {
                        None => return start,
                        Some(&BEL) => {
                            i += 1;
                            break;
                        }
                        Some(&ESC) => match data.get(i + 1) {
                            None => return start,
                            Some(&b'\\') => {
                                i += 2;
                                break;
                            }
                            Some(_) => i += 1,
                        },
                        Some(_) => i += 1,
                    }
                }
            }
            b'(' | b')' => {
                // Character set designation
                if i + 3 > data.len() {
                    return start;
                }
                i += 3;
            }
            _ => {
                i += 2;
            }
        }
    }

    data.len()
}
