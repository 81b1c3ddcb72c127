//! Raw keystroke decoding
//!
//! Bytes arrive from a non-canonical terminal in whatever chunks the OS
//! hands over. Arrow keys are three-byte escape sequences that may be split
//! across reads, so the decoder keeps its escape state between calls.

/// One decoded keystroke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Printable ASCII (0x20..=0x7e)
    Char(u8),
    Backspace,
    Enter,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EscState {
    #[default]
    Ground,
    /// Saw ESC
    Escape,
    /// Saw ESC [ or ESC O
    Intro,
}

const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;
const BS: u8 = 0x08;

/// Stateful byte-to-key decoder
#[derive(Debug, Default)]
pub struct KeyDecoder {
    state: EscState,
}

impl KeyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns a key once one is complete
    ///
    /// Unknown control bytes and unrecognized escape sequences are dropped.
    pub fn feed(&mut self, byte: u8) -> Option<Key> {
        match self.state {
            EscState::Ground => match byte {
                ESC => {
                    self.state = EscState::Escape;
                    None
                }
                b'\n' | b'\r' => Some(Key::Enter),
                DEL | BS => Some(Key::Backspace),
                0x20..=0x7e => Some(Key::Char(byte)),
                _ => None,
            },
            EscState::Escape => {
                self.state = match byte {
                    b'[' | b'O' => EscState::Intro,
                    ESC => EscState::Escape,
                    _ => EscState::Ground,
                };
                None
            }
            EscState::Intro => {
                self.state = EscState::Ground;
                match byte {
                    b'A' => Some(Key::Up),
                    b'B' => Some(Key::Down),
                    _ => None,
                }
            }
        }
    }

    /// Decode a whole chunk, appending keys to `out`
    pub fn decode_into(&mut self, bytes: &[u8], out: &mut Vec<Key>) {
        out.extend(bytes.iter().filter_map(|&b| self.feed(b)));
    }

    /// True while an escape sequence is half-read
    pub fn pending(&self) -> bool {
        self.state != EscState::Ground
    }
}
