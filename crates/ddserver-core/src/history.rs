//! Command history ring with a live edit slot
//!
//! ```text
//!            head                      tail (live slot)
//!             ▼                          ▼
//!   [ "ls" | "@10.0.0.2#4321" | "hi" | "he_" |  ...  ]
//!                                ▲
//!                             cursor (after one Up)
//! ```
//!
//! `tail` is always the slot being typed into. `head` is the oldest
//! retained entry. The cursor walks between them with Up/Down. Editing
//! while the cursor sits on an older entry first copies that entry into
//! the tail slot, so stored history is never modified in place.
//!
//! The ring keeps one slot more than its capacity so that `capacity`
//! finished lines stay reachable next to the live slot.

/// Bounded circular history of finished lines
#[derive(Debug, Clone)]
pub struct HistoryRing {
    slots: Vec<String>,
    width: usize,
    head: usize,
    tail: usize,
    cursor: usize,
}

impl HistoryRing {
    /// `capacity` retained lines, each shorter than `width` bytes
    pub fn new(capacity: usize, width: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![String::new(); capacity + 1],
            width: width.max(2),
            head: 0,
            tail: 0,
            cursor: 0,
        }
    }

    fn next(&self, idx: usize) -> usize {
        (idx + 1) % self.slots.len()
    }

    fn prev(&self, idx: usize) -> usize {
        if idx == 0 {
            self.slots.len() - 1
        } else {
            idx - 1
        }
    }

    /// Longest line a slot holds
    pub fn max_line_len(&self) -> usize {
        self.width - 1
    }

    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Number of finished lines currently retained
    pub fn len(&self) -> usize {
        (self.tail + self.slots.len() - self.head) % self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Text under the cursor
    pub fn current(&self) -> &str {
        &self.slots[self.cursor]
    }

    pub fn cursor_is_live(&self) -> bool {
        self.cursor == self.tail
    }

    /// Finished lines, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &str> + '_ {
        let mut idx = self.head;
        std::iter::from_fn(move || {
            if idx == self.tail {
                return None;
            }
            let line = self.slots[idx].as_str();
            idx = self.next(idx);
            Some(line)
        })
    }

    // Copy-on-edit: an older entry becomes the live line before mutation
    fn promote_cursor(&mut self) {
        if self.cursor != self.tail {
            let text = self.slots[self.cursor].clone();
            self.slots[self.tail] = text;
            self.cursor = self.tail;
        }
    }

    /// Finish the live slot and open a fresh one; evicts the oldest line
    /// when the ring is full
    fn advance_tail(&mut self) {
        self.tail = self.next(self.tail);
        self.slots[self.tail].clear();
        self.cursor = self.tail;
        if self.head == self.tail {
            self.head = self.next(self.head);
        }
    }

    /// Append a printable character; returns false when the slot is full
    pub fn push_char(&mut self, ch: char) -> bool {
        self.promote_cursor();
        let live = &mut self.slots[self.tail];
        if live.len() + ch.len_utf8() > self.width - 1 {
            return false;
        }
        live.push(ch);
        true
    }

    /// Remove the last character of the live line
    pub fn backspace(&mut self) -> bool {
        self.promote_cursor();
        self.slots[self.tail].pop().is_some()
    }

    /// Finish the line under the cursor
    ///
    /// Returns the finished text, or `None` for an empty line (nothing is
    /// recorded).
    pub fn enter(&mut self) -> Option<String> {
        self.promote_cursor();
        if self.slots[self.tail].is_empty() {
            return None;
        }
        let line = self.slots[self.tail].clone();
        self.advance_tail();
        Some(line)
    }

    /// Seed a saved line ahead of interactive editing; empty lines skipped
    ///
    /// Whitespace-only lines are kept, since Enter records them too.
    pub fn replay(&mut self, line: &str) -> bool {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return false;
        }
        self.slots[self.tail] = truncate(line, self.width - 1).to_string();
        self.advance_tail();
        true
    }

    /// Move the cursor one entry back; stops at the oldest
    pub fn up(&mut self) -> bool {
        if self.cursor == self.head {
            return false;
        }
        self.cursor = self.prev(self.cursor);
        true
    }

    /// Move the cursor one entry forward; stops at the live slot
    pub fn down(&mut self) -> bool {
        if self.cursor == self.tail {
            return false;
        }
        self.cursor = self.next(self.cursor);
        true
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
