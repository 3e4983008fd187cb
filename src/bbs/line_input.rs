//! Keystroke accumulation shared by the menu engine, the menu editor and the
//! login-family modules.
//!
//! Input may arrive one byte per chunk, so both the line buffer and the escape
//! sequence decoder keep their state between calls.

/// Longest line accepted before further characters are dropped.
pub const MAX_LINE: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Nothing to show.
    None,
    /// Text to echo back (the typed character, a mask, or an erase sequence).
    Echo(String),
    /// ENTER completed a line; the buffer is now empty.
    Line(String),
}

/// CR-terminated line buffer. LF and NUL (telnet CR LF / CR NUL) are ignored,
/// BS and DEL erase the last character.
#[derive(Debug, Clone, Default)]
pub struct LineInput {
    buffer: String,
}

impl LineInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ch: char) -> LineEvent {
        self.push_with_echo(ch, None)
    }

    /// Like [`push`](Self::push) but echoes `*` for every accepted character.
    pub fn push_masked(&mut self, ch: char) -> LineEvent {
        self.push_with_echo(ch, Some('*'))
    }

    fn push_with_echo(&mut self, ch: char, mask: Option<char>) -> LineEvent {
        match ch {
            '\r' => LineEvent::Line(std::mem::take(&mut self.buffer)),
            '\n' | '\0' => LineEvent::None,
            '\x08' | '\x7f' => {
                if self.buffer.pop().is_some() {
                    LineEvent::Echo("\x08 \x08".to_string())
                } else {
                    LineEvent::None
                }
            }
            c if c.is_control() => LineEvent::None,
            c => {
                if self.buffer.chars().count() >= MAX_LINE {
                    return LineEvent::None;
                }
                self.buffer.push(c);
                LineEvent::Echo(mask.unwrap_or(c).to_string())
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Arrow(Arrow),
    /// Part of (or the end of) an escape sequence with no meaning here.
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum EscState {
    #[default]
    Ground,
    Escape,
    Csi,
}

/// Recognises `ESC [ A..D` and `ESC O A..D` cursor keys and swallows other CSI
/// sequences. A key after a lone ESC is passed through.
#[derive(Debug, Clone, Default)]
pub struct KeyDecoder {
    state: EscState,
}

impl KeyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, ch: char) -> Key {
        match self.state {
            EscState::Ground => {
                if ch == '\x1b' {
                    self.state = EscState::Escape;
                    Key::Ignored
                } else {
                    Key::Char(ch)
                }
            }
            EscState::Escape => match ch {
                '[' | 'O' => {
                    self.state = EscState::Csi;
                    Key::Ignored
                }
                '\x1b' => Key::Ignored,
                // A lone ESC: the key after it is an ordinary keystroke
                _ => {
                    self.state = EscState::Ground;
                    Key::Char(ch)
                }
            },
            // Parameter bytes leave the decoder in CSI; any final byte ends the sequence.
            EscState::Csi if ch.is_ascii_digit() || ch == ';' => Key::Ignored,
            EscState::Csi => {
                self.state = EscState::Ground;
                match ch {
                    'A' => Key::Arrow(Arrow::Up),
                    'B' => Key::Arrow(Arrow::Down),
                    'C' => Key::Arrow(Arrow::Right),
                    'D' => Key::Arrow(Arrow::Left),
                    _ => Key::Ignored,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_completes_on_cr_only() {
        let mut input = LineInput::new();
        for c in "HEL".chars() {
            assert_eq!(input.push(c), LineEvent::Echo(c.to_string()));
        }
        assert_eq!(input.as_str(), "HEL");
        assert_eq!(input.push('\n'), LineEvent::None);
        assert_eq!(input.push('\r'), LineEvent::Line("HEL".into()));
        assert!(input.is_empty());
    }

    #[test]
    fn backspace_erases_and_masks_hide_text() {
        let mut input = LineInput::new();
        assert_eq!(input.push_masked('p'), LineEvent::Echo("*".into()));
        assert_eq!(input.push('\x7f'), LineEvent::Echo("\x08 \x08".into()));
        assert_eq!(input.push('\x08'), LineEvent::None);
        assert_eq!(input.push('\x07'), LineEvent::None);
        assert!(input.is_empty());
    }

    #[test]
    fn overlong_lines_are_capped() {
        let mut input = LineInput::new();
        for _ in 0..MAX_LINE + 10 {
            input.push('x');
        }
        assert_eq!(input.as_str().len(), MAX_LINE);
    }

    #[test]
    fn arrows_decode_one_byte_at_a_time() {
        let mut dec = KeyDecoder::new();
        assert_eq!(dec.feed('\x1b'), Key::Ignored);
        assert_eq!(dec.feed('['), Key::Ignored);
        assert_eq!(dec.feed('B'), Key::Arrow(Arrow::Down));
        assert_eq!(dec.feed('B'), Key::Char('B'));
        let keys: Vec<Key> = "\x1bODx".chars().map(|c| dec.feed(c)).collect();
        assert_eq!(keys, vec![Key::Ignored, Key::Ignored, Key::Arrow(Arrow::Left), Key::Char('x')]);
    }

    #[test]
    fn lone_escape_does_not_eat_the_next_key() {
        let mut dec = KeyDecoder::new();
        assert_eq!(dec.feed('\x1b'), Key::Ignored);
        assert_eq!(dec.feed('G'), Key::Char('G'));
        assert_eq!(dec.feed('\x1b'), Key::Ignored);
        assert_eq!(dec.feed('\x1b'), Key::Ignored);
        assert_eq!(dec.feed('q'), Key::Char('q'));
    }

    #[test]
    fn csi_parameters_stay_in_the_sequence() {
        let mut dec = KeyDecoder::new();
        let keys: Vec<Key> = "\x1b[1;5Ax".chars().map(|c| dec.feed(c)).collect();
        assert_eq!(
            keys,
            vec![
                Key::Ignored,
                Key::Ignored,
                Key::Ignored,
                Key::Ignored,
                Key::Ignored,
                Key::Arrow(Arrow::Up),
                Key::Char('x')
            ]
        );
    }

    #[test]
    fn unknown_sequences_are_swallowed() {
        let mut dec = KeyDecoder::new();
        let keys: Vec<Key> = "\x1b[2~x".chars().map(|c| dec.feed(c)).collect();
        assert_eq!(
            keys,
            vec![Key::Ignored, Key::Ignored, Key::Ignored, Key::Ignored, Key::Char('x')]
        );
    }
}
