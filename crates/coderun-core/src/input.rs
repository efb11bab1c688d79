//! Interactive input relay.
//!
//! Captures keystrokes while the program is blocked on stdin, keeps the
//! pending line, and tells the session what to echo and when to send a line.

use crate::transcript::BACKSPACE;
use tracing::{debug, trace};

/// A keystroke from the terminal surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Enter,
}

impl Key {
    /// Classify a raw character. Control characters other than
    /// newline/backspace/delete are dropped.
    pub fn from_char(ch: char) -> Option<Key> {
        match ch {
            '\n' | '\r' => Some(Key::Enter),
            BACKSPACE | '\u{7f}' => Some(Key::Backspace),
            c if c.is_control() => None,
            c => Some(Key::Char(c)),
        }
    }
}

/// What the session must do in response to a keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Echo this character into the transcript.
    Echo(char),
    /// Echo a backspace, erasing the last locally typed character.
    Erase,
    /// Send this line to the engine and echo a newline.
    Submit(String),
}

#[derive(Debug, Default)]
pub struct InputRelay {
    buffer: String,
    active: bool,
}

impl InputRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting keystrokes (engine is waiting on stdin).
    pub fn activate(&mut self) {
        if !self.active {
            trace!(target: "coderun::input", "Input relay activated");
        }
        self.active = true;
    }

    /// Stop accepting keystrokes and drop any unsent text.
    pub fn deactivate(&mut self) {
        if !self.buffer.is_empty() {
            debug!(
                target: "coderun::input",
                "Discarding {} unsent input chars",
                self.buffer.chars().count()
            );
        }
        self.active = false;
        self.buffer.clear();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Feed one keystroke. Returns `None` when the key has no effect.
    pub fn handle_key(&mut self, key: Key) -> Option<RelayAction> {
        if !self.active {
            trace!(target: "coderun::input", "Ignoring {:?} while not waiting for input", key);
            return None;
        }

        // A control char smuggled in as `Char` acts as the key it encodes.
        let key = match key {
            Key::Char(ch) => match Key::from_char(ch) {
                Some(key) => key,
                None => {
                    trace!(target: "coderun::input", "Dropping control char {:?}", ch);
                    return None;
                }
            },
            key => key,
        };

        match key {
            Key::Char(ch) => {
                self.buffer.push(ch);
                Some(RelayAction::Echo(ch))
            }
            // Only locally typed text can be erased, never remote output.
            Key::Backspace => self.buffer.pop().map(|_| RelayAction::Erase),
            Key::Enter => {
                if self.buffer.is_empty() {
                    None
                } else {
                    Some(RelayAction::Submit(std::mem::take(&mut self.buffer)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_relay() -> InputRelay {
        let mut relay = InputRelay::new();
        relay.activate();
        relay
    }

    #[test]
    fn test_key_from_char() {
        assert_eq!(Key::from_char('a'), Some(Key::Char('a')));
        assert_eq!(Key::from_char(' '), Some(Key::Char(' ')));
        assert_eq!(Key::from_char('\n'), Some(Key::Enter));
        assert_eq!(Key::from_char('\r'), Some(Key::Enter));
        assert_eq!(Key::from_char('\u{8}'), Some(Key::Backspace));
        assert_eq!(Key::from_char('\u{7f}'), Some(Key::Backspace));
        assert_eq!(Key::from_char('\u{1b}'), None);
        assert_eq!(Key::from_char('\t'), None);
    }

    #[test]
    fn test_typing_and_submit() {
        let mut relay = active_relay();
        assert_eq!(relay.handle_key(Key::Char('4')), Some(RelayAction::Echo('4')));
        assert_eq!(relay.handle_key(Key::Char('2')), Some(RelayAction::Echo('2')));
        assert_eq!(relay.buffer(), "42");
        assert_eq!(
            relay.handle_key(Key::Enter),
            Some(RelayAction::Submit("42".to_string()))
        );
        assert_eq!(relay.buffer(), "");
        // Still active for the next line
        assert!(relay.is_active());
    }

    #[test]
    fn test_backspace_only_erases_typed_text() {
        let mut relay = active_relay();
        assert_eq!(relay.handle_key(Key::Backspace), None);
        relay.handle_key(Key::Char('x'));
        assert_eq!(relay.handle_key(Key::Backspace), Some(RelayAction::Erase));
        assert_eq!(relay.handle_key(Key::Backspace), None);
        assert_eq!(relay.buffer(), "");
    }

    #[test]
    fn test_control_chars_never_reach_the_buffer() {
        let mut relay = active_relay();
        assert_eq!(relay.handle_key(Key::Char('\u{8}')), None);
        assert_eq!(relay.handle_key(Key::Char('\u{1b}')), None);
        assert_eq!(relay.handle_key(Key::Char('\t')), None);
        assert_eq!(relay.buffer(), "");

        relay.handle_key(Key::Char('a'));
        assert_eq!(relay.handle_key(Key::Char('\u{7f}')), Some(RelayAction::Erase));
        relay.handle_key(Key::Char('b'));
        assert_eq!(
            relay.handle_key(Key::Char('\r')),
            Some(RelayAction::Submit("b".to_string()))
        );
    }

    #[test]
    fn test_enter_on_empty_buffer_is_noop() {
        let mut relay = active_relay();
        assert_eq!(relay.handle_key(Key::Enter), None);
    }

    #[test]
    fn test_inactive_relay_ignores_keys() {
        let mut relay = InputRelay::new();
        assert_eq!(relay.handle_key(Key::Char('a')), None);
        assert_eq!(relay.handle_key(Key::Enter), None);
        assert_eq!(relay.buffer(), "");
    }

    #[test]
    fn test_deactivate_drops_pending_text() {
        let mut relay = active_relay();
        relay.handle_key(Key::Char('a'));
        relay.deactivate();
        assert_eq!(relay.buffer(), "");
        assert_eq!(relay.handle_key(Key::Char('b')), None);
    }
}
