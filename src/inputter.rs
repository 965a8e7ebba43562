use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::trace;

/// Single line editor backing the command line (search, open, export).
/// The cursor counts characters, not bytes.
#[derive(Default)]
pub struct Inputter {
    current_input: String,
    cursor: usize,
    finished: bool,
    canceled: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct InputResult {
    pub input: String,
    pub finished: bool,
    pub canceled: bool,
    pub cursor: usize,
}

impl Inputter {
    pub fn read(&mut self, key: KeyEvent) -> InputResult {
        match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => self.finished = true,
            (KeyCode::Esc, _) => {
                self.clear();
                self.canceled = true;
                self.finished = true;
            }
            (KeyCode::Backspace, _) => self.backspace(),
            (KeyCode::Delete, _) => self.delete(),
            (KeyCode::Left, _) => self.cursor = self.cursor.saturating_sub(1),
            (KeyCode::Right, _) => self.cursor = (self.cursor + 1).min(self.len()),
            (KeyCode::Home, _) => self.cursor = 0,
            (KeyCode::End, _) => self.cursor = self.len(),
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => {
                self.current_input.clear();
                self.cursor = 0;
            }
            (KeyCode::Char(chr), m) if !m.contains(KeyModifiers::CONTROL) => {
                let pos = self.byte_pos(self.cursor);
                self.current_input.insert(pos, chr);
                self.cursor += 1;
            }
            (code, _) => trace!("Ignored input key {code:?}"),
        }
        self.get()
    }

    /// Prefill the editor, cursor at the end.
    pub fn set(&mut self, s: &str) {
        self.current_input = s.to_string();
        self.cursor = self.len();
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            input: self.current_input.clone(),
            finished: self.finished,
            canceled: self.canceled,
            cursor: self.cursor,
        }
    }

    pub fn clear(&mut self) {
        self.canceled = false;
        self.finished = false;
        self.current_input.clear();
        self.cursor = 0;
    }

    fn len(&self) -> usize {
        self.current_input.chars().count()
    }

    fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let pos = self.byte_pos(self.cursor);
            self.current_input.remove(pos);
        }
    }

    fn delete(&mut self) {
        if self.cursor < self.len() {
            let pos = self.byte_pos(self.cursor);
            self.current_input.remove(pos);
        }
    }

    fn byte_pos(&self, char_idx: usize) -> usize {
        self.current_input
            .char_indices()
            .nth(char_idx)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.current_input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(input: &mut Inputter, code: KeyCode) -> InputResult {
        input.read(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(input: &mut Inputter, s: &str) {
        for c in s.chars() {
            press(input, KeyCode::Char(c));
        }
    }

    #[test]
    fn types_and_finishes() {
        let mut input = Inputter::default();
        type_str(&mut input, "pump");
        let result = press(&mut input, KeyCode::Enter);
        assert_eq!(result.input, "pump");
        assert!(result.finished);
        assert!(!result.canceled);
    }

    #[test]
    fn edits_in_the_middle_of_multibyte_text() {
        let mut input = Inputter::default();
        type_str(&mut input, "Zürich");
        press(&mut input, KeyCode::Home);
        press(&mut input, KeyCode::Right);
        press(&mut input, KeyCode::Right);
        press(&mut input, KeyCode::Backspace);
        assert_eq!(input.get().input, "Zrich");
        type_str(&mut input, "ü");
        press(&mut input, KeyCode::Delete);
        assert_eq!(input.get().input, "Züich");
        assert_eq!(input.get().cursor, 2);
    }

    #[test]
    fn escape_cancels_and_clears() {
        let mut input = Inputter::default();
        input.set("assets.csv");
        assert_eq!(input.get().cursor, 10);
        let result = press(&mut input, KeyCode::Esc);
        assert!(result.canceled);
        assert!(result.finished);
        assert!(result.input.is_empty());
    }

    #[test]
    fn cursor_stays_in_bounds() {
        let mut input = Inputter::default();
        press(&mut input, KeyCode::Left);
        press(&mut input, KeyCode::Backspace);
        type_str(&mut input, "ab");
        press(&mut input, KeyCode::Right);
        assert_eq!(input.get().cursor, 2);
    }
}
