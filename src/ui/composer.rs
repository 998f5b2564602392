//! Input composer for the chat panel.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Result returned when the user interacts with the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerResult {
    Submitted(String),
    None,
}

#[derive(Debug, Clone, Default)]
struct TextAreaState {
    content: String,
    /// Byte offset of the cursor, always on a char boundary.
    cursor: usize,
}

/// Multi-line text input: Enter submits, Shift+Enter inserts a newline.
#[derive(Debug, Clone)]
pub struct Composer {
    state: TextAreaState,
    placeholder: String,
    has_focus: bool,
}

impl Composer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            has_focus: false,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.insert_char('\n');
                } else if !self.state.content.trim().is_empty() {
                    let content = std::mem::take(&mut self.state.content);
                    self.state.cursor = 0;
                    return ComposerResult::Submitted(content);
                }
            }
            KeyCode::Char(c) => self.insert_char(c),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete(),
            KeyCode::Left => {
                if let Some(prev) = self.prev_boundary() {
                    self.state.cursor = prev;
                }
            }
            KeyCode::Right => {
                if let Some(next) = self.next_boundary() {
                    self.state.cursor = next;
                }
            }
            KeyCode::Home => self.state.cursor = 0,
            KeyCode::End => self.state.cursor = self.state.content.len(),
            _ => {}
        }

        ComposerResult::None
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, c: char) {
        self.state.content.insert(self.state.cursor, c);
        self.state.cursor += c.len_utf8();
    }

    fn backspace(&mut self) {
        if let Some(prev) = self.prev_boundary() {
            self.state.content.remove(prev);
            self.state.cursor = prev;
        }
    }

    fn delete(&mut self) {
        if self.state.cursor < self.state.content.len() {
            self.state.content.remove(self.state.cursor);
        }
    }

    fn prev_boundary(&self) -> Option<usize> {
        self.state.content[..self.state.cursor]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
    }

    fn next_boundary(&self) -> Option<usize> {
        self.state.content[self.state.cursor..]
            .chars()
            .next()
            .map(|c| self.state.cursor + c.len_utf8())
    }

    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    pub fn has_focus(&self) -> bool {
        self.has_focus
    }

    pub fn content(&self) -> &str {
        &self.state.content
    }

    pub fn is_empty(&self) -> bool {
        self.state.content.trim().is_empty()
    }

    /// Replace the draft wholesale (prompt enhancement result).
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.state.content = content.into();
        self.state.cursor = self.state.content.len();
    }

    pub fn render(&self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Message")
            .style(if self.has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });
        let inner = block.inner(area);
        block.render(area, buf);

        if self.state.content.is_empty() && !self.has_focus {
            let placeholder = Line::from(vec![Span::styled(
                self.placeholder.clone(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner.x, inner.y, &placeholder, inner.width);
            return;
        }

        let mut content = self.state.content.clone();
        if self.has_focus {
            content.insert(self.state.cursor.min(content.len()), '▌');
        }
        for (i, text) in content.split('\n').enumerate() {
            if (i as u16) < inner.height {
                let line = Line::from(vec![Span::raw(text.to_string())]);
                buf.set_line(inner.x, inner.y + i as u16, &line, inner.width);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn shift(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::SHIFT)
    }

    fn type_str(composer: &mut Composer, text: &str) {
        for c in text.chars() {
            composer.handle_key(press(KeyCode::Char(c)));
        }
    }

    #[test]
    fn enter_submits_and_clears() {
        let mut composer = Composer::new("say something");
        type_str(&mut composer, "hello");
        let result = composer.handle_key(press(KeyCode::Enter));
        assert_eq!(result, ComposerResult::Submitted("hello".into()));
        assert!(composer.is_empty());
    }

    #[test]
    fn enter_on_blank_input_is_rejected() {
        let mut composer = Composer::new("say something");
        type_str(&mut composer, "   ");
        assert_eq!(
            composer.handle_key(press(KeyCode::Enter)),
            ComposerResult::None
        );
    }

    #[test]
    fn shift_enter_inserts_a_newline() {
        let mut composer = Composer::new("say something");
        type_str(&mut composer, "line one");
        assert_eq!(
            composer.handle_key(shift(KeyCode::Enter)),
            ComposerResult::None
        );
        type_str(&mut composer, "line two");
        assert_eq!(composer.content(), "line one\nline two");
    }

    #[test]
    fn backspace_respects_multibyte_boundaries() {
        let mut composer = Composer::new("");
        type_str(&mut composer, "héllo");
        composer.handle_key(press(KeyCode::Home));
        composer.handle_key(press(KeyCode::Right));
        composer.handle_key(press(KeyCode::Right));
        composer.handle_key(press(KeyCode::Backspace));
        assert_eq!(composer.content(), "hllo");
    }

    #[test]
    fn set_content_moves_cursor_to_end() {
        let mut composer = Composer::new("");
        composer.set_content("enhanced draft");
        composer.insert_char('!');
        assert_eq!(composer.content(), "enhanced draft!");
    }
}
