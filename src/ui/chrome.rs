//! Shared UI chrome: the single-slot toast, the collapsible panel, the
//! sidebar flag, the blocking alert dialog, header dragging and the global
//! key routing that makes typing "just work".
//!
//! All timing is deadline-based: the tick loop asks what fell due instead of
//! registering callbacks, so only one toast timer can ever be live.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};

struct Toast {
    text: String,
    until: Instant,
}

/// Cross-screen UI state: the panel/sidebar flags plus the toast and alert
/// slots. Owned by the app shell and handed to whichever screen is active.
pub struct Chrome {
    pub sidebar_open: bool,
    pub panel_open: bool,
    pub panel_locked: bool,
    toast: Option<Toast>,
    alert: Option<String>,
    scroll_due: Option<Instant>,
    toast_ttl: Duration,
    scroll_delay: Duration,
}

impl Chrome {
    pub fn new(toast_ttl: Duration, scroll_delay: Duration) -> Self {
        Self {
            sidebar_open: false,
            panel_open: true,
            panel_locked: false,
            toast: None,
            alert: None,
            scroll_due: None,
            toast_ttl,
            scroll_delay,
        }
    }

    /// Show a transient notification. Replaces whatever is currently shown
    /// and restarts the dismissal deadline.
    pub fn show_toast(&mut self, text: impl Into<String>) {
        self.toast = Some(Toast {
            text: text.into(),
            until: Instant::now() + self.toast_ttl,
        });
    }

    pub fn toast_text(&self) -> Option<&str> {
        self.toast.as_ref().map(|t| t.text.as_str())
    }

    /// Raise the blocking alert. Input is swallowed until it is dismissed.
    pub fn show_alert(&mut self, text: impl Into<String>) {
        self.alert = Some(text.into());
    }

    pub fn alert_text(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    /// Offer a key to the alert dialog. Returns true if the key was consumed
    /// (an alert is up); Enter or Esc dismiss it.
    pub fn alert_consumes(&mut self, key: &KeyEvent) -> bool {
        if self.alert.is_none() {
            return false;
        }
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
            self.alert = None;
        }
        true
    }

    /// Open the panel. No-op while locked. Schedules the message-pane scroll
    /// that follows the layout settling.
    pub fn open_panel(&mut self) {
        if self.panel_locked || self.panel_open {
            return;
        }
        self.panel_open = true;
        self.scroll_due = Some(Instant::now() + self.scroll_delay);
    }

    /// Collapse the panel. No-op while locked.
    pub fn collapse_panel(&mut self) {
        if self.panel_locked {
            return;
        }
        self.panel_open = false;
    }

    pub fn toggle_panel(&mut self) {
        if self.panel_open {
            self.collapse_panel();
        } else {
            self.open_panel();
        }
    }

    pub fn toggle_lock(&mut self) {
        self.panel_locked = !self.panel_locked;
    }

    /// Expire deadlines. Returns true when the deferred panel-open scroll
    /// fell due on this tick.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.toast.as_ref().is_some_and(|t| now >= t.until) {
            self.toast = None;
        }
        if self.scroll_due.is_some_and(|due| now >= due) {
            self.scroll_due = None;
            return true;
        }
        false
    }

    /// Toast overlay in the bottom-right corner.
    pub fn render_toast(&self, area: Rect, buf: &mut Buffer) {
        let Some(toast) = &self.toast else { return };
        let width = (toast.text.len() as u16 + 4).min(area.width);
        let rect = Rect {
            x: area.right().saturating_sub(width + 1),
            y: area.bottom().saturating_sub(4),
            width,
            height: 3,
        };
        Clear.render(rect, buf);
        Paragraph::new(toast.text.clone())
            .style(Style::default().fg(Color::Black).bg(Color::Yellow))
            .block(Block::default().borders(Borders::ALL))
            .render(rect, buf);
    }

    /// Centered blocking alert.
    pub fn render_alert(&self, area: Rect, buf: &mut Buffer) {
        let Some(alert) = &self.alert else { return };
        let width = area.width.clamp(20, 60).min(area.width);
        let rect = Rect {
            x: area.x + (area.width.saturating_sub(width)) / 2,
            y: area.y + area.height.saturating_sub(5) / 2,
            width,
            height: 5,
        };
        Clear.render(rect, buf);
        Paragraph::new(format!("{alert}\n\n[Enter] dismiss"))
            .wrap(Wrap { trim: true })
            .style(Style::default().fg(Color::White).bg(Color::Red))
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .render(rect, buf);
    }
}

/// Header controls, right-aligned, each four columns wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderButton {
    Sidebar,
    Panel,
    Lock,
    Minimize,
    Close,
}

const HEADER_BUTTONS: [HeaderButton; 5] = [
    HeaderButton::Sidebar,
    HeaderButton::Panel,
    HeaderButton::Lock,
    HeaderButton::Minimize,
    HeaderButton::Close,
];
const BUTTON_WIDTH: u16 = 4;

/// Which header control a click on the header row landed on, if any.
pub fn header_button_at(header: Rect, column: u16, row: u16) -> Option<HeaderButton> {
    if row != header.y {
        return None;
    }
    // Buttons render as "[c] " segments; the last one has no trailing space.
    let cluster = BUTTON_WIDTH * HEADER_BUTTONS.len() as u16 - 1;
    let start = header.right().saturating_sub(cluster);
    if column < start || column >= header.right() {
        return None;
    }
    let index = ((column - start) / BUTTON_WIDTH) as usize;
    HEADER_BUTTONS.get(index).copied()
}

/// Header row: app title plus the window/panel controls.
pub fn render_header(title: &str, chrome: &Chrome, area: Rect, buf: &mut Buffer) {
    let controls = format!(
        "[≡] [{}] [{}] [_] [x]",
        if chrome.panel_open { "▼" } else { "▲" },
        if chrome.panel_locked { "•" } else { "∘" },
    );
    let pad = area
        .width
        .saturating_sub((title.chars().count() + controls.chars().count() + 1) as u16);
    let line = Line::from(vec![
        Span::styled(
            format!(" {title}"),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(pad as usize)),
        Span::styled(controls, Style::default().fg(Color::Gray)),
    ]);
    buf.set_line(area.x, area.y, &line, area.width);
}

/// What a routed global key press asks the app to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalKey {
    CollapsePanel,
    OpenPanel,
    /// A printable character arrived while the composer was not focused: open
    /// the panel, focus the composer, and insert the character.
    FocusInput(char),
    Pass,
}

/// Route the document-level key bindings: Shift+Down collapses, Shift+Up
/// expands, plain Enter collapses, and any lone printable ASCII character
/// typed outside the composer redirects into it.
pub fn route_global_key(key: &KeyEvent, composer_focused: bool) -> GlobalKey {
    match key.code {
        KeyCode::Down if key.modifiers.contains(KeyModifiers::SHIFT) => GlobalKey::CollapsePanel,
        KeyCode::Up if key.modifiers.contains(KeyModifiers::SHIFT) => GlobalKey::OpenPanel,
        KeyCode::Enter if !key.modifiers.contains(KeyModifiers::SHIFT) => {
            GlobalKey::CollapsePanel
        }
        KeyCode::Char(c)
            if !composer_focused
                && !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                && (' '..='~').contains(&c) =>
        {
            GlobalKey::FocusInput(c)
        }
        _ => GlobalKey::Pass,
    }
}

/// Mouse-drag state for the header row; deltas are forwarded to the backend
/// as relative window moves.
#[derive(Debug, Default)]
pub struct HeaderDrag {
    dragging: bool,
    last: (u16, u16),
}

impl HeaderDrag {
    pub fn mouse_down(&mut self, column: u16, row: u16, in_header: bool) {
        if in_header {
            self.dragging = true;
            self.last = (column, row);
        }
    }

    /// Returns the (dx, dy) to forward, if a drag is in progress.
    pub fn mouse_move(&mut self, column: u16, row: u16) -> Option<(i32, i32)> {
        if !self.dragging {
            return None;
        }
        let dx = column as i32 - self.last.0 as i32;
        let dy = row as i32 - self.last.1 as i32;
        self.last = (column, row);
        (dx != 0 || dy != 0).then_some((dx, dy))
    }

    pub fn mouse_up(&mut self) {
        self.dragging = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chrome() -> Chrome {
        Chrome::new(Duration::from_secs(5), Duration::from_millis(250))
    }

    #[test]
    fn new_toast_replaces_the_old_one() {
        let mut chrome = chrome();
        chrome.show_toast("first");
        chrome.show_toast("second");
        assert_eq!(chrome.toast_text(), Some("second"));
    }

    #[test]
    fn toast_expires_at_its_deadline() {
        let mut chrome = chrome();
        chrome.show_toast("hello");
        chrome.tick(Instant::now());
        assert_eq!(chrome.toast_text(), Some("hello"));
        chrome.tick(Instant::now() + Duration::from_secs(6));
        assert_eq!(chrome.toast_text(), None);
    }

    #[test]
    fn locked_panel_ignores_open_and_collapse() {
        let mut chrome = chrome();
        chrome.collapse_panel();
        chrome.toggle_lock();
        chrome.open_panel();
        assert!(!chrome.panel_open);
        chrome.toggle_lock();
        chrome.open_panel();
        assert!(chrome.panel_open);
        chrome.toggle_lock();
        chrome.collapse_panel();
        assert!(chrome.panel_open);
    }

    #[test]
    fn opening_the_panel_schedules_the_scroll() {
        let mut chrome = chrome();
        chrome.collapse_panel();
        chrome.open_panel();
        assert!(!chrome.tick(Instant::now()));
        assert!(chrome.tick(Instant::now() + Duration::from_secs(1)));
        // The deadline fires once.
        assert!(!chrome.tick(Instant::now() + Duration::from_secs(2)));
    }

    #[test]
    fn alert_swallows_keys_until_dismissed() {
        let mut chrome = chrome();
        chrome.show_alert("backend said no");
        let other = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE);
        assert!(chrome.alert_consumes(&other));
        assert!(chrome.alert_text().is_some());
        let enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        assert!(chrome.alert_consumes(&enter));
        assert!(chrome.alert_text().is_none());
        assert!(!chrome.alert_consumes(&other));
    }

    #[test]
    fn every_printable_ascii_character_redirects_into_the_composer() {
        for byte in 0x20u8..=0x7e {
            let c = byte as char;
            let key = KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE);
            assert_eq!(
                route_global_key(&key, false),
                GlobalKey::FocusInput(c),
                "character {c:?} should redirect into the composer"
            );
        }
    }

    #[test]
    fn printable_characters_in_the_composer_pass_through() {
        let key = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(route_global_key(&key, true), GlobalKey::Pass);
    }

    #[test]
    fn shift_arrows_drive_the_panel() {
        let down = KeyEvent::new(KeyCode::Down, KeyModifiers::SHIFT);
        let up = KeyEvent::new(KeyCode::Up, KeyModifiers::SHIFT);
        assert_eq!(route_global_key(&down, true), GlobalKey::CollapsePanel);
        assert_eq!(route_global_key(&up, false), GlobalKey::OpenPanel);
    }

    #[test]
    fn drag_reports_deltas_between_moves() {
        let mut drag = HeaderDrag::default();
        drag.mouse_down(10, 0, true);
        assert_eq!(drag.mouse_move(13, 1), Some((3, 1)));
        assert_eq!(drag.mouse_move(13, 1), None);
        drag.mouse_up();
        assert_eq!(drag.mouse_move(20, 5), None);
    }

    #[test]
    fn header_buttons_resolve_right_to_left() {
        let header = Rect::new(0, 0, 80, 1);
        assert_eq!(header_button_at(header, 79, 0), Some(HeaderButton::Close));
        assert_eq!(header_button_at(header, 77, 0), Some(HeaderButton::Close));
        assert_eq!(header_button_at(header, 73, 0), Some(HeaderButton::Minimize));
        assert_eq!(header_button_at(header, 69, 0), Some(HeaderButton::Lock));
        assert_eq!(header_button_at(header, 65, 0), Some(HeaderButton::Panel));
        assert_eq!(header_button_at(header, 61, 0), Some(HeaderButton::Sidebar));
        assert_eq!(header_button_at(header, 40, 0), None);
        assert_eq!(header_button_at(header, 79, 1), None);
    }

    #[test]
    fn drag_outside_the_header_never_starts() {
        let mut drag = HeaderDrag::default();
        drag.mouse_down(10, 7, false);
        assert_eq!(drag.mouse_move(12, 8), None);
    }
}
