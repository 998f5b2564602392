//! Conversation list screen: cards with switch/delete actions, free-text
//! search, and the new-chat dialog.

use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget},
};

use crate::bridge::{BackendError, BackendHandle};
use crate::events::{ChatId, ChatSummary, ChoiceItem};
use crate::ui::chrome::Chrome;

/// What the screen asks the app shell to do after handling input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HomeAction {
    None,
    OpenChat(ChatId),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DialogField {
    ChatType,
    Model,
}

/// The new-chat popup: both selections are required before creation.
pub struct NewChatDialog {
    types: Vec<ChoiceItem>,
    models: Vec<ChoiceItem>,
    type_index: Option<usize>,
    model_index: Option<usize>,
    field: DialogField,
}

impl NewChatDialog {
    fn new(types: Vec<ChoiceItem>, models: Vec<ChoiceItem>) -> Self {
        Self {
            types,
            models,
            type_index: None,
            model_index: None,
            field: DialogField::ChatType,
        }
    }

    fn selection(&self) -> (Option<&ChoiceItem>, Option<&ChoiceItem>) {
        (
            self.type_index.and_then(|i| self.types.get(i)),
            self.model_index.and_then(|i| self.models.get(i)),
        )
    }

    fn cycle(&mut self, delta: isize) {
        let (items, index) = match self.field {
            DialogField::ChatType => (&self.types, &mut self.type_index),
            DialogField::Model => (&self.models, &mut self.model_index),
        };
        if items.is_empty() {
            return;
        }
        let len = items.len() as isize;
        let current = index.map(|i| i as isize).unwrap_or(-1);
        let next = (current + delta).rem_euclid(len);
        *index = Some(next as usize);
    }
}

/// Index-page controller: owns the fetched summaries and the search query.
pub struct HomeScreen {
    chats: Vec<ChatSummary>,
    selected: usize,
    search: String,
    search_focused: bool,
    /// Marker for the conversation the backend considers active.
    active: Option<ChatId>,
    dialog: Option<NewChatDialog>,
}

impl HomeScreen {
    pub fn new(active: Option<ChatId>) -> Self {
        Self {
            chats: Vec::new(),
            selected: 0,
            search: String::new(),
            search_focused: false,
            active,
            dialog: None,
        }
    }

    pub fn active_chat(&self) -> Option<ChatId> {
        self.active
    }

    pub fn chats(&self) -> &[ChatSummary] {
        &self.chats
    }

    /// Fetch the conversation set: unfiltered, or filtered by the current
    /// query. Replaces the rendered set wholesale.
    pub async fn refresh(&mut self, backend: &BackendHandle) -> Result<(), BackendError> {
        self.chats = if self.search.trim().is_empty() {
            backend.list_chats().await?
        } else {
            backend.search_chats(self.search.clone()).await?
        };
        self.selected = self.selected.min(self.chats.len().saturating_sub(1));
        Ok(())
    }

    pub async fn handle_key(
        &mut self,
        key: KeyEvent,
        backend: &BackendHandle,
        chrome: &mut Chrome,
    ) -> HomeAction {
        if key.kind != KeyEventKind::Press {
            return HomeAction::None;
        }
        if self.dialog.is_some() {
            return self.handle_dialog_key(key, backend, chrome).await;
        }
        if self.search_focused {
            return self.handle_search_key(key, backend, chrome).await;
        }

        match key.code {
            KeyCode::Char('q') => return HomeAction::Quit,
            KeyCode::Char('/') => self.search_focused = true,
            KeyCode::Char('n') => self.open_dialog(backend, chrome).await,
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                if self.selected + 1 < self.chats.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(summary) = self.chats.get(self.selected) {
                    return self.switch_to(summary.id, backend, chrome).await;
                }
            }
            KeyCode::Char('d') => {
                if let Some(summary) = self.chats.get(self.selected) {
                    self.delete(summary.id, backend, chrome).await;
                }
            }
            _ => {}
        }
        HomeAction::None
    }

    async fn handle_search_key(
        &mut self,
        key: KeyEvent,
        backend: &BackendHandle,
        chrome: &mut Chrome,
    ) -> HomeAction {
        let changed = match key.code {
            KeyCode::Esc => {
                self.search_focused = false;
                false
            }
            KeyCode::Enter => {
                self.search_focused = false;
                false
            }
            KeyCode::Backspace => self.search.pop().is_some(),
            KeyCode::Char(c) => {
                self.search.push(c);
                true
            }
            _ => false,
        };
        if changed {
            if let Err(err) = self.refresh(backend).await {
                chrome.show_alert(err.to_string());
            }
        }
        HomeAction::None
    }

    async fn handle_dialog_key(
        &mut self,
        key: KeyEvent,
        backend: &BackendHandle,
        chrome: &mut Chrome,
    ) -> HomeAction {
        let Some(dialog) = self.dialog.as_mut() else {
            return HomeAction::None;
        };
        match key.code {
            KeyCode::Esc => self.dialog = None,
            KeyCode::Tab => {
                dialog.field = match dialog.field {
                    DialogField::ChatType => DialogField::Model,
                    DialogField::Model => DialogField::ChatType,
                };
            }
            KeyCode::Up => dialog.cycle(-1),
            KeyCode::Down => dialog.cycle(1),
            KeyCode::Enter => {
                let (kind, model) = dialog.selection();
                let Some(kind) = kind else {
                    chrome.show_alert("Please select a chat type");
                    return HomeAction::None;
                };
                let Some(model) = model else {
                    chrome.show_alert("Please select a model");
                    return HomeAction::None;
                };
                let (kind, model) = (kind.value.clone(), model.value.clone());
                match backend.create_chat(kind, model).await {
                    Ok(id) => {
                        self.dialog = None;
                        if let Err(err) = self.refresh(backend).await {
                            chrome.show_alert(err.to_string());
                        }
                        return self.switch_to(id, backend, chrome).await;
                    }
                    Err(err) => {
                        // Dialog stays open so the user can adjust and retry.
                        chrome.show_alert(format!("Error creating chat: {err}"));
                    }
                }
            }
            _ => {}
        }
        HomeAction::None
    }

    async fn open_dialog(&mut self, backend: &BackendHandle, chrome: &mut Chrome) {
        let types = match backend.chat_types().await {
            Ok(types) => types,
            Err(err) => {
                chrome.show_alert(err.to_string());
                return;
            }
        };
        let models = match backend.available_models().await {
            Ok(models) => models,
            Err(err) => {
                chrome.show_alert(err.to_string());
                return;
            }
        };
        self.dialog = Some(NewChatDialog::new(types, models));
    }

    /// Switch flow shared by Enter, card clicks, and fresh creations.
    async fn switch_to(
        &mut self,
        id: ChatId,
        backend: &BackendHandle,
        chrome: &mut Chrome,
    ) -> HomeAction {
        match backend.switch_chat(id).await {
            Ok(()) => {
                self.active = Some(id);
                HomeAction::OpenChat(id)
            }
            Err(err) => {
                chrome.show_alert(format!("Error switching chat: {err}"));
                HomeAction::None
            }
        }
    }

    /// Click routing for the card list: a click on a card runs the switch
    /// flow, a click on the search box focuses it.
    pub async fn handle_click(
        &mut self,
        row: u16,
        body: Rect,
        backend: &BackendHandle,
        chrome: &mut Chrome,
    ) -> HomeAction {
        if self.dialog.is_some() {
            return HomeAction::None;
        }
        if row < body.y + 3 {
            self.search_focused = true;
            return HomeAction::None;
        }
        self.search_focused = false;
        // Cards start one row inside the list block and span three lines each.
        let list_top = body.y + 4;
        if row >= list_top {
            let index = ((row - list_top) / 3) as usize;
            if ((row - list_top) % 3) < 2 {
                if let Some(summary) = self.chats.get(index) {
                    self.selected = index;
                    return self.switch_to(summary.id, backend, chrome).await;
                }
            }
        }
        HomeAction::None
    }

    /// Delete by id; on success refresh and clear the active marker if the
    /// deleted conversation was the active one. No retry on failure.
    pub async fn delete(&mut self, id: ChatId, backend: &BackendHandle, chrome: &mut Chrome) {
        match backend.delete_chat(id).await {
            Ok(()) => {
                if self.active == Some(id) {
                    self.active = None;
                }
                if let Err(err) = self.refresh(backend).await {
                    chrome.show_alert(err.to_string());
                }
            }
            Err(err) => chrome.show_alert(format!("Error deleting chat: {err}")),
        }
    }

    /// Lines for the list body: exactly one placeholder when empty, otherwise
    /// one card (two lines plus a spacer) per conversation.
    pub fn list_lines(&self) -> Vec<Line<'static>> {
        if self.chats.is_empty() {
            return vec![Line::from(vec![Span::styled(
                "No chats yet".to_string(),
                Style::default().fg(Color::DarkGray),
            )])];
        }

        let mut lines = Vec::new();
        for (index, summary) in self.chats.iter().enumerate() {
            let selected = index == self.selected;
            let marker = if self.active == Some(summary.id) {
                "● "
            } else {
                "  "
            };
            let title_style = if selected {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else {
                Style::default().fg(Color::White)
            };
            lines.push(Line::from(vec![
                Span::styled(marker.to_string(), Style::default().fg(Color::Green)),
                Span::styled(summary.display_title().to_string(), title_style),
            ]));
            let stamp = summary
                .last_message_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string();
            lines.push(Line::from(vec![
                Span::raw("  ".to_string()),
                Span::styled(stamp, Style::default().fg(Color::DarkGray)),
            ]));
            lines.push(Line::from(""));
        }
        lines
    }

    pub fn render(&self, area: Rect, buf: &mut Buffer) {
        let search_title = if self.search_focused {
            "Search (Esc to leave)"
        } else {
            "Search (/)"
        };
        let search_area = Rect { height: 3.min(area.height), ..area };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(search_title)
            .style(if self.search_focused {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });
        let inner = block.inner(search_area);
        block.render(search_area, buf);
        let query = if self.search_focused {
            format!("{}▌", self.search)
        } else {
            self.search.clone()
        };
        buf.set_line(inner.x, inner.y, &Line::from(query), inner.width);

        let list_area = Rect {
            y: area.y + 3,
            height: area.height.saturating_sub(4),
            ..area
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Chats · Enter open · d delete · n new · q quit");
        let inner = block.inner(list_area);
        block.render(list_area, buf);
        for (i, line) in self.list_lines().iter().enumerate() {
            if (i as u16) < inner.height {
                buf.set_line(inner.x, inner.y + i as u16, line, inner.width);
            }
        }

        if let Some(dialog) = &self.dialog {
            render_dialog(dialog, area, buf);
        }
    }
}

fn render_dialog(dialog: &NewChatDialog, area: Rect, buf: &mut Buffer) {
    let width = area.width.clamp(20, 44).min(area.width);
    let height = 8.min(area.height);
    let rect = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    };
    Clear.render(rect, buf);

    let (kind, model) = dialog.selection();
    let row = |label: &str, value: Option<&ChoiceItem>, focused: bool| {
        let style = if focused {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::White)
        };
        Line::from(vec![
            Span::styled(format!("{label}: "), Style::default().fg(Color::Gray)),
            Span::styled(
                value.map(|c| c.label.clone()).unwrap_or_else(|| "—".into()),
                style,
            ),
        ])
    };

    let body = vec![
        row("Type", kind, dialog.field == DialogField::ChatType),
        row("Model", model, dialog.field == DialogField::Model),
        Line::from(""),
        Line::from(Span::styled(
            "↑/↓ choose · Tab switch · Enter create · Esc cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    Paragraph::new(body)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("New chat")
                .style(Style::default().fg(Color::White)),
        )
        .render(rect, buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend, bridge};
    use crossterm::event::KeyModifiers;
    use std::time::Duration;

    fn chrome() -> Chrome {
        Chrome::new(Duration::from_secs(5), Duration::from_millis(250))
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    async fn backend_with_chats(count: usize) -> (BackendHandle, Vec<ChatId>) {
        let bridge = bridge::channel();
        backend::spawn(bridge.requests, bridge.push_tx);
        let mut ids = Vec::new();
        for _ in 0..count {
            ids.push(
                bridge
                    .handle
                    .create_chat("general".into(), "echo-small".into())
                    .await
                    .unwrap(),
            );
        }
        (bridge.handle, ids)
    }

    #[tokio::test]
    async fn empty_list_renders_one_placeholder_and_zero_cards() {
        let (backend, _) = backend_with_chats(0).await;
        let mut screen = HomeScreen::new(None);
        screen.refresh(&backend).await.unwrap();
        let lines = screen.list_lines();
        assert_eq!(lines.len(), 1);
        let text: String = lines[0]
            .spans
            .iter()
            .map(|s| s.content.to_string())
            .collect();
        assert_eq!(text, "No chats yet");
    }

    #[tokio::test]
    async fn cards_render_one_per_conversation() {
        let (backend, _) = backend_with_chats(3).await;
        let mut screen = HomeScreen::new(None);
        screen.refresh(&backend).await.unwrap();
        // Two lines plus a spacer per card.
        assert_eq!(screen.list_lines().len(), 9);
    }

    #[tokio::test]
    async fn deleting_the_active_chat_clears_the_marker() {
        let (backend, ids) = backend_with_chats(2).await;
        let mut chrome = chrome();
        let mut screen = HomeScreen::new(Some(ids[0]));
        screen.refresh(&backend).await.unwrap();

        screen.delete(ids[0], &backend, &mut chrome).await;
        assert_eq!(screen.active_chat(), None);
        assert_eq!(screen.chats().len(), 1);
        assert!(chrome.alert_text().is_none());
    }

    #[tokio::test]
    async fn deleting_a_non_active_chat_keeps_the_marker() {
        let (backend, ids) = backend_with_chats(2).await;
        let mut chrome = chrome();
        let mut screen = HomeScreen::new(Some(ids[0]));
        screen.refresh(&backend).await.unwrap();

        screen.delete(ids[1], &backend, &mut chrome).await;
        assert_eq!(screen.active_chat(), Some(ids[0]));
    }

    #[tokio::test]
    async fn failed_delete_raises_the_blocking_alert() {
        let (backend, _) = backend_with_chats(1).await;
        let mut chrome = chrome();
        let mut screen = HomeScreen::new(None);
        screen.refresh(&backend).await.unwrap();

        screen.delete(ChatId::new(), &backend, &mut chrome).await;
        assert!(chrome.alert_text().unwrap().contains("not found"));
        assert_eq!(screen.chats().len(), 1);
    }

    #[tokio::test]
    async fn clearing_the_query_reloads_the_full_list() {
        let (backend, _) = backend_with_chats(2).await;
        let mut chrome = chrome();
        let mut screen = HomeScreen::new(None);
        screen.refresh(&backend).await.unwrap();

        screen.handle_key(press(KeyCode::Char('/')), &backend, &mut chrome).await;
        for c in "zzz".chars() {
            screen
                .handle_key(press(KeyCode::Char(c)), &backend, &mut chrome)
                .await;
        }
        assert!(screen.chats().is_empty());

        for _ in 0..3 {
            screen
                .handle_key(press(KeyCode::Backspace), &backend, &mut chrome)
                .await;
        }
        assert_eq!(screen.chats().len(), 2);
    }

    #[tokio::test]
    async fn enter_switches_to_the_selected_chat() {
        let (backend, ids) = backend_with_chats(1).await;
        let mut chrome = chrome();
        let mut screen = HomeScreen::new(None);
        screen.refresh(&backend).await.unwrap();

        let action = screen
            .handle_key(press(KeyCode::Enter), &backend, &mut chrome)
            .await;
        assert_eq!(action, HomeAction::OpenChat(ids[0]));
        assert_eq!(screen.active_chat(), Some(ids[0]));
    }

    #[tokio::test]
    async fn dialog_requires_both_selections() {
        let (backend, _) = backend_with_chats(0).await;
        let mut chrome = chrome();
        let mut screen = HomeScreen::new(None);
        screen
            .handle_key(press(KeyCode::Char('n')), &backend, &mut chrome)
            .await;
        assert!(screen.dialog.is_some());

        let action = screen
            .handle_key(press(KeyCode::Enter), &backend, &mut chrome)
            .await;
        assert_eq!(action, HomeAction::None);
        assert!(chrome.alert_text().unwrap().contains("chat type"));
    }

    #[tokio::test]
    async fn dialog_creates_and_opens_the_new_chat() {
        let (backend, _) = backend_with_chats(0).await;
        let mut chrome = chrome();
        let mut screen = HomeScreen::new(None);
        screen
            .handle_key(press(KeyCode::Char('n')), &backend, &mut chrome)
            .await;
        screen
            .handle_key(press(KeyCode::Down), &backend, &mut chrome)
            .await;
        screen
            .handle_key(press(KeyCode::Tab), &backend, &mut chrome)
            .await;
        screen
            .handle_key(press(KeyCode::Down), &backend, &mut chrome)
            .await;
        let action = screen
            .handle_key(press(KeyCode::Enter), &backend, &mut chrome)
            .await;
        assert!(matches!(action, HomeAction::OpenChat(_)));
        assert_eq!(screen.chats().len(), 1);
        assert!(screen.dialog.is_none());
    }
}
