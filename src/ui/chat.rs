//! Conversation detail screen: transcript, composer panel, sidebar, and the
//! in-progress stream it renders.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Widget},
};
use tracing::warn;

use crate::bridge::{BackendError, BackendHandle};
use crate::events::{ChatId, ChatSummary, Message, PushEvent, Role};
use crate::markdown;
use crate::stream::{self, StreamSession};
use crate::ui::chrome::{self, Chrome, GlobalKey};
use crate::ui::composer::{Composer, ComposerResult};

/// What the screen asks the app shell to do after handling input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    None,
    GoHome,
    OpenChat(ChatId),
    Quit,
}

/// Timing knobs sourced from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ChatTimings {
    pub redirect_delay: Duration,
    pub title_refresh_delay: Duration,
}

/// Chat-page controller: owns the transcript, the composer, and the active
/// stream record while a generation is in progress.
pub struct ChatScreen {
    chat_id: Option<ChatId>,
    title: String,
    messages: Vec<Message>,
    composer: Composer,
    stream: Option<StreamSession>,
    sidebar: Vec<ChatSummary>,
    sidebar_selected: usize,
    /// Lines scrolled up from the newest one; zero means pinned to bottom.
    scroll_from_bottom: usize,
    redirect_due: Option<Instant>,
    title_refresh_due: Option<Instant>,
    timings: ChatTimings,
}

impl ChatScreen {
    fn blank(title: impl Into<String>, chat_id: Option<ChatId>, timings: ChatTimings) -> Self {
        let mut composer = Composer::new("Type a message and press Enter…");
        composer.set_focus(true);
        Self {
            chat_id,
            title: title.into(),
            messages: Vec::new(),
            composer,
            stream: None,
            sidebar: Vec::new(),
            sidebar_selected: 0,
            scroll_from_bottom: 0,
            redirect_due: None,
            title_refresh_due: None,
            timings,
        }
    }

    /// Resolve the route's conversation id. Absent id: welcome placeholder
    /// under the default title. Missing conversation: transient notice and a
    /// delayed redirect back to the list.
    pub async fn open(
        backend: &BackendHandle,
        chrome: &mut Chrome,
        chat_id: Option<ChatId>,
        timings: ChatTimings,
    ) -> Self {
        let title = backend
            .app_title()
            .await
            .unwrap_or_else(|_| "confab".to_string());
        let mut screen = Self::blank(title, chat_id, timings);

        if let Some(id) = chat_id {
            match backend.get_chat(id).await {
                Ok(chat) => {
                    if let Some(title) = chat.title {
                        screen.title = title;
                    }
                    screen.messages = chat.messages;
                }
                Err(BackendError::NotFound) => {
                    chrome.show_toast("Chat not found. Returning home…");
                    screen.redirect_due = Some(Instant::now() + timings.redirect_delay);
                }
                Err(err) => chrome.show_alert(err.to_string()),
            }
        }
        screen
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn generating(&self) -> bool {
        self.stream.is_some()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Submit the composer draft. Rejected while a generation is in progress
    /// or when the input is empty; otherwise the user message lands in the
    /// transcript immediately and a stream session opens over a placeholder
    /// assistant message.
    pub async fn submit(&mut self, text: String, backend: &BackendHandle, chrome: &mut Chrome) {
        if self.generating() || text.trim().is_empty() {
            return;
        }

        let username = backend.username().await.ok();
        self.messages
            .push(Message::new(Role::User, username, text.clone()));

        let model = backend.current_model_name().await.ok();
        self.messages.push(Message::new(Role::Assistant, model, ""));
        let index = self.messages.len() - 1;
        self.stream = Some(StreamSession::new(self.chat_id, index));
        self.scroll_from_bottom = 0;

        if let Err(err) = backend.start_generation(text).await {
            self.fail_generation(&err.to_string(), chrome);
        }
    }

    /// Apply one push event. Events with no active stream are dropped.
    pub fn on_push(&mut self, event: PushEvent, chrome: &mut Chrome) {
        let Some(session) = self.stream.as_mut() else {
            warn!("push event arrived with no active stream");
            return;
        };
        match event {
            PushEvent::Chunk(chunk) => {
                if let Some(message) = stream::error_payload(&chunk) {
                    let message = message.to_string();
                    self.fail_generation(&message, chrome);
                    return;
                }
                session.push_chunk(&chunk);
                let index = session.message_index();
                let raw = session.raw().to_string();
                if let Some(slot) = self.messages.get_mut(index) {
                    slot.content = raw;
                }
                self.scroll_from_bottom = 0;
            }
            PushEvent::Complete => {
                if let Some(done) = self.stream.take() {
                    if done.chat_id().is_some() {
                        self.title_refresh_due =
                            Some(Instant::now() + self.timings.title_refresh_delay);
                    }
                }
            }
        }
    }

    /// Generation failure: plain-text error replaces the rendered content,
    /// the stream tears down, and a toast notifies the user.
    fn fail_generation(&mut self, message: &str, chrome: &mut Chrome) {
        if let Some(session) = self.stream.take() {
            if let Some(slot) = self.messages.get_mut(session.message_index()) {
                slot.content = format!("Error: {message}");
            }
        }
        chrome.show_toast(format!("Error: {message}"));
    }

    /// User-initiated stop: flips the in-progress state off immediately and
    /// appends the stopped marker exactly once. The backend is asked to halt
    /// but the UI does not wait for acknowledgment.
    pub fn stop(&mut self, backend: &BackendHandle, chrome: &mut Chrome) {
        let Some(mut session) = self.stream.take() else {
            return;
        };
        backend.stop_generation();
        session.mark_stopped();
        if let Some(slot) = self.messages.get_mut(session.message_index()) {
            slot.content = session.raw().to_string();
        }
        chrome.show_toast("Generation stopped");
    }

    /// Fire due deadlines: the not-found redirect and the deferred title
    /// refresh that follows a completed generation.
    pub async fn tick(
        &mut self,
        now: Instant,
        backend: &BackendHandle,
        _chrome: &mut Chrome,
    ) -> ChatAction {
        if self.redirect_due.is_some_and(|due| now >= due) {
            self.redirect_due = None;
            return ChatAction::GoHome;
        }
        if self.title_refresh_due.is_some_and(|due| now >= due) {
            self.title_refresh_due = None;
            if let Some(id) = self.chat_id {
                if let Ok(Some(title)) = backend.regenerate_title(id).await {
                    for entry in &mut self.sidebar {
                        if entry.id == id {
                            entry.title = Some(title.clone());
                        }
                    }
                    self.title = title;
                }
            }
        }
        ChatAction::None
    }

    pub async fn handle_key(
        &mut self,
        key: KeyEvent,
        backend: &BackendHandle,
        chrome: &mut Chrome,
    ) -> ChatAction {
        if key.kind != KeyEventKind::Press {
            return ChatAction::None;
        }

        if chrome.sidebar_open {
            return self.handle_sidebar_key(key, backend, chrome).await;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('e') => {
                    self.enhance_prompt(backend, chrome).await;
                    return ChatAction::None;
                }
                KeyCode::Char('b') => {
                    self.open_sidebar(backend, chrome).await;
                    return ChatAction::None;
                }
                KeyCode::Char('l') => {
                    chrome.toggle_lock();
                    return ChatAction::None;
                }
                _ => {}
            }
        }

        if key.code == KeyCode::Enter && !key.modifiers.contains(KeyModifiers::SHIFT) {
            // Submit if possible, then collapse the panel: the page-level
            // Enter binding fires alongside the composer's.
            if self.composer.has_focus() && !self.generating() {
                if let ComposerResult::Submitted(text) = self.composer.handle_key(key) {
                    self.submit(text, backend, chrome).await;
                }
            }
            chrome.collapse_panel();
            return ChatAction::None;
        }

        match chrome::route_global_key(&key, self.composer.has_focus()) {
            GlobalKey::CollapsePanel => {
                chrome.collapse_panel();
                return ChatAction::None;
            }
            GlobalKey::OpenPanel => {
                chrome.open_panel();
                return ChatAction::None;
            }
            GlobalKey::FocusInput(c) => {
                chrome.open_panel();
                self.composer.set_focus(true);
                self.composer.insert_char(c);
                return ChatAction::None;
            }
            GlobalKey::Pass => {}
        }

        match key.code {
            KeyCode::Esc => {
                if self.generating() {
                    self.stop(backend, chrome);
                } else {
                    return ChatAction::GoHome;
                }
            }
            KeyCode::PageUp => {
                self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(5);
            }
            KeyCode::PageDown => {
                self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(5);
            }
            _ => {
                if self.composer.has_focus() {
                    self.composer.handle_key(key);
                }
            }
        }
        ChatAction::None
    }

    /// Pin the message pane back to the newest line (the deferred scroll that
    /// follows a panel open, and the auto-scroll on new content).
    pub fn scroll_to_bottom(&mut self) {
        self.scroll_from_bottom = 0;
    }

    async fn handle_sidebar_key(
        &mut self,
        key: KeyEvent,
        backend: &BackendHandle,
        chrome: &mut Chrome,
    ) -> ChatAction {
        match key.code {
            KeyCode::Esc => chrome.sidebar_open = false,
            KeyCode::Char('b') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                chrome.sidebar_open = false;
            }
            KeyCode::Up => self.sidebar_selected = self.sidebar_selected.saturating_sub(1),
            KeyCode::Down => {
                if self.sidebar_selected + 1 < self.sidebar.len() {
                    self.sidebar_selected += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(summary) = self.sidebar.get(self.sidebar_selected) {
                    return self.switch_to(summary.id, backend, chrome).await;
                }
            }
            _ => {}
        }
        ChatAction::None
    }

    /// Select a conversation from the sidebar. Switching to the one already
    /// open just closes the sidebar.
    pub async fn switch_to(
        &mut self,
        id: ChatId,
        backend: &BackendHandle,
        chrome: &mut Chrome,
    ) -> ChatAction {
        chrome.sidebar_open = false;
        if self.chat_id == Some(id) {
            return ChatAction::None;
        }
        match backend.switch_chat(id).await {
            Ok(()) => ChatAction::OpenChat(id),
            Err(err) => {
                chrome.show_alert(format!("Error switching chat: {err}"));
                ChatAction::None
            }
        }
    }

    /// Open the sidebar, refreshing its summaries first.
    pub async fn open_sidebar(&mut self, backend: &BackendHandle, chrome: &mut Chrome) {
        match backend.list_chats().await {
            Ok(chats) => {
                self.sidebar = chats;
                self.sidebar_selected = self
                    .sidebar
                    .iter()
                    .position(|summary| Some(summary.id) == self.chat_id)
                    .unwrap_or(0);
                chrome.sidebar_open = true;
            }
            Err(err) => chrome.show_alert(err.to_string()),
        }
    }

    /// Hand the draft to the backend's prompt enhancer and replace it with
    /// the result.
    async fn enhance_prompt(&mut self, backend: &BackendHandle, chrome: &mut Chrome) {
        if self.composer.is_empty() {
            return;
        }
        chrome.show_toast("Enhancing prompt…");
        match backend.enhance_prompt(self.composer.content().to_string()).await {
            Ok(enhanced) => {
                self.composer.set_content(enhanced);
                chrome.show_toast("Prompt enhanced!");
            }
            Err(err) => chrome.show_toast(format!("Error: {err}")),
        }
    }

    /// Click routing for the message pane and sidebar, given the rects
    /// computed at render time.
    pub async fn handle_click(
        &mut self,
        column: u16,
        row: u16,
        zones: &Zones,
        backend: &BackendHandle,
        chrome: &mut Chrome,
    ) -> ChatAction {
        if chrome.sidebar_open && zones.sidebar.is_some_and(|rect| contains(rect, column, row)) {
            // A click inside the sidebar closes the panel, then may pick a chat.
            if chrome.panel_open {
                chrome.collapse_panel();
            }
            if let Some(rect) = zones.sidebar {
                let index = (row.saturating_sub(rect.y + 1)) as usize;
                if let Some(summary) = self.sidebar.get(index) {
                    let id = summary.id;
                    return self.switch_to(id, backend, chrome).await;
                }
            }
            return ChatAction::None;
        }

        if zones.stop.is_some_and(|rect| contains(rect, column, row)) {
            self.stop(backend, chrome);
            return ChatAction::None;
        }

        if chrome.panel_open && !zones.panel.is_some_and(|rect| contains(rect, column, row)) {
            chrome.collapse_panel();
        }
        ChatAction::None
    }

    /// Transcript lines: header + rendered body per message, a welcome
    /// placeholder when the conversation is empty.
    pub fn message_lines(&self) -> Vec<Line<'static>> {
        if self.messages.is_empty() {
            let text = if self.chat_id.is_some() {
                "No messages yet. Start a conversation!"
            } else {
                "Welcome! Open the sidebar (Ctrl+B) or go home (Esc) to pick a chat."
            };
            return vec![Line::from(vec![Span::styled(
                text.to_string(),
                Style::default().fg(Color::DarkGray),
            )])];
        }

        let mut lines = Vec::new();
        for message in &self.messages {
            lines.push(message_header(message));
            lines.extend(markdown::render_segments(&stream::split_reasoning(
                &message.content,
            )));
            lines.push(Line::from(""));
        }
        if self.generating() {
            lines.push(Line::from(vec![Span::styled(
                "▋ generating… (Esc to stop)".to_string(),
                Style::default().fg(Color::Green),
            )]));
        }
        lines
    }

    /// Render into the body area below the header. Returns the hit-test
    /// rects for mouse routing.
    pub fn render(&self, chrome: &Chrome, area: Rect, buf: &mut Buffer) -> Zones {
        let zones = layout_zones(area, chrome, self.generating());

        // Message pane, auto-scrolled to the newest line.
        let block = Block::default().borders(Borders::ALL);
        let inner = block.inner(zones.messages);
        block.render(zones.messages, buf);
        let lines = self.message_lines();
        let overflow = lines.len().saturating_sub(inner.height as usize);
        let start = overflow.saturating_sub(self.scroll_from_bottom.min(overflow));
        for (i, line) in lines[start..].iter().take(inner.height as usize).enumerate() {
            buf.set_line(inner.x, inner.y + i as u16, line, inner.width);
        }

        if let Some(panel) = zones.panel {
            let composer_area = Rect {
                height: panel.height.saturating_sub(1),
                ..panel
            };
            self.composer.render(composer_area, buf);
            let mut controls = vec![Span::styled(
                " ^E enhance · ^B chats · ^L lock ".to_string(),
                Style::default().fg(Color::DarkGray),
            )];
            if self.generating() {
                controls.push(Span::styled(
                    "[■ Stop]".to_string(),
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ));
            }
            let controls_area = Rect {
                y: panel.bottom().saturating_sub(1),
                height: 1,
                ..panel
            };
            buf.set_line(
                controls_area.x,
                controls_area.y,
                &Line::from(controls),
                controls_area.width,
            );
        }

        if let Some(sidebar) = zones.sidebar {
            Clear.render(sidebar, buf);
            let block = Block::default().borders(Borders::ALL).title("Chats");
            let inner = block.inner(sidebar);
            block.render(sidebar, buf);
            for (i, summary) in self.sidebar.iter().enumerate() {
                if (i as u16) >= inner.height {
                    break;
                }
                let style = if i == self.sidebar_selected {
                    Style::default().fg(Color::Black).bg(Color::Cyan)
                } else if Some(summary.id) == self.chat_id {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::White)
                };
                let line = Line::from(vec![Span::styled(
                    summary.display_title().to_string(),
                    style,
                )]);
                buf.set_line(inner.x, inner.y + i as u16, &line, inner.width);
            }
        }

        zones
    }
}

fn message_header(message: &Message) -> Line<'static> {
    let (icon, color) = match message.role {
        Role::User => ("👤", Color::Blue),
        Role::Assistant => ("🤖", Color::Green),
        Role::System => ("⚙", Color::Yellow),
    };
    let mut spans = vec![Span::styled(
        format!("{icon} "),
        Style::default().fg(color),
    )];
    if let Some(name) = &message.name {
        spans.push(Span::styled(
            format!("{name} "),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
    }
    spans.push(Span::styled(
        message.role.as_ref().to_string(),
        Style::default().fg(Color::DarkGray),
    ));
    Line::from(spans)
}

/// Hit-test rects for mouse routing, recomputed from the current flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zones {
    pub messages: Rect,
    pub panel: Option<Rect>,
    pub stop: Option<Rect>,
    pub sidebar: Option<Rect>,
}

/// Carve the body area (below the header) into panes.
pub fn layout_zones(body: Rect, chrome: &Chrome, generating: bool) -> Zones {
    let panel_height = if chrome.panel_open { 4.min(body.height) } else { 0 };
    let messages = Rect {
        height: body.height - panel_height,
        ..body
    };
    let panel = (panel_height > 0).then_some(Rect {
        y: body.bottom() - panel_height,
        height: panel_height,
        ..body
    });
    let stop = match (generating, panel) {
        (true, Some(panel)) => Some(Rect {
            x: panel.x + 34.min(panel.width.saturating_sub(8)),
            y: panel.bottom().saturating_sub(1),
            width: 8.min(panel.width),
            height: 1,
        }),
        _ => None,
    };
    let sidebar = chrome.sidebar_open.then_some(Rect {
        width: 28.min(body.width),
        ..body
    });

    Zones {
        messages,
        panel,
        stop,
        sidebar,
    }
}

fn contains(rect: Rect, column: u16, row: u16) -> bool {
    column >= rect.x && column < rect.right() && row >= rect.y && row < rect.bottom()
}
