//! App shell: screen routing and the cooperative event loop.
//!
//! Everything runs on one loop: terminal events are polled with a tick
//! timeout, push events are drained between polls, and deadline-based timers
//! (toast expiry, panel scroll, delayed redirect, deferred title refresh)
//! fire on the tick. Handlers run to completion before the next event, so the
//! shared flags need no locking.

use std::io;
use std::time::Instant;

use anyhow::{Context, Result};
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing::warn;

use crate::bridge::BackendHandle;
use crate::config::Config;
use crate::events::{ChatId, PushEvent};
use crate::ui::chat::{ChatAction, ChatScreen, ChatTimings, Zones};
use crate::ui::chrome::{self, Chrome, HeaderButton, HeaderDrag};
use crate::ui::home::{HomeAction, HomeScreen};

/// Where the user is. The chat route's payload is the conversation id the
/// original addressed via a URL query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Chat(Option<ChatId>),
}

enum Screen {
    Home(HomeScreen),
    Chat(ChatScreen),
}

pub struct App {
    backend: BackendHandle,
    push_rx: mpsc::UnboundedReceiver<PushEvent>,
    chrome: Chrome,
    screen: Screen,
    drag: HeaderDrag,
    /// Active-conversation marker shared across screens.
    active_chat: Option<ChatId>,
    app_title: String,
    timings: ChatTimings,
    config: Config,
    /// Geometry recorded at draw time for mouse routing.
    header: ratatui::layout::Rect,
    body: ratatui::layout::Rect,
    zones: Option<Zones>,
    should_quit: bool,
}

impl App {
    pub async fn new(
        backend: BackendHandle,
        push_rx: mpsc::UnboundedReceiver<PushEvent>,
        config: Config,
        route: Route,
    ) -> Self {
        let mut chrome = Chrome::new(config.toast_ttl(), config.panel_scroll_delay());
        let timings = ChatTimings {
            redirect_delay: config.redirect_delay(),
            title_refresh_delay: config.title_refresh_delay(),
        };
        let app_title = backend
            .app_title()
            .await
            .unwrap_or_else(|_| "confab".to_string());
        let (screen, active_chat) = match route {
            Route::Home => {
                let mut home = HomeScreen::new(None);
                if let Err(err) = home.refresh(&backend).await {
                    chrome.show_alert(err.to_string());
                }
                (Screen::Home(home), None)
            }
            Route::Chat(id) => {
                let chat = ChatScreen::open(&backend, &mut chrome, id, timings).await;
                (Screen::Chat(chat), id)
            }
        };
        Self {
            backend,
            push_rx,
            chrome,
            screen,
            drag: HeaderDrag::default(),
            active_chat,
            app_title,
            timings,
            config,
            header: ratatui::layout::Rect::default(),
            body: ratatui::layout::Rect::default(),
            zones: None,
            should_quit: false,
        }
    }

    /// Run until the user quits. The terminal must already be in raw mode.
    pub async fn run(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        while !self.should_quit {
            terminal
                .draw(|frame| {
                    let area = frame.size();
                    let buf = frame.buffer_mut();
                    self.header = ratatui::layout::Rect {
                        height: 1.min(area.height),
                        ..area
                    };
                    self.body = ratatui::layout::Rect {
                        y: area.y + self.header.height,
                        height: area.height.saturating_sub(self.header.height),
                        ..area
                    };
                    let title = match &self.screen {
                        Screen::Home(_) => self.app_title.as_str(),
                        Screen::Chat(chat) => chat.title(),
                    };
                    chrome::render_header(title, &self.chrome, self.header, buf);
                    self.zones = match &self.screen {
                        Screen::Home(home) => {
                            home.render(self.body, buf);
                            None
                        }
                        Screen::Chat(chat) => Some(chat.render(&self.chrome, self.body, buf)),
                    };
                    self.chrome.render_toast(area, buf);
                    self.chrome.render_alert(area, buf);
                })
                .context("failed to draw frame")?;

            if event::poll(self.config.tick_interval()).context("failed to poll terminal")? {
                let ev = event::read().context("failed to read terminal event")?;
                self.handle_event(ev).await;
            }

            while let Ok(push) = self.push_rx.try_recv() {
                self.on_push(push);
            }
            self.on_tick().await;
        }
        Ok(())
    }

    async fn handle_event(&mut self, ev: Event) {
        match ev {
            Event::Key(key) => self.handle_key(key).await,
            Event::Mouse(mouse) => self.handle_mouse(mouse).await,
            Event::Resize(..) => {}
            _ => {}
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        if self.chrome.alert_consumes(&key) {
            return;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.quit();
            return;
        }

        let action = match &mut self.screen {
            Screen::Home(home) => {
                match home.handle_key(key, &self.backend, &mut self.chrome).await {
                    HomeAction::None => ChatAction::None,
                    HomeAction::OpenChat(id) => ChatAction::OpenChat(id),
                    HomeAction::Quit => ChatAction::Quit,
                }
            }
            Screen::Chat(chat) => chat.handle_key(key, &self.backend, &mut self.chrome).await,
        };
        self.apply(action).await;
    }

    async fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if mouse.row == self.header.y && self.header.height > 0 {
                    if let Some(button) =
                        chrome::header_button_at(self.header, mouse.column, mouse.row)
                    {
                        self.header_button(button).await;
                    } else {
                        // The rest of the header row is the drag handle.
                        self.drag.mouse_down(mouse.column, mouse.row, true);
                    }
                    return;
                }
                let action = match &mut self.screen {
                    Screen::Home(home) => {
                        match home
                            .handle_click(mouse.row, self.body, &self.backend, &mut self.chrome)
                            .await
                        {
                            HomeAction::None => ChatAction::None,
                            HomeAction::OpenChat(id) => ChatAction::OpenChat(id),
                            HomeAction::Quit => ChatAction::Quit,
                        }
                    }
                    Screen::Chat(chat) => match self.zones {
                        Some(zones) => {
                            chat.handle_click(
                                mouse.column,
                                mouse.row,
                                &zones,
                                &self.backend,
                                &mut self.chrome,
                            )
                            .await
                        }
                        None => ChatAction::None,
                    },
                };
                self.apply(action).await;
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if let Some((dx, dy)) = self.drag.mouse_move(mouse.column, mouse.row) {
                    self.backend.move_window(dx, dy);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => self.drag.mouse_up(),
            _ => {}
        }
    }

    async fn header_button(&mut self, button: HeaderButton) {
        match button {
            HeaderButton::Sidebar => {
                if let Screen::Chat(chat) = &mut self.screen {
                    if self.chrome.sidebar_open {
                        self.chrome.sidebar_open = false;
                    } else {
                        chat.open_sidebar(&self.backend, &mut self.chrome).await;
                    }
                }
            }
            HeaderButton::Panel => self.chrome.toggle_panel(),
            HeaderButton::Lock => self.chrome.toggle_lock(),
            HeaderButton::Minimize => self.backend.minimize_app(),
            HeaderButton::Close => self.quit(),
        }
    }

    fn on_push(&mut self, push: PushEvent) {
        match &mut self.screen {
            Screen::Chat(chat) => chat.on_push(push, &mut self.chrome),
            Screen::Home(_) => warn!("push event arrived while on the home screen"),
        }
    }

    async fn on_tick(&mut self) {
        let now = Instant::now();
        let scroll_due = self.chrome.tick(now);
        if let Screen::Chat(chat) = &mut self.screen {
            if scroll_due {
                chat.scroll_to_bottom();
            }
            let action = chat.tick(now, &self.backend, &mut self.chrome).await;
            self.apply(action).await;
        }
    }

    async fn apply(&mut self, action: ChatAction) {
        match action {
            ChatAction::None => {}
            ChatAction::GoHome => self.navigate(Route::Home).await,
            ChatAction::OpenChat(id) => self.navigate(Route::Chat(Some(id))).await,
            ChatAction::Quit => self.quit(),
        }
    }

    /// Replace the current screen and re-run its entry fetch.
    async fn navigate(&mut self, route: Route) {
        self.zones = None;
        match route {
            Route::Home => {
                let mut home = HomeScreen::new(self.active_chat);
                if let Err(err) = home.refresh(&self.backend).await {
                    self.chrome.show_alert(err.to_string());
                }
                self.screen = Screen::Home(home);
            }
            Route::Chat(id) => {
                self.active_chat = id;
                let chat =
                    ChatScreen::open(&self.backend, &mut self.chrome, id, self.timings).await;
                self.screen = Screen::Chat(chat);
            }
        }
    }

    fn quit(&mut self) {
        self.backend.stop_app();
        self.should_quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend, bridge};

    async fn app_with(route: Route, chats: usize) -> (App, Vec<ChatId>) {
        let bridge = bridge::channel();
        backend::spawn(bridge.requests, bridge.push_tx);
        let mut ids = Vec::new();
        for _ in 0..chats {
            ids.push(
                bridge
                    .handle
                    .create_chat("general".into(), "echo-small".into())
                    .await
                    .unwrap(),
            );
        }
        let app = App::new(bridge.handle, bridge.push_rx, Config::default(), route).await;
        (app, ids)
    }

    #[tokio::test]
    async fn starts_on_the_requested_route() {
        let (app, _) = app_with(Route::Home, 0).await;
        assert!(matches!(app.screen, Screen::Home(_)));

        let (app, _ids) = app_with(Route::Chat(None), 1).await;
        assert!(matches!(app.screen, Screen::Chat(_)));
    }

    #[tokio::test]
    async fn opening_a_chat_from_home_navigates() {
        let (mut app, ids) = app_with(Route::Home, 1).await;
        app.apply(ChatAction::OpenChat(ids[0])).await;
        assert!(matches!(app.screen, Screen::Chat(_)));
        assert_eq!(app.active_chat, Some(ids[0]));
    }

    #[tokio::test]
    async fn going_home_keeps_the_active_marker() {
        let (mut app, ids) = app_with(Route::Chat(None), 1).await;
        app.apply(ChatAction::OpenChat(ids[0])).await;
        app.apply(ChatAction::GoHome).await;
        match &app.screen {
            Screen::Home(home) => assert_eq!(home.active_chat(), Some(ids[0])),
            Screen::Chat(_) => panic!("expected the home screen"),
        }
    }

    #[tokio::test]
    async fn quit_notifies_the_backend() {
        let (mut app, _) = app_with(Route::Home, 0).await;
        app.quit();
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn push_on_home_screen_is_dropped() {
        let (mut app, _) = app_with(Route::Home, 0).await;
        app.on_push(PushEvent::Chunk("stray".into()));
        assert!(matches!(app.screen, Screen::Home(_)));
    }

    #[test]
    fn zones_cover_the_frame() {
        let chrome = Chrome::new(
            std::time::Duration::from_secs(5),
            std::time::Duration::from_millis(250),
        );
        let zones = crate::ui::chat::layout_zones(
            ratatui::layout::Rect::new(0, 1, 80, 23),
            &chrome,
            false,
        );
        assert!(zones.panel.is_some());
        let panel = zones.panel.unwrap();
        assert_eq!(panel.bottom(), 24);
        assert_eq!(zones.messages.bottom(), panel.y);
    }
}
