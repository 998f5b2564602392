//! Reference in-process backend.
//!
//! The real owners of persistence, model selection and title generation live
//! in a separate process; this task implements the same request protocol with
//! in-memory chats and a word-by-word echo generator so the binary runs
//! stand-alone and tests can script push sequences.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::bridge::{BackendError, BackendRequest};
use crate::events::{Chat, ChatId, ChatSummary, ChoiceItem, Message, PushEvent, Role};

const DEFAULT_MODEL: &str = "echo-small";
const APP_TITLE: &str = "confab";

/// Spawn the backend task. It runs until the request channel closes.
pub fn spawn(
    requests: mpsc::UnboundedReceiver<BackendRequest>,
    push: mpsc::UnboundedSender<PushEvent>,
) -> JoinHandle<()> {
    tokio::spawn(run(requests, push))
}

struct StoredChat {
    chat: Chat,
    model: String,
    last_message_at: chrono::DateTime<Utc>,
}

struct GenerationDone {
    chat_id: ChatId,
    text: String,
    model: String,
    completed: bool,
}

struct LocalBackend {
    chats: Vec<StoredChat>,
    active: Option<ChatId>,
    push: mpsc::UnboundedSender<PushEvent>,
    cancel: Arc<AtomicBool>,
    generation: Option<JoinHandle<()>>,
    done_tx: mpsc::UnboundedSender<GenerationDone>,
}

async fn run(
    mut requests: mpsc::UnboundedReceiver<BackendRequest>,
    push: mpsc::UnboundedSender<PushEvent>,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut backend = LocalBackend {
        chats: Vec::new(),
        active: None,
        push,
        cancel: Arc::new(AtomicBool::new(false)),
        generation: None,
        done_tx,
    };

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else { break };
                backend.handle(request);
            }
            Some(done) = done_rx.recv() => {
                backend.record_generation(done);
            }
        }
    }
}

impl LocalBackend {
    fn handle(&mut self, request: BackendRequest) {
        match request {
            BackendRequest::ListChats { reply } => {
                let _ = reply.send(self.summaries(None));
            }
            BackendRequest::SearchChats { query, reply } => {
                let _ = reply.send(self.summaries(Some(&query)));
            }
            BackendRequest::GetChat { id, reply } => {
                let result = self
                    .stored(id)
                    .map(|stored| stored.chat.clone())
                    .ok_or(BackendError::NotFound);
                let _ = reply.send(result);
            }
            BackendRequest::CreateChat { kind, model, reply } => {
                let _ = reply.send(self.create_chat(kind, model));
            }
            BackendRequest::DeleteChat { id, reply } => {
                let before = self.chats.len();
                self.chats.retain(|stored| stored.chat.id != id);
                if self.chats.len() == before {
                    let _ = reply.send(Err(BackendError::NotFound));
                } else {
                    if self.active == Some(id) {
                        self.active = None;
                    }
                    let _ = reply.send(Ok(()));
                }
            }
            BackendRequest::SwitchChat { id, reply } => {
                let result = if self.stored(id).is_some() {
                    self.active = Some(id);
                    Ok(())
                } else {
                    Err(BackendError::NotFound)
                };
                let _ = reply.send(result);
            }
            BackendRequest::ChatTypes { reply } => {
                let _ = reply.send(vec![
                    ChoiceItem::new("general", "General"),
                    ChoiceItem::new("coding", "Coding"),
                    ChoiceItem::new("research", "Research"),
                ]);
            }
            BackendRequest::AvailableModels { reply } => {
                let _ = reply.send(vec![
                    ChoiceItem::new("echo-small", "Echo Small"),
                    ChoiceItem::new("echo-large", "Echo Large"),
                ]);
            }
            BackendRequest::Username { reply } => {
                let name = std::env::var("USER")
                    .or_else(|_| std::env::var("USERNAME"))
                    .unwrap_or_else(|_| "you".to_string());
                let _ = reply.send(name);
            }
            BackendRequest::CurrentModelName { reply } => {
                let _ = reply.send(self.current_model());
            }
            BackendRequest::AppTitle { reply } => {
                let _ = reply.send(APP_TITLE.to_string());
            }
            BackendRequest::RegenerateTitle { id, reply } => {
                let _ = reply.send(self.regenerate_title(id));
            }
            BackendRequest::EnhancePrompt { draft, reply } => {
                let _ = reply.send(enhance_prompt(&draft));
            }
            BackendRequest::StartGeneration { text, reply } => {
                let _ = reply.send(self.start_generation(text));
            }
            BackendRequest::StopGeneration => {
                self.cancel.store(true, Ordering::Relaxed);
            }
            BackendRequest::MinimizeApp => debug!("minimize requested"),
            BackendRequest::StopApp => debug!("application stop requested"),
            BackendRequest::MoveWindow { dx, dy } => {
                debug!(dx, dy, "window move requested");
            }
        }
    }

    fn stored(&self, id: ChatId) -> Option<&StoredChat> {
        self.chats.iter().find(|stored| stored.chat.id == id)
    }

    fn stored_mut(&mut self, id: ChatId) -> Option<&mut StoredChat> {
        self.chats.iter_mut().find(|stored| stored.chat.id == id)
    }

    fn summaries(&self, query: Option<&str>) -> Vec<ChatSummary> {
        let needle = query.map(str::to_lowercase);
        let mut matching: Vec<&StoredChat> = self
            .chats
            .iter()
            .filter(|stored| match &needle {
                None => true,
                Some(needle) => {
                    stored
                        .chat
                        .title
                        .as_deref()
                        .is_some_and(|t| t.to_lowercase().contains(needle))
                        || stored
                            .chat
                            .messages
                            .iter()
                            .any(|m| m.content.to_lowercase().contains(needle))
                }
            })
            .collect();
        matching.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        matching
            .into_iter()
            .map(|stored| ChatSummary {
                id: stored.chat.id,
                title: stored.chat.title.clone(),
                last_message_at: stored.last_message_at,
            })
            .collect()
    }

    fn current_model(&self) -> String {
        self.active
            .and_then(|id| self.stored(id))
            .map(|stored| stored.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    fn create_chat(&mut self, kind: String, model: String) -> Result<ChatId, BackendError> {
        if kind.trim().is_empty() {
            return Err(BackendError::rejected("a chat type is required"));
        }
        if model.trim().is_empty() {
            return Err(BackendError::rejected("a model is required"));
        }
        let id = ChatId::new();
        self.chats.push(StoredChat {
            chat: Chat {
                id,
                title: None,
                messages: Vec::new(),
            },
            model,
            last_message_at: Utc::now(),
        });
        Ok(id)
    }

    fn regenerate_title(&mut self, id: ChatId) -> Option<String> {
        let stored = self.stored_mut(id)?;
        let first_user = stored
            .chat
            .messages
            .iter()
            .find(|m| matches!(m.role, Role::User))?;
        let title: String = first_user
            .content
            .split_whitespace()
            .take(6)
            .collect::<Vec<_>>()
            .join(" ");
        if title.is_empty() {
            return None;
        }
        stored.chat.title = Some(title.clone());
        Some(title)
    }

    fn start_generation(&mut self, text: String) -> Result<(), BackendError> {
        if self
            .generation
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            return Err(BackendError::rejected("a generation is already running"));
        }
        let Some(id) = self.active else {
            return Err(BackendError::rejected("no active chat"));
        };
        let model = self.current_model();

        let stored = self.stored_mut(id).ok_or(BackendError::NotFound)?;
        stored.chat.messages.push(Message::new(
            Role::User,
            std::env::var("USER").ok(),
            text.clone(),
        ));
        stored.last_message_at = Utc::now();

        self.cancel.store(false, Ordering::Relaxed);
        let cancel = Arc::clone(&self.cancel);
        let push = self.push.clone();
        let done = self.done_tx.clone();
        self.generation = Some(tokio::spawn(async move {
            let (produced, completed) = generate(&text, &push, &cancel).await;
            let _ = done.send(GenerationDone {
                chat_id: id,
                text: produced,
                model,
                completed,
            });
        }));
        Ok(())
    }

    /// Store the finished (or stopped) reply. The completion push goes out
    /// only after the message is recorded, so a `get_chat` issued on seeing
    /// `Complete` observes the assistant message.
    fn record_generation(&mut self, done: GenerationDone) {
        match self.stored_mut(done.chat_id) {
            Some(stored) => {
                if !done.text.is_empty() {
                    stored
                        .chat
                        .messages
                        .push(Message::new(Role::Assistant, Some(done.model), done.text));
                    stored.last_message_at = Utc::now();
                }
            }
            None => debug!(chat = %done.chat_id, "generation finished for a deleted chat"),
        }
        if done.completed {
            let _ = self.push.send(PushEvent::Complete);
        }
    }
}

/// Stream a canned reply: a short reasoning segment, then an echo of the
/// prompt, word by word. Checks the cancel flag between chunks and returns
/// whatever was produced plus whether the stream ran to completion.
async fn generate(
    text: &str,
    push: &mpsc::UnboundedSender<PushEvent>,
    cancel: &AtomicBool,
) -> (String, bool) {
    let reply = format!(
        "<think>The user said: {text}</think>You said: **{text}**",
        text = text.trim()
    );
    let mut produced = String::new();

    for (i, word) in reply.split_inclusive(' ').enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return (produced, false);
        }
        if push.send(PushEvent::Chunk(word.to_string())).is_err() {
            return (produced, false);
        }
        produced.push_str(word);
        if i % 4 == 3 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }
    (produced, true)
}

/// Deterministic stand-in for the backend's prompt-enhancement operation.
fn enhance_prompt(draft: &str) -> Result<String, BackendError> {
    let trimmed = draft.trim();
    if trimmed.is_empty() {
        return Err(BackendError::rejected("nothing to enhance"));
    }
    let mut out = String::with_capacity(trimmed.len() + 16);
    let mut chars = trimmed.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(chars.as_str());
    }
    if !out.ends_with(['.', '!', '?']) {
        out.push('.');
    }
    out.push_str(" Be specific and concise.");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge;

    async fn fixture() -> (
        crate::bridge::BackendHandle,
        mpsc::UnboundedReceiver<PushEvent>,
    ) {
        let bridge = bridge::channel();
        spawn(bridge.requests, bridge.push_tx);
        (bridge.handle, bridge.push_rx)
    }

    #[tokio::test]
    async fn create_switch_and_list() {
        let (handle, _push) = fixture().await;
        let id = handle
            .create_chat("general".into(), "echo-small".into())
            .await
            .unwrap();
        handle.switch_chat(id).await.unwrap();

        let chats = handle.list_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, id);
        assert_eq!(chats[0].display_title(), "Untitled chat");
    }

    #[tokio::test]
    async fn create_requires_both_selections() {
        let (handle, _push) = fixture().await;
        let err = handle
            .create_chat("".into(), "echo-small".into())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }

    #[tokio::test]
    async fn generation_streams_chunks_then_completes() {
        let (handle, mut push) = fixture().await;
        let id = handle
            .create_chat("general".into(), "echo-small".into())
            .await
            .unwrap();
        handle.switch_chat(id).await.unwrap();
        handle.start_generation("hello there".into()).await.unwrap();

        let mut full = String::new();
        loop {
            match push.recv().await.expect("stream ended without Complete") {
                PushEvent::Chunk(chunk) => full.push_str(&chunk),
                PushEvent::Complete => break,
            }
        }
        assert!(full.contains("<think>"));
        assert!(full.contains("</think>"));
        assert!(full.contains("hello there"));

        let chat = handle.get_chat(id).await.unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert!(matches!(chat.messages[0].role, Role::User));
        assert!(matches!(chat.messages[1].role, Role::Assistant));
    }

    #[tokio::test]
    async fn generation_without_active_chat_is_rejected() {
        let (handle, _push) = fixture().await;
        let err = handle.start_generation("hi".into()).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }

    #[tokio::test]
    async fn deleting_missing_chat_reports_not_found() {
        let (handle, _push) = fixture().await;
        let err = handle.delete_chat(ChatId::new()).await.unwrap_err();
        assert_eq!(err, BackendError::NotFound);
    }

    #[tokio::test]
    async fn search_filters_by_content() {
        let (handle, mut push) = fixture().await;
        let id = handle
            .create_chat("general".into(), "echo-small".into())
            .await
            .unwrap();
        handle.switch_chat(id).await.unwrap();
        handle
            .start_generation("tell me about rust".into())
            .await
            .unwrap();
        while push.recv().await != Some(PushEvent::Complete) {}

        let hits = handle.search_chats("rust".into()).await.unwrap();
        assert_eq!(hits.len(), 1);
        let misses = handle.search_chats("cobol".into()).await.unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn title_comes_from_first_user_message() {
        let (handle, mut push) = fixture().await;
        let id = handle
            .create_chat("general".into(), "echo-small".into())
            .await
            .unwrap();
        handle.switch_chat(id).await.unwrap();
        handle
            .start_generation("plan a trip to the coast next week".into())
            .await
            .unwrap();
        while push.recv().await != Some(PushEvent::Complete) {}

        let title = handle.regenerate_title(id).await.unwrap();
        assert_eq!(title.as_deref(), Some("plan a trip to the coast"));
    }

    #[test]
    fn enhance_prompt_polishes_the_draft() {
        let out = enhance_prompt("write a haiku").unwrap();
        assert!(out.starts_with("Write a haiku."));
        assert!(enhance_prompt("   ").is_err());
    }
}
