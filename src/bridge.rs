//! Typed request/response bridge between the UI and the backend task.
//!
//! Every operation the UI consumes is a [`BackendRequest`] variant carrying a
//! oneshot reply sender; [`BackendHandle`] wraps the request channel with one
//! async method per operation. Streaming output travels the other way on a
//! separate push channel the UI drains every loop tick.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::events::{Chat, ChatId, ChatSummary, ChoiceItem, PushEvent};

/// Failure taxonomy for backend calls. Not-found gets a notice-and-redirect,
/// rejections get a blocking alert with the backend's message, and a closed
/// bridge is surfaced like any other rejection. No retries anywhere.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("chat not found")]
    NotFound,
    #[error("{0}")]
    Rejected(String),
    #[error("backend is not responding")]
    Closed,
}

impl BackendError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// One request to the backend. Fire-and-forget operations carry no reply
/// sender; everything else answers exactly once on its oneshot.
#[derive(Debug)]
pub enum BackendRequest {
    ListChats {
        reply: oneshot::Sender<Vec<ChatSummary>>,
    },
    GetChat {
        id: ChatId,
        reply: oneshot::Sender<Result<Chat, BackendError>>,
    },
    SearchChats {
        query: String,
        reply: oneshot::Sender<Vec<ChatSummary>>,
    },
    CreateChat {
        kind: String,
        model: String,
        reply: oneshot::Sender<Result<ChatId, BackendError>>,
    },
    DeleteChat {
        id: ChatId,
        reply: oneshot::Sender<Result<(), BackendError>>,
    },
    SwitchChat {
        id: ChatId,
        reply: oneshot::Sender<Result<(), BackendError>>,
    },
    ChatTypes {
        reply: oneshot::Sender<Vec<ChoiceItem>>,
    },
    AvailableModels {
        reply: oneshot::Sender<Vec<ChoiceItem>>,
    },
    Username {
        reply: oneshot::Sender<String>,
    },
    CurrentModelName {
        reply: oneshot::Sender<String>,
    },
    AppTitle {
        reply: oneshot::Sender<String>,
    },
    RegenerateTitle {
        id: ChatId,
        reply: oneshot::Sender<Option<String>>,
    },
    EnhancePrompt {
        draft: String,
        reply: oneshot::Sender<Result<String, BackendError>>,
    },
    StartGeneration {
        text: String,
        reply: oneshot::Sender<Result<(), BackendError>>,
    },
    StopGeneration,
    MinimizeApp,
    StopApp,
    MoveWindow {
        dx: i32,
        dy: i32,
    },
}

/// Everything produced by [`channel`]: the UI keeps `handle` and `push_rx`,
/// the backend task takes `requests` and `push_tx`.
pub struct Bridge {
    pub handle: BackendHandle,
    pub requests: mpsc::UnboundedReceiver<BackendRequest>,
    pub push_tx: mpsc::UnboundedSender<PushEvent>,
    pub push_rx: mpsc::UnboundedReceiver<PushEvent>,
}

pub fn channel() -> Bridge {
    let (request_tx, requests) = mpsc::unbounded_channel();
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    Bridge {
        handle: BackendHandle { tx: request_tx },
        requests,
        push_tx,
        push_rx,
    }
}

/// Cloneable UI-side handle to the backend.
#[derive(Clone)]
pub struct BackendHandle {
    tx: mpsc::UnboundedSender<BackendRequest>,
}

impl BackendHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> BackendRequest,
    ) -> Result<T, BackendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| BackendError::Closed)?;
        rx.await.map_err(|_| BackendError::Closed)
    }

    fn fire(&self, request: BackendRequest) {
        // Best-effort by contract: the UI never waits on these.
        let _ = self.tx.send(request);
    }

    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>, BackendError> {
        self.call(|reply| BackendRequest::ListChats { reply }).await
    }

    pub async fn get_chat(&self, id: ChatId) -> Result<Chat, BackendError> {
        self.call(|reply| BackendRequest::GetChat { id, reply })
            .await?
    }

    pub async fn search_chats(&self, query: String) -> Result<Vec<ChatSummary>, BackendError> {
        self.call(|reply| BackendRequest::SearchChats { query, reply })
            .await
    }

    pub async fn create_chat(&self, kind: String, model: String) -> Result<ChatId, BackendError> {
        self.call(|reply| BackendRequest::CreateChat { kind, model, reply })
            .await?
    }

    pub async fn delete_chat(&self, id: ChatId) -> Result<(), BackendError> {
        self.call(|reply| BackendRequest::DeleteChat { id, reply })
            .await?
    }

    pub async fn switch_chat(&self, id: ChatId) -> Result<(), BackendError> {
        self.call(|reply| BackendRequest::SwitchChat { id, reply })
            .await?
    }

    pub async fn chat_types(&self) -> Result<Vec<ChoiceItem>, BackendError> {
        self.call(|reply| BackendRequest::ChatTypes { reply }).await
    }

    pub async fn available_models(&self) -> Result<Vec<ChoiceItem>, BackendError> {
        self.call(|reply| BackendRequest::AvailableModels { reply })
            .await
    }

    pub async fn username(&self) -> Result<String, BackendError> {
        self.call(|reply| BackendRequest::Username { reply }).await
    }

    pub async fn current_model_name(&self) -> Result<String, BackendError> {
        self.call(|reply| BackendRequest::CurrentModelName { reply })
            .await
    }

    pub async fn app_title(&self) -> Result<String, BackendError> {
        self.call(|reply| BackendRequest::AppTitle { reply }).await
    }

    pub async fn regenerate_title(&self, id: ChatId) -> Result<Option<String>, BackendError> {
        self.call(|reply| BackendRequest::RegenerateTitle { id, reply })
            .await
    }

    pub async fn enhance_prompt(&self, draft: String) -> Result<String, BackendError> {
        self.call(|reply| BackendRequest::EnhancePrompt { draft, reply })
            .await?
    }

    pub async fn start_generation(&self, text: String) -> Result<(), BackendError> {
        self.call(|reply| BackendRequest::StartGeneration { text, reply })
            .await?
    }

    /// Ask the backend to halt production. The UI updates immediately and
    /// does not wait for acknowledgment.
    pub fn stop_generation(&self) {
        self.fire(BackendRequest::StopGeneration);
    }

    pub fn minimize_app(&self) {
        self.fire(BackendRequest::MinimizeApp);
    }

    pub fn stop_app(&self) {
        self.fire(BackendRequest::StopApp);
    }

    pub fn move_window(&self, dx: i32, dy: i32) {
        self.fire(BackendRequest::MoveWindow { dx, dy });
    }
}
