use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::confirm::{ConfirmationPrompt, PromptHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Home,
    Header,
    Tournaments,
    Friends,
    FriendRequests,
}

impl View {
    pub const DEFAULT: View = View::Home;

    pub fn route(&self) -> Option<&'static str> {
        match self {
            View::Home => Some("/home"),
            View::Tournaments => Some("/tournaments"),
            View::Friends => Some("/friends"),
            View::Header | View::FriendRequests => None,
        }
    }
}

pub trait ViewRenderer: Send + Sync {
    fn render(&self, view: View);
    fn navigate(&self, view: View);
}

#[derive(Clone)]
pub enum UiEvent {
    Notification(Notification),
    Render(View),
    Navigate(View),
    PromptMounted(Arc<ConfirmationPrompt>),
    PromptUnmounted(Uuid),
}

impl fmt::Debug for UiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiEvent::Notification(n) => f.debug_tuple("Notification").field(n).finish(),
            UiEvent::Render(v) => f.debug_tuple("Render").field(v).finish(),
            UiEvent::Navigate(v) => f.debug_tuple("Navigate").field(v).finish(),
            UiEvent::PromptMounted(p) => f.debug_tuple("PromptMounted").field(&p.id()).finish(),
            UiEvent::PromptUnmounted(id) => f.debug_tuple("PromptUnmounted").field(id).finish(),
        }
    }
}

pub struct UiEventBus {
    events: broadcast::Sender<UiEvent>,
}

impl UiEventBus {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self { events })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: UiEvent) {
        if self.events.send(event).is_err() {
            debug!("ui event dropped: no subscribers");
        }
    }
}

impl NotificationSink for UiEventBus {
    fn notify(&self, notification: Notification) {
        self.publish(UiEvent::Notification(notification));
    }
}

impl ViewRenderer for UiEventBus {
    fn render(&self, view: View) {
        self.publish(UiEvent::Render(view));
    }

    fn navigate(&self, view: View) {
        self.publish(UiEvent::Navigate(view));
    }
}

impl PromptHost for UiEventBus {
    fn mount(&self, prompt: Arc<ConfirmationPrompt>) {
        self.publish(UiEvent::PromptMounted(prompt));
    }

    fn unmount(&self, prompt_id: Uuid) {
        self.publish(UiEvent::PromptUnmounted(prompt_id));
    }
}
