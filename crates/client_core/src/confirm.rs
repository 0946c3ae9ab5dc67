use std::{
    fmt,
    sync::{Arc, Mutex, Weak},
};

use tracing::debug;
use uuid::Uuid;

/// Surface that displays prompts. `unmount` is called exactly once, right
/// before the chosen handler runs.
pub trait PromptHost: Send + Sync {
    fn mount(&self, prompt: Arc<ConfirmationPrompt>);
    fn unmount(&self, prompt_id: Uuid);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

type Handler = Box<dyn FnOnce() + Send>;

struct Handlers {
    on_yes: Handler,
    on_no: Handler,
}

pub struct ConfirmationPrompt {
    id: Uuid,
    message: String,
    host: Weak<dyn PromptHost>,
    handlers: Mutex<Option<Handlers>>,
}

impl ConfirmationPrompt {
    pub fn open(
        host: Arc<dyn PromptHost>,
        message: impl Into<String>,
        on_yes: impl FnOnce() + Send + 'static,
        on_no: impl FnOnce() + Send + 'static,
    ) -> Arc<Self> {
        let prompt = Arc::new(Self {
            id: Uuid::new_v4(),
            message: message.into(),
            host: Arc::downgrade(&host),
            handlers: Mutex::new(Some(Handlers {
                on_yes: Box::new(on_yes),
                on_no: Box::new(on_no),
            })),
        });
        host.mount(Arc::clone(&prompt));
        prompt
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_open(&self) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    pub fn yes(&self) -> bool {
        self.answer(Answer::Yes)
    }

    pub fn no(&self) -> bool {
        self.answer(Answer::No)
    }

    pub fn dismiss(&self) -> bool {
        debug!(prompt_id = %self.id, "confirmation prompt dismissed");
        self.answer(Answer::No)
    }

    /// Fires the matching handler if the prompt is still open. Returns whether
    /// a handler ran; later answers are ignored.
    pub fn answer(&self, answer: Answer) -> bool {
        let Some(handlers) = self
            .handlers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        else {
            return false;
        };

        if let Some(host) = self.host.upgrade() {
            host.unmount(self.id);
        }
        debug!(prompt_id = %self.id, ?answer, "confirmation prompt answered");
        match answer {
            Answer::Yes => (handlers.on_yes)(),
            Answer::No => (handlers.on_no)(),
        }
        true
    }
}

impl fmt::Debug for ConfirmationPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationPrompt")
            .field("id", &self.id)
            .field("message", &self.message)
            .field("open", &self.is_open())
            .finish()
    }
}
