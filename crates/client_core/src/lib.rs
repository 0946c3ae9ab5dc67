use std::sync::Arc;

use url::Url;

pub mod actions;
pub mod busy;
pub mod channel;
pub mod confirm;
pub mod credentials;
pub mod events;
pub mod invoker;
pub mod projector;

pub use actions::{ActionPlan, ActionRunner, PendingConfirmation};
pub use busy::{BusyFlag, BusyGuard, BusyIndicator};
pub use channel::{EventChannel, WsEventChannel};
pub use confirm::{Answer, ConfirmationPrompt, PromptHost};
pub use credentials::{Credential, CredentialProvider, FileCredentialStore};
pub use events::{Notification, NotificationSink, Severity, UiEvent, UiEventBus, View, ViewRenderer};
pub use invoker::{ActionDescriptor, ActionOutcome, HttpActionInvoker, RemoteInvoker};
pub use projector::{DirectoryDownloadSink, DownloadSink, Projection, ResultProjector};

pub struct ClientContext {
    pub runner: Arc<ActionRunner>,
    pub busy: Arc<BusyFlag>,
    pub bus: Arc<UiEventBus>,
}

impl ClientContext {
    pub fn new(
        api_base_url: Url,
        credentials: Arc<dyn CredentialProvider>,
        downloads: Arc<dyn DownloadSink>,
    ) -> Self {
        let busy = BusyFlag::new();
        let bus = UiEventBus::new();
        let invoker = Arc::new(HttpActionInvoker::new(
            api_base_url,
            credentials,
            busy.clone(),
        ));
        let projector = Arc::new(ResultProjector::new(bus.clone(), downloads));
        let runner = ActionRunner::new(invoker, bus.clone(), bus.clone(), projector);
        Self { runner, busy, bus }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
