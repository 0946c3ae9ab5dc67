use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde_json::json;
use shared::{
    domain::{FriendshipAction, TournamentId, UserId},
    protocol::{
        FriendRequest, FriendshipActionRequest, LeaveTournamentRequest, SocketEvent,
        DATA_EXPORT_PATH, FRIENDSHIP_PATH, FRIEND_REQUESTS_PATH, LEAVE_TOURNAMENT_PATH,
    },
};
use tokio::{runtime::Handle, sync::oneshot};
use tracing::{error, info, warn};

use crate::{
    confirm::{ConfirmationPrompt, PromptHost},
    events::{Notification, NotificationSink, View, ViewRenderer},
    invoker::{ActionDescriptor, ActionOutcome, RemoteInvoker},
    projector::{Projection, ResultProjector},
};

pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred. Please, try again.";
pub const CONFIRMATION_MESSAGE: &str = "Are you sure?";
pub const EXPORT_FILENAME: &str = "user_data.json";

#[derive(Debug, Clone)]
pub struct ActionPlan {
    pub name: &'static str,
    pub descriptor: ActionDescriptor,
    pub on_success: Vec<Projection>,
    pub success_message: Option<String>,
    /// Shown for transport failures; HTTP rejections show the server message.
    pub failure_message: String,
    pub failure_view: Option<View>,
}

impl ActionPlan {
    pub fn new(name: &'static str, descriptor: ActionDescriptor) -> Self {
        Self {
            name,
            descriptor,
            on_success: Vec::new(),
            success_message: None,
            failure_message: GENERIC_ERROR_MESSAGE.to_string(),
            failure_view: None,
        }
    }

    pub fn then(mut self, projection: Projection) -> Self {
        self.on_success.push(projection);
        self
    }

    pub fn announce(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    pub fn on_failure(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }

    pub fn navigate_on_failure(mut self, view: View) -> Self {
        self.failure_view = Some(view);
        self
    }

    pub fn leave_tournament(tournament_id: TournamentId) -> Self {
        let descriptor = ActionDescriptor::post(LEAVE_TOURNAMENT_PATH)
            .with_json(json!(LeaveTournamentRequest { tournament_id }));
        Self::new("leave_tournament", descriptor)
            .then(Projection::Emit(SocketEvent::user_left()))
            .then(Projection::Render(View::Header))
            .then(Projection::Render(View::Tournaments))
            .on_failure("An error occurred while leaving the tournament.")
    }

    pub fn decline_friend_request(friend_id: UserId) -> Self {
        Self::friendship_answer("decline_friend_request", friend_id, FriendshipAction::Decline)
            .on_failure("Failed to decline friend request")
    }

    pub fn accept_friend_request(friend_id: UserId) -> Self {
        Self::friendship_answer("accept_friend_request", friend_id, FriendshipAction::Accept)
            .on_failure("Failed to accept friend request")
    }

    pub fn send_friend_request(friend_id: UserId) -> Self {
        let descriptor =
            ActionDescriptor::post(FRIENDSHIP_PATH).with_json(json!(FriendRequest { friend_id }));
        Self::new("send_friend_request", descriptor)
            .announce("Friend request sent.")
            .on_failure("Failed to send friend request")
    }

    pub fn remove_friend(friend_id: UserId) -> Self {
        let descriptor =
            ActionDescriptor::delete(FRIENDSHIP_PATH).with_json(json!(FriendRequest { friend_id }));
        Self::new("remove_friend", descriptor)
            .then(Projection::Render(View::Friends))
            .announce("Friend removed.")
            .on_failure("Failed to remove friend")
    }

    pub fn list_friend_requests() -> Self {
        Self::new("list_friend_requests", ActionDescriptor::get(FRIEND_REQUESTS_PATH))
            .on_failure("Failed to load friend requests")
    }

    pub fn export_user_data(filename: impl Into<String>) -> Self {
        Self::new("export_user_data", ActionDescriptor::post(DATA_EXPORT_PATH))
            .then(Projection::Download {
                filename: filename.into(),
            })
            .navigate_on_failure(View::DEFAULT)
    }

    fn friendship_answer(name: &'static str, friend_id: UserId, action: FriendshipAction) -> Self {
        let descriptor = ActionDescriptor::patch(FRIENDSHIP_PATH)
            .with_json(json!(FriendshipActionRequest { friend_id, action }));
        Self::new(name, descriptor).then(Projection::Render(View::FriendRequests))
    }
}

pub struct ActionRunner {
    invoker: Arc<dyn RemoteInvoker>,
    notifications: Arc<dyn NotificationSink>,
    views: Arc<dyn ViewRenderer>,
    projector: Arc<ResultProjector>,
}

impl ActionRunner {
    pub fn new(
        invoker: Arc<dyn RemoteInvoker>,
        notifications: Arc<dyn NotificationSink>,
        views: Arc<dyn ViewRenderer>,
        projector: Arc<ResultProjector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            invoker,
            notifications,
            views,
            projector,
        })
    }

    pub fn projector(&self) -> &ResultProjector {
        &self.projector
    }

    pub async fn run(&self, plan: &ActionPlan) -> ActionOutcome {
        let action = plan.name;
        info!(action, "running action");
        let outcome = self.invoker.invoke(&plan.descriptor).await;

        match &outcome {
            ActionOutcome::Success { data } => {
                if let Err(err) = self.projector.project(data, &plan.on_success) {
                    error!(action, error = %err, "failed to apply action result");
                    self.leave_failed_view(plan);
                    self.notifications
                        .notify(Notification::error(GENERIC_ERROR_MESSAGE));
                } else if let Some(message) = &plan.success_message {
                    self.notifications.notify(Notification::info(message.clone()));
                }
            }
            ActionOutcome::HttpError { message, .. } => {
                self.notifications.notify(Notification::error(message.clone()));
            }
            ActionOutcome::NetworkError { cause } => {
                warn!(action, cause, "action failed before a usable response");
                self.leave_failed_view(plan);
                self.notifications
                    .notify(Notification::error(plan.failure_message.clone()));
            }
            ActionOutcome::AuthError => {
                self.views.navigate(View::DEFAULT);
                self.notifications
                    .notify(Notification::error(GENERIC_ERROR_MESSAGE));
            }
        }
        outcome
    }

    fn leave_failed_view(&self, plan: &ActionPlan) {
        if let Some(view) = plan.failure_view {
            self.views.navigate(view);
        }
    }

    pub async fn leave_tournament(&self, tournament_id: TournamentId) -> ActionOutcome {
        self.run(&ActionPlan::leave_tournament(tournament_id)).await
    }

    pub async fn decline_friend_request(&self, friend_id: UserId) -> ActionOutcome {
        self.run(&ActionPlan::decline_friend_request(friend_id)).await
    }

    pub async fn accept_friend_request(&self, friend_id: UserId) -> ActionOutcome {
        self.run(&ActionPlan::accept_friend_request(friend_id)).await
    }

    pub async fn send_friend_request(&self, friend_id: UserId) -> ActionOutcome {
        self.run(&ActionPlan::send_friend_request(friend_id)).await
    }

    pub async fn remove_friend(&self, friend_id: UserId) -> ActionOutcome {
        self.run(&ActionPlan::remove_friend(friend_id)).await
    }

    pub async fn list_friend_requests(&self) -> ActionOutcome {
        self.run(&ActionPlan::list_friend_requests()).await
    }

    pub async fn export_user_data(&self, filename: &str) -> ActionOutcome {
        self.run(&ActionPlan::export_user_data(filename)).await
    }

    /// Mounts a prompt on `host`; answering yes runs `plan` on the current
    /// runtime. Must be called from within a tokio runtime.
    pub fn confirm_then_run(
        self: &Arc<Self>,
        host: Arc<dyn PromptHost>,
        message: impl Into<String>,
        plan: ActionPlan,
    ) -> Result<PendingConfirmation> {
        let runtime = Handle::try_current()
            .context("confirmation prompts must be opened inside a tokio runtime")?;
        let (tx, decision) = oneshot::channel();
        let on_no_tx = Arc::new(Mutex::new(Some(tx)));
        let on_yes_tx = Arc::clone(&on_no_tx);
        let runner = Arc::clone(self);

        let prompt = ConfirmationPrompt::open(
            host,
            message,
            move || {
                runtime.spawn(async move {
                    let outcome = runner.run(&plan).await;
                    resolve(&on_yes_tx, Some(outcome));
                });
            },
            move || resolve(&on_no_tx, None),
        );
        Ok(PendingConfirmation { prompt, decision })
    }

    pub fn confirm_leave_tournament(
        self: &Arc<Self>,
        host: Arc<dyn PromptHost>,
        tournament_id: TournamentId,
    ) -> Result<PendingConfirmation> {
        self.confirm_then_run(
            host,
            CONFIRMATION_MESSAGE,
            ActionPlan::leave_tournament(tournament_id),
        )
    }
}

type DecisionSender = Arc<Mutex<Option<oneshot::Sender<Option<ActionOutcome>>>>>;

fn resolve(tx: &DecisionSender, outcome: Option<ActionOutcome>) {
    if let Some(tx) = tx.lock().unwrap_or_else(|p| p.into_inner()).take() {
        let _ = tx.send(outcome);
    }
}

pub struct PendingConfirmation {
    prompt: Arc<ConfirmationPrompt>,
    decision: oneshot::Receiver<Option<ActionOutcome>>,
}

impl PendingConfirmation {
    pub fn prompt(&self) -> &Arc<ConfirmationPrompt> {
        &self.prompt
    }

    /// `Some` once a confirmed action has finished; `None` if the prompt was
    /// declined, dismissed or dropped unanswered.
    pub async fn outcome(self) -> Option<ActionOutcome> {
        let Self { prompt, decision } = self;
        drop(prompt);
        decision.await.unwrap_or(None)
    }
}

#[cfg(test)]
#[path = "tests/actions_tests.rs"]
mod tests;
