//! Terminal front end: prints toasts, shows a spinner while a request is in
//! flight and answers confirmation prompts from stdin.

use std::{
    io::{self, BufRead, Write},
    sync::Arc,
    time::Duration,
};

use client_core::{BusyFlag, ConfirmationPrompt, Notification, UiEvent, UiEventBus, View};
use tokio::{
    sync::{broadcast::error::RecvError, oneshot, watch},
    task::JoinHandle,
    time,
};
use tracing::{debug, info, warn};

const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const LOADING_LABEL: &str = "Loading...";

pub struct TerminalUi {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TerminalUi {
    /// Subscribes before returning, so every event published afterwards is seen.
    pub fn spawn(bus: &UiEventBus, busy: &BusyFlag) -> Self {
        let events = bus.subscribe();
        let busy = busy.subscribe();
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(run(events, busy, stopped));
        Self { stop, task }
    }

    /// Prints whatever is still queued and stops the UI task.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "terminal ui task failed");
        }
    }
}

async fn run(
    mut events: tokio::sync::broadcast::Receiver<UiEvent>,
    mut busy: watch::Receiver<bool>,
    mut stopped: oneshot::Receiver<()>,
) {
    let mut ticker = time::interval(Duration::from_millis(120));
    let mut frame = 0usize;
    let mut spinning = false;
    let mut busy_open = true;

    loop {
        tokio::select! {
            biased;
            _ = &mut stopped => break,
            event = events.recv() => match event {
                Ok(event) => {
                    clear_spinner(&mut spinning);
                    present(event);
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "terminal ui fell behind"),
                Err(RecvError::Closed) => break,
            },
            changed = busy.changed(), if busy_open => {
                if changed.is_err() {
                    busy_open = false;
                    clear_spinner(&mut spinning);
                } else if !*busy.borrow_and_update() {
                    clear_spinner(&mut spinning);
                }
            }
            _ = ticker.tick(), if busy_open && *busy.borrow() => {
                eprint!("\r{} {LOADING_LABEL}", SPINNER_FRAMES[frame % SPINNER_FRAMES.len()]);
                let _ = io::stderr().flush();
                frame = frame.wrapping_add(1);
                spinning = true;
            }
        }
    }

    clear_spinner(&mut spinning);
    while let Ok(event) = events.try_recv() {
        present(event);
    }
}

fn clear_spinner(spinning: &mut bool) {
    if std::mem::take(spinning) {
        eprint!("\r\x1b[K");
        let _ = io::stderr().flush();
    }
}

fn present(event: UiEvent) {
    match event {
        UiEvent::Notification(notification) => eprintln!("{}", format_notification(&notification)),
        UiEvent::Render(view) => info!(view = ?view, "view refreshed"),
        UiEvent::Navigate(view) => info!(route = route_of(view), "navigated"),
        UiEvent::PromptMounted(prompt) => {
            tokio::task::spawn_blocking(move || ask(&prompt));
        }
        UiEvent::PromptUnmounted(id) => debug!(prompt_id = %id, "prompt closed"),
    }
}

fn route_of(view: View) -> &'static str {
    view.route().unwrap_or("(fragment)")
}

pub fn format_notification(notification: &Notification) -> String {
    format!("[{}] {}", notification.severity, notification.message)
}

fn ask(prompt: &Arc<ConfirmationPrompt>) {
    eprint!("{} [y/N] ", prompt.message());
    let _ = io::stderr().flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => {
            eprintln!();
            prompt.dismiss();
        }
        Ok(_) if is_yes(&line) => {
            prompt.yes();
        }
        Ok(_) => {
            prompt.no();
        }
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
