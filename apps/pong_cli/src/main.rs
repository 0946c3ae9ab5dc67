use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    actions::CONFIRMATION_MESSAGE, ActionOutcome, ActionPlan, ClientContext, CredentialProvider,
    DirectoryDownloadSink, FileCredentialStore, WsEventChannel,
};
use shared::domain::{TournamentId, UserId};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod terminal;

use config::{load_settings, Settings};
use terminal::TerminalUi;

const SOCKET_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "pong_cli", about = "Tournament and friendship actions for the pong site")]
struct Args {
    /// Overrides `api_base_url` from the config file and environment.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Leave a tournament and tell the tournament socket about it.
    LeaveTournament {
        tournament_id: i64,
        /// Full ws(s) URL; derived from the API base when omitted.
        #[arg(long)]
        socket_url: Option<String>,
        #[arg(long)]
        no_socket: bool,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
    DeclineFriend {
        friend_id: i64,
    },
    AcceptFriend {
        friend_id: i64,
    },
    AddFriend {
        friend_id: i64,
    },
    RemoveFriend {
        friend_id: i64,
        #[arg(long, short)]
        yes: bool,
    },
    /// Print pending friend requests as JSON.
    FriendRequests,
    /// Download the account's data export.
    ExportData {
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Manage the locally stored access token.
    Token {
        #[command(subcommand)]
        action: TokenCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    Set { token: String },
    Clear,
    Show,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref());
    if let Some(api_url) = args.api_url {
        settings.api_base_url = api_url;
    }
    let store = Arc::new(FileCredentialStore::new(&settings.token_store));

    match args.command {
        Command::Token { action } => manage_token(&store, action),
        command => run_action(&settings, store, command).await,
    }
}

fn manage_token(store: &FileCredentialStore, action: TokenCommand) -> Result<ExitCode> {
    match action {
        TokenCommand::Set { token } => {
            store.store_token(&token)?;
            println!("Token saved to {}", store.path().display());
        }
        TokenCommand::Clear => {
            if store.clear_token()? {
                println!("Token removed.");
            } else {
                println!("No token stored.");
            }
        }
        TokenCommand::Show => match store.access_token() {
            Some(token) => println!("Token stored ({} characters).", token.bearer().len()),
            None => println!("No token stored."),
        },
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_action(
    settings: &Settings,
    store: Arc<FileCredentialStore>,
    command: Command,
) -> Result<ExitCode> {
    let download_dir = match &command {
        Command::ExportData {
            out_dir: Some(dir), ..
        } => dir.clone(),
        _ => settings.download_dir.clone(),
    };
    let ctx = ClientContext::new(
        settings.api_base_url()?,
        store,
        Arc::new(DirectoryDownloadSink::new(download_dir)),
    );
    let ui = TerminalUi::spawn(&ctx.bus, &ctx.busy);
    let mut socket = None;

    let outcome = match command {
        Command::LeaveTournament {
            tournament_id,
            socket_url,
            no_socket,
            yes,
        } => {
            let tournament_id = TournamentId(tournament_id);
            if !no_socket {
                socket = attach_socket(&ctx, settings, tournament_id, socket_url).await;
            }
            confirm_or_run(&ctx, ActionPlan::leave_tournament(tournament_id), yes).await?
        }
        Command::DeclineFriend { friend_id } => {
            Some(ctx.runner.decline_friend_request(UserId(friend_id)).await)
        }
        Command::AcceptFriend { friend_id } => {
            Some(ctx.runner.accept_friend_request(UserId(friend_id)).await)
        }
        Command::AddFriend { friend_id } => {
            Some(ctx.runner.send_friend_request(UserId(friend_id)).await)
        }
        Command::RemoveFriend { friend_id, yes } => {
            confirm_or_run(&ctx, ActionPlan::remove_friend(UserId(friend_id)), yes).await?
        }
        Command::FriendRequests => {
            let outcome = ctx.runner.list_friend_requests().await;
            if let ActionOutcome::Success { data } = &outcome {
                println!("{}", serde_json::to_string_pretty(data)?);
            }
            Some(outcome)
        }
        Command::ExportData { .. } => {
            Some(ctx.runner.export_user_data(&settings.export_filename).await)
        }
        Command::Token { .. } => anyhow::bail!("token commands are handled before connecting"),
    };
    ctx.runner.projector().detach_channel();
    if let Some(socket) = socket {
        if tokio::time::timeout(SOCKET_CLOSE_TIMEOUT, socket.close())
            .await
            .is_err()
        {
            warn!(url = socket.url(), "tournament socket did not close in time");
        }
    }
    ui.shutdown().await;

    Ok(match outcome {
        Some(outcome) if outcome.is_success() => ExitCode::SUCCESS,
        Some(_) => ExitCode::FAILURE,
        None => {
            println!("Cancelled.");
            ExitCode::SUCCESS
        }
    })
}

/// Runs `plan` directly when `skip_prompt` is set, otherwise behind an
/// "Are you sure?" prompt. `None` means the user declined.
async fn confirm_or_run(
    ctx: &ClientContext,
    plan: ActionPlan,
    skip_prompt: bool,
) -> Result<Option<ActionOutcome>> {
    if skip_prompt {
        return Ok(Some(ctx.runner.run(&plan).await));
    }
    let pending = ctx
        .runner
        .confirm_then_run(ctx.bus.clone(), CONFIRMATION_MESSAGE, plan)
        .context("failed to open confirmation prompt")?;
    Ok(pending.outcome().await)
}

/// Best effort; leaving works without the socket.
async fn attach_socket(
    ctx: &ClientContext,
    settings: &Settings,
    tournament_id: TournamentId,
    socket_url: Option<String>,
) -> Option<Arc<WsEventChannel>> {
    let url = match socket_url {
        Some(url) => url,
        None => match settings.socket_url(tournament_id) {
            Ok(url) => url.to_string(),
            Err(err) => {
                warn!(error = %err, "cannot derive tournament socket url");
                return None;
            }
        },
    };
    match WsEventChannel::connect(&url).await {
        Ok(channel) => {
            info!(url = channel.url(), "tournament socket attached");
            let channel = Arc::new(channel);
            ctx.runner.projector().attach_channel(channel.clone());
            Some(channel)
        }
        Err(err) => {
            warn!(error = %err, "continuing without tournament socket");
            None
        }
    }
}
