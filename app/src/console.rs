//! Terminal commands for driving the session without an overlay page.

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::SharedState;
use crate::config::SettingsManager;

pub const HELP: &str = "\
commands:
  login <token> [--remember]  store a bearer token (persist with --remember)
  logout                      clear the bearer token
  enable | disable            toggle realtime notifications
  dismiss                     hide the toast on screen
  open                        follow the toast's link
  read [id]                   mark a notification read (default: on screen)
  status                      show connection and toast state
  quit                        shut down";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Login { token: String, remember: bool },
    Logout,
    Enable,
    Disable,
    Dismiss,
    Open,
    Read(Option<u64>),
    Status,
    Quit,
    Help,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
    #[error("invalid notification id: {0}")]
    InvalidId(String),
}

impl std::str::FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let name = parts.next().ok_or(ConsoleError::Empty)?;
        let args: Vec<&str> = parts.collect();

        let command = match name.to_ascii_lowercase().as_str() {
            "login" => {
                let mut token = None;
                let mut remember = false;
                for arg in args {
                    match arg {
                        "--remember" | "-r" => remember = true,
                        _ if token.is_none() => token = Some(arg.to_string()),
                        _ => return Err(ConsoleError::UnexpectedArgument(arg.to_string())),
                    }
                }
                let token = token.ok_or(ConsoleError::MissingArgument("token"))?;
                return Ok(Self::Login { token, remember });
            }
            "read" => {
                return match args.as_slice() {
                    [] => Ok(Self::Read(None)),
                    [id] => id
                        .parse()
                        .map(|id| Self::Read(Some(id)))
                        .map_err(|_| ConsoleError::InvalidId(id.to_string())),
                    [_, extra, ..] => Err(ConsoleError::UnexpectedArgument(extra.to_string())),
                };
            }
            "logout" => Self::Logout,
            "enable" => Self::Enable,
            "disable" => Self::Disable,
            "dismiss" => Self::Dismiss,
            "open" => Self::Open,
            "status" => Self::Status,
            "quit" | "exit" => Self::Quit,
            "help" | "?" => Self::Help,
            other => return Err(ConsoleError::Unknown(other.to_string())),
        };

        match args.first() {
            Some(extra) => Err(ConsoleError::UnexpectedArgument(extra.to_string())),
            None => Ok(command),
        }
    }
}

/// Read commands from stdin until EOF, `quit`, or shutdown.
pub async fn run(state: SharedState) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = state.shutdown_token().clone();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Console read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(command) => println!("{}", execute(&state, command).await),
            Err(e) => println!("{e}\n{HELP}"),
        }
    }
    tracing::debug!("Console closed");
}

/// Run one command and describe the result.
pub async fn execute(state: &SharedState, command: ConsoleCommand) -> String {
    let session = state.session();
    match command {
        ConsoleCommand::Login { token, remember } => match state.credentials().login(&token, remember) {
            Ok(()) if remember => "logged in (remembered)".into(),
            Ok(()) => "logged in for this session".into(),
            Err(e) => format!("login failed: {e}"),
        },
        ConsoleCommand::Logout => match state.credentials().logout() {
            Ok(()) => "logged out".into(),
            Err(e) => format!("logout failed: {e}"),
        },
        ConsoleCommand::Enable => set_enabled(state, true).await,
        ConsoleCommand::Disable => set_enabled(state, false).await,
        ConsoleCommand::Dismiss => match session.dismiss() {
            Some(id) => format!("dismissed {id}"),
            None => "nothing on screen".into(),
        },
        ConsoleCommand::Open => {
            if session.open() {
                "opened".into()
            } else {
                "nothing to open".into()
            }
        }
        ConsoleCommand::Read(Some(id)) => format!("{:?}", session.mark_read(id)).to_lowercase(),
        ConsoleCommand::Read(None) => match session.mark_current_read() {
            Some(outcome) => format!("{outcome:?}").to_lowercase(),
            None => "nothing on screen".into(),
        },
        ConsoleCommand::Status => {
            let connection = session.state();
            let toast = session
                .presenter()
                .current()
                .map(|n| format!("#{} {}", n.id, n.title))
                .unwrap_or_else(|| "none".into());
            let mut line = format!(
                "connection: {} | enabled: {} | toast: {} | pending: {}",
                connection.label(),
                session.is_enabled(),
                toast,
                session.presenter().pending()
            );
            if let Some(error) = connection.error() {
                line.push_str(&format!(" | error: {error}"));
            }
            line
        }
        ConsoleCommand::Quit => {
            state.request_shutdown();
            "shutting down".into()
        }
        ConsoleCommand::Help => HELP.into(),
    }
}

async fn set_enabled(state: &SharedState, enabled: bool) -> String {
    let sm = SettingsManager::new(state.db().clone());
    if let Err(e) = sm.set_setting("REALTIME_ENABLED", if enabled { "true" } else { "false" }) {
        tracing::warn!("Failed to persist REALTIME_ENABLED: {e}");
    }
    if let Err(e) = state.reload_config().await {
        tracing::warn!("Failed to reload config: {e}");
    }
    state.session().set_enabled(enabled);
    if enabled { "enabled".into() } else { "disabled".into() }
}
