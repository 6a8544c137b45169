//! Operator commands read from stdin.

use std::io::BufRead;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::share::{normalize_selection, SessionController};
use crate::ui::status;

pub const HELP: &str = "Commands: share <path>... | stop | uploads on|off | status | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Share(Vec<PathBuf>),
    Stop,
    Uploads(bool),
    Status,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("`share` needs at least one path")]
    MissingPaths,
    #[error("expected `uploads on` or `uploads off`")]
    BadToggle,
    #[error("unterminated quote")]
    UnterminatedQuote,
}

/// Split on whitespace, keeping double-quoted runs together.
fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quoted {
        return Err(CommandError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let tokens = tokenize(line)?;
    let Some((head, rest)) = tokens.split_first() else {
        return Ok(None);
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "share" => {
            if rest.is_empty() {
                return Err(CommandError::MissingPaths);
            }
            Command::Share(rest.iter().map(PathBuf::from).collect())
        }
        "stop" => Command::Stop,
        "uploads" => match rest {
            [arg] if arg.eq_ignore_ascii_case("on") => Command::Uploads(true),
            [arg] if arg.eq_ignore_ascii_case("off") => Command::Uploads(false),
            _ => return Err(CommandError::BadToggle),
        },
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Run a command against the controller. Returns `false` when the operator asked to quit.
pub fn execute(controller: &SessionController, command: Command) -> bool {
    match command {
        Command::Share(paths) => {
            let selection = match normalize_selection(paths) {
                Ok(selection) => selection,
                Err(err) => {
                    println!("Cannot share: {err}");
                    return true;
                }
            };
            let multiple = selection.len() > 1 || selection.iter().any(|p| p.is_dir());
            if multiple && !controller.can_share_multiple() {
                println!("No archiver available, only single files can be shared.");
                return true;
            }
            if let Err(err) = controller.start_sharing(selection) {
                println!("Cannot share: {err}");
            }
        }
        Command::Stop => controller.stop_sharing(),
        Command::Uploads(allowed) => controller.set_uploads_allowed(allowed),
        Command::Status => println!("{}", status::render(&controller.snapshot())),
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
    }
    true
}

/// Read commands until `quit` (which cancels `token`), end of input, or cancellation.
///
/// Stdin is read on a dedicated thread so a pending read never holds up runtime shutdown.
pub fn spawn_console(
    controller: SessionController,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let reader = std::thread::Builder::new()
        .name("ffs-console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Failed to read console input");
                        break;
                    }
                }
            }
        });
    if let Err(err) = reader {
        tracing::warn!(error = %err, "Console unavailable");
    }

    tokio::spawn(async move {
        loop {
            let line = tokio::select! {
                _ = token.cancelled() => break,
                line = rx.recv() => line,
            };
            // End of input (detached or piped from /dev/null): keep serving
            let Some(line) = line else { break };

            match parse_command(&line) {
                Ok(Some(command)) => {
                    if !execute(&controller, command) {
                        tracing::info!("Quit requested from console");
                        token.cancel();
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => println!("{err}. {HELP}"),
            }
        }
    })
}
