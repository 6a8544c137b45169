//! Plain-text rendering of the session for the terminal.

use humansize::{format_size, BINARY};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::share::{LifecycleState, Reachability, SharingSession};

/// The "what is shared" line.
pub fn sharing_text(session: &SharingSession) -> String {
    let Some(name) = session.resource_name() else {
        return match session.lifecycle {
            LifecycleState::Broken => "Failed to create the archive.".to_string(),
            _ => "Currently sharing nothing.".to_string(),
        };
    };

    if session.lifecycle == LifecycleState::Preparing {
        return format!("Now preparing '{name}' for sharing");
    }

    let done = session.downloads_completed;
    let progress = match (session.downloads_in_flight > 0, done) {
        (false, 0) => "no downloads yet".to_string(),
        (false, 1) => "downloaded once".to_string(),
        (false, n) => format!("{n} downloads so far"),
        (true, 0) => "download in progress".to_string(),
        (true, 1) => "download in progress, downloaded once already".to_string(),
        (true, n) => format!("download in progress, {n} downloads so far"),
    };
    format!("Sharing '{name}' ({progress})")
}

/// Upload summary, `None` while uploads are off and nothing was received.
pub fn uploads_text(session: &SharingSession) -> Option<String> {
    let size = format_size(session.upload_bytes_total, BINARY);
    match session.uploads_accepted {
        0 if !session.uploads_allowed => None,
        0 => Some("(No uploads yet)".to_string()),
        1 => Some(format!("(One upload so far, {size})")),
        n => Some(format!("({n} uploads so far, totalling {size})")),
    }
}

fn reachability_tag(reachability: Reachability) -> &'static str {
    match reachability {
        Reachability::Unknown => "checking",
        Reachability::Available => "reachable",
        Reachability::Unavailable => "not confirmed",
    }
}

/// Full status block. The external address only appears once confirmed to work.
pub fn render(session: &SharingSession) -> String {
    let mut lines = vec![sharing_text(session)];

    if let Some(local) = session.local_endpoint {
        lines.push(format!(
            "Sharing locally at      http://{local} ({})",
            reachability_tag(session.local_reachability)
        ));
    }
    if let (Reachability::Available, Some(external)) =
        (session.external_reachability, session.external_endpoint)
    {
        lines.push(format!("Sharing on the internet http://{external}"));
    }

    let uploads = if session.uploads_allowed { "on" } else { "off" };
    match uploads_text(session) {
        Some(summary) => lines.push(format!("Allow uploads: {uploads} {summary}")),
        None => lines.push(format!("Allow uploads: {uploads}")),
    }
    if let Some(dir) = &session.upload_dir {
        lines.push(format!("Uploads are saved in {}", dir.display()));
    }

    lines.join("\n")
}

/// Print the status block whenever the session changes.
pub fn spawn_status_printer(
    mut rx: watch::Receiver<SharingSession>,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = String::new();
        loop {
            let text = render(&rx.borrow_and_update());
            // Counter-only changes can render identically
            if text != last {
                println!("\n{text}");
                last = text;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    })
}
