//! The HTML form page served at `/` and alongside most outcomes.

use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use maud::{html, Markup, DOCTYPE};

use crate::server::AppState;
use crate::share::{LifecycleState, SharingSession};

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'none'; form-action 'self'; base-uri 'none'; frame-ancestors 'none'";

/// One-line message shown under the upload or download section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    None,
    UploadSucceeded,
    UploadFailed,
    DownloadNotFound,
    PreparingDownload,
    DownloadFailed,
}

impl Notice {
    fn upload_text(self) -> Option<&'static str> {
        match self {
            Notice::UploadSucceeded => Some("Your file was uploaded successfully."),
            Notice::UploadFailed => Some("Your upload failed."),
            _ => None,
        }
    }

    fn download_text(self) -> Option<&'static str> {
        match self {
            Notice::DownloadNotFound => Some("The file you requested does not seem to exist."),
            Notice::DownloadFailed => Some("The file you requested seems to have disappeared."),
            _ => None,
        }
    }
}

fn hardening_headers() -> [(header::HeaderName, &'static str); 4] {
    [
        (header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::REFERRER_POLICY, "no-referrer"),
    ]
}

pub fn render_form(title: &str, notice: Notice, session: &SharingSession) -> Markup {
    let offered = session
        .resource_name()
        .filter(|_| session.lifecycle != LifecycleState::Broken);

    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (title) }
            }
            body {
                h1 { "Hello, this is " (title) }

                @if session.uploads_allowed {
                    h2 { "You can upload a file" }
                    form action="/" enctype="multipart/form-data" method="post" {
                        p {
                            input type="file" name="file" size="20";
                            " "
                            input type="submit" value="Upload";
                        }
                    }
                    @if let Some(text) = notice.upload_text() {
                        p { (text) }
                    }
                }

                @if let Some(name) = offered {
                    h2 { "A file is available for download" }
                    p {
                        a href="/1" { (name) }
                        @if session.lifecycle == LifecycleState::Preparing {
                            " (archive is being prepared, try again soon)"
                        }
                    }
                } @else {
                    h2 { "No downloads are available" }
                }
                @if let Some(text) = notice.download_text() {
                    p { (text) }
                }
            }
        }
    }
}

/// Form page reflecting the current session, with the given status.
pub fn form_response(state: &AppState, status: StatusCode, notice: Notice) -> Response {
    let session = state.controller.snapshot();
    let markup = render_form(&state.title, notice, &session);
    (status, hardening_headers(), Html(markup.into_string())).into_response()
}
