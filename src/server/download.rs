//! Streams the shared resource and settles the download counters.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::share::controller::{DownloadGuard, SessionController, SharedResource};

/// Open the resource fresh and build a streaming attachment response.
///
/// An open failure has already degraded the session when this returns `Err`.
pub async fn serve(
    controller: &SessionController,
    resource: SharedResource,
) -> Result<Response, io::Error> {
    let opened = async {
        let file = tokio::fs::File::open(resource.path()).await?;
        let len = file.metadata().await?.len();
        Ok::<_, io::Error>((file, len))
    }
    .await;

    let (file, len) = match opened {
        Ok(opened) => opened,
        Err(err) => {
            controller.fail_download(&resource, &err);
            return Err(err);
        }
    };

    let disposition = content_disposition(&resource.file_name());
    let guard = controller.begin_download(resource);
    // A file growing mid-transfer must not overrun Content-Length
    let body = TrackedStream::new(ReaderStream::new(file.take(len)), guard, len);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, len)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(body))
        .map_err(io::Error::other)
}

/// `attachment` with an ASCII fallback name and the exact name in RFC 5987 form.
pub fn content_disposition(name: &str) -> HeaderValue {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    let value = format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}");
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Body stream that reports completion, failure or abandonment to the controller.
///
/// Completion is reported once `expected` bytes have been handed out. Ending
/// short of that is a read failure. Dropping early counts as an aborted transfer.
pub struct TrackedStream<S> {
    inner: S,
    guard: Option<DownloadGuard>,
    remaining: u64,
}

impl<S> TrackedStream<S> {
    pub fn new(inner: S, guard: DownloadGuard, expected: u64) -> Self {
        Self {
            inner,
            guard: Some(guard),
            remaining: expected,
        }
    }
}

impl<S> Stream for TrackedStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.remaining = this.remaining.saturating_sub(chunk.len() as u64);
                if this.remaining == 0 {
                    if let Some(guard) = this.guard.take() {
                        guard.complete();
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                if let Some(guard) = this.guard.take() {
                    guard.fail(&err);
                }
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                let Some(guard) = this.guard.take() else {
                    return Poll::Ready(None);
                };
                if this.remaining == 0 {
                    guard.complete();
                    return Poll::Ready(None);
                }
                let err = io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "shared file shrank during transfer",
                );
                guard.fail(&err);
                Poll::Ready(Some(Err(err)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
