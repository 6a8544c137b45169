use std::sync::Arc;

use crate::receive::UploadFiler;
use crate::share::SessionController;

// Shared by every handler. Cloned per request, so everything heavy sits behind an Arc
#[derive(Clone)]
pub struct AppState {
    pub controller: SessionController,
    pub filer: Arc<UploadFiler>,
    pub title: Arc<str>,
}

impl AppState {
    pub fn new(controller: SessionController, filer: UploadFiler, title: impl Into<Arc<str>>) -> Self {
        Self {
            controller,
            filer: Arc::new(filer),
            title: title.into(),
        }
    }
}
