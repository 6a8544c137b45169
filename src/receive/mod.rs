pub mod filer;

pub use filer::{FilerError, PartialUpload, UploadFiler};
