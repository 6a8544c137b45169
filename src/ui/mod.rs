pub mod console;
pub mod status;

pub use console::spawn_console;
pub use status::spawn_status_printer;
