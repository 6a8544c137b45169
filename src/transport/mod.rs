pub mod local;
pub mod nat;
pub mod probe;
