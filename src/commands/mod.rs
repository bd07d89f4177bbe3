pub mod config;
pub mod slots;
pub mod verify;
