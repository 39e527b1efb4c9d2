pub mod cli;
pub mod clipboard;
pub mod commands;
pub mod logging;
pub mod server;
