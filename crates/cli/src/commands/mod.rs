pub mod config_cmd;
pub mod extract;
pub mod prompt;
pub mod replay;
