pub mod ban;
pub mod check;
pub mod completions;
pub mod config;
pub mod replay;
