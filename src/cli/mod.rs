pub mod app;
pub mod check_update;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod menu;
pub mod output;
pub mod runtime;
pub mod watch;
