//! Courtside realtime notifier: receives platform notifications over
//! Socket.IO and presents them as toasts on a local overlay page.

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod console;
pub mod events;
pub mod notification;
pub mod server;
pub mod session;
pub mod shutdown;

pub use bootstrap::{init_foundation, spawn_background_tasks};
