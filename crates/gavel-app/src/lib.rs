pub mod app;
pub mod http;
pub mod sync;
pub mod timers;
pub mod view;
