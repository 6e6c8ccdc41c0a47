pub mod events;
pub mod handler;
pub mod hub;
pub mod relay;
pub mod server;
