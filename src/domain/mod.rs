pub mod auth;
pub mod group;
pub mod message;
pub mod notification;
pub mod thread;
