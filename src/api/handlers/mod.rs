//! Route handlers for the HTTP and WebSocket surface.

pub mod auth;
pub mod health;
pub mod ws;
