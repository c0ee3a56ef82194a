//! HTTP + WebSocket gateway: webhook ingest endpoints, the realtime
//! operator channel, and process assembly.

pub mod auth;
pub mod broadcast;
pub mod methods;
pub mod server;
pub mod state;
pub mod webhooks;
pub mod ws;

pub use server::{assemble, build_gateway_app, run, spawn_background};
