//! HTTP API handlers

pub mod health;
pub mod render;
pub mod sse;

pub use health::health_routes;
pub use render::render_routes;
pub use sse::render_event_stream;
