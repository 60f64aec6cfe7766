//! HTTP surface: health endpoint and the WebSocket upgrade route

mod routes;

pub use routes::build_router;
