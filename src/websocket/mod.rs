// WebSocket transport: routes and the per-connection socket pump.

mod connection;
mod routes;

pub use routes::create_router;
