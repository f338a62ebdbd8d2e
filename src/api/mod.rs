//! API Module
//!
//! HTTP front-end for the relay.
//!
//! # Endpoints
//! - `POST /resolve` - Resolve a link into media items
//! - `GET /stats` - Cache, queue and usage counters
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
