//! Request and Response models for the relay API
//!
//! DTOs used for serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

pub use requests::ResolveRequest;
pub use responses::{
    CacheStatsResponse, ErrorResponse, HealthResponse, MediaItemResponse, NoticeResponse,
    RenderHint, ResolveResponse, StatsResponse,
};
