//! Request and Response models for the cache API
//!
//! DTOs used for serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

pub use requests::{InvalidateRequest, SetRequest};
pub use responses::{
    ApiResponse, DeleteResponse, EntryResponse, HealthData, InvalidateResponse, MessageResponse,
};
