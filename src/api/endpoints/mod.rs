//! API endpoint handlers.
//!
//! Handlers are thin: they parse the request, call into `tracking` or
//! `drip`, and map errors through `ApiError`.

pub mod drip;
pub mod health;
pub mod protocols;
