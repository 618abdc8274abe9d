//! API middleware.
//!
//! - `audit` logs every request with method, path, status and latency.
//! - `cron` guards the tick trigger with a shared secret when one is configured.

pub mod audit;
pub mod cron;
