/// Middleware modules for the API server
///
/// - `security`: security response headers
/// - `rate_limit`: per-user token buckets for AI routes

pub mod rate_limit;
pub mod security;
