//! # Family Health API Server Library
//!
//! Core of the family health server, split out of the binary so
//! integration tests can build the router directly.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration from the environment
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Request extractors (current user, family scope, request metadata)
//! - `middleware`: Rate limiting, admin gate and security headers
//! - `routes`: API route handlers
//! - `services`: AI client, prompts, file storage and audit logging

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod services;
