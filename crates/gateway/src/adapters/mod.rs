//! Backend adapters
//!
//! Adapters implement the `beacon-ports` traits against the real backend.

pub mod rest;

pub use rest::RestFetcher;
