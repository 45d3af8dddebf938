//! Forensic audio analysis service.
//!
//! Turns one uploaded recording into a classification plus per-category
//! stems by driving two external analysis engines in sequence. When either
//! engine fails the caller still receives a complete, clearly marked
//! simulated result.

pub mod api;
pub mod config;
pub mod engines;
pub mod errors;
pub mod pipeline;
pub mod temp;
pub mod utils;
