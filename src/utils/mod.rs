//! Utility functions shared across layers.
//!
//! - [`code_generator`] - fixed-width short code encoding
//! - [`url_validator`] - original URL and short-URL host checks

pub mod code_generator;
pub mod url_validator;
