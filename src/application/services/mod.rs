//! Business logic services for the application layer.

pub mod code_generator;
pub mod shortened_url_service;

pub use code_generator::CodeGenerator;
pub use shortened_url_service::{
    MAX_CREATE_ATTEMPTS, ShortenUrl, ShortenedUrlService, ShortenedUrlView,
};
