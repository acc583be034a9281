//! Validation of original URLs and construction of short URLs.

use url::Url;

/// Errors raised while validating URLs.
#[derive(Debug, thiserror::Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(String),

    #[error("Only HTTP and HTTPS protocols are allowed")]
    UnsupportedProtocol,

    #[error("Invalid short URL host: {0}")]
    InvalidHost(String),
}

/// Checks that `input` is an absolute HTTP(S) URL with a host.
///
/// The URL is stored exactly as given; this only rejects unusable input such
/// as `javascript:` or relative paths.
pub fn validate_original_url(input: &str) -> Result<(), UrlValidationError> {
    let url = Url::parse(input).map_err(|e| UrlValidationError::InvalidFormat(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(UrlValidationError::UnsupportedProtocol),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(UrlValidationError::InvalidFormat("missing host".to_string()));
    }

    Ok(())
}

/// Validates the caller's request context and returns `{scheme}://{host}`.
///
/// `host` may carry a port and a trailing slash, but no path.
pub fn short_url_base(scheme: &str, host: &str) -> Result<String, UrlValidationError> {
    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(UrlValidationError::UnsupportedProtocol);
    }

    let host = host.trim().trim_end_matches('/');
    if host.is_empty() || host.contains('/') {
        return Err(UrlValidationError::InvalidHost(host.to_string()));
    }

    Url::parse(&format!("{scheme}://{host}/"))
        .map_err(|e| UrlValidationError::InvalidHost(format!("{host}: {e}")))?;

    Ok(format!("{scheme}://{host}"))
}
