use wp_domain::error::Error;

/// Map a reqwest error into the shared error type, preserving the
/// timeout distinction (the loop treats timeouts as retryable).
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
