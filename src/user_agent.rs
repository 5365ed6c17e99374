//! User-Agent string sent with every request.

/// Default User-Agent for all requests: `fastget/<crate version>`.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("fastget/{version}")
}
