//! HTTP surfaces: the read-only publisher and the worker health endpoint.

mod health;
mod publisher;

pub use health::health_router;
pub use publisher::publisher_router;

pub(crate) fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
