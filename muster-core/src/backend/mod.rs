//! Remote backend over HTTP.
//!
//! [`HttpBackend`] implements the domain services and the remote reader
//! against the server's JSON API. Every failure is mapped onto
//! [`ServiceError`](crate::error::ServiceError) so callers never see
//! transport types.

mod classify;
mod http;
mod unconfigured;
mod url;

pub use classify::{classify_status, classify_transport};
pub use http::{HttpBackend, Identity, DEFAULT_REQUEST_TIMEOUT};
pub use unconfigured::Unconfigured;
pub use url::{build_http_url, build_ws_url};
