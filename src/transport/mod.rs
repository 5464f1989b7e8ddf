//! The `transport` module is responsible for moving requests to the broker
//! and back over HTTP(S).
//!
//! It defines the request/response types the rest of the crate speaks, the
//! [`Transport`] seam (with the production `reqwest` implementation), the
//! status-code classification applied to every response, and the
//! [`BusSession`] which stamps the current authorization header on each call.

pub mod http;
pub mod session;

pub use http::{
    HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, check_status, timeout_secs,
    with_query,
};
pub use session::BusSession;
