//! noheadache is a small async HTTP framework: a router with `:param` path
//! patterns, an ordered middleware pipeline, and a response surface that
//! takes the headache out of writing JSON, text, redirects and files.  It is
//! based on Tokio and hyper.
//!
//! Every request goes through the same lifecycle: the body is buffered and
//! parsed according to its `Content-Type`, the middleware runs in order, the
//! route is looked up, and the handler completes the response.  Anything that
//! goes wrong along the way is turned into a JSON error response (a `404`
//! for unknown routes, a `500` for everything else), and logged.
//!
//! # Getting Started
//! To get started, just add noheadache and tokio to your `Cargo.toml`:
//!
//! ```toml
//! noheadache = "0.1.0"
//! tokio = { version = "1.26.0", features = ["full"] } # or whatever the latest version is
//! ```
//!
//! # Examples
//! ```rust,no_run
//! use noheadache::{Request, Response};
//!
//! async fn show_user(request: Request, mut response: Response) -> Result<(), anyhow::Error> {
//!     let id = request.param("id").unwrap_or_default();
//!     response.json(&serde_json::json!({ "user": { "id": id } }))?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), anyhow::Error> {
//!     let mut http = noheadache::http();
//!     http.with(noheadache::middleware::TraceMiddleware::new())
//!         .get("/users/:id", show_user);
//!     http.listen_with("0.0.0.0:8080", |address| println!("listening on {}", address))
//!         .await?;
//!     Ok(())
//! }
//! ```
#![deny(clippy::correctness)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
extern crate async_trait;

mod data;
pub mod discovery;
mod endpoint;
pub mod endpoints;
mod error;
pub mod middleware;
mod payload;
mod request;
mod response;
mod router;

pub use self::endpoint::{Endpoint, IntoOutcome};
pub use self::error::{BodyParseError, DispatchError};
pub use self::middleware::{Flow, Middleware};
pub use self::payload::Payload;
pub use self::request::{Params, Query, QueryValue, Request};
pub use self::response::Response;
pub use self::router::{match_path, Path, Router};
pub use ::http;
pub use hyper::Body;

/// A result type for this crate's fallible operations.
pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

#[must_use]
#[inline]
/// This creates a new HTTP router.  This is a shortcut for [`Router::default`].
pub fn http() -> Router {
    Router::default()
}
