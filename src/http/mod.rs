//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, one task per connection)
//!     → handler.rs (drives one request through the pipeline)
//!         → request.rs (accumulate and parse one HTTP/1.1 request)
//!         → [rewrite layer adjusts the JSON body]
//!         → forward.rs (send to backend, stream the response back)
//!         → response.rs (400 / 502 when the backend path is unavailable)
//! ```

pub mod forward;
pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use forward::{ForwardError, Forwarder};
pub use handler::ProxyContext;
pub use request::{Headers, IncomingRequest, ReadError, RequestReader};
pub use response::ErrorReply;
pub use server::ProxyServer;
