//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (worker per connection)
//!     → request.rs (read head + body under limits and deadlines)
//!     → context.rs (correlation id, tried set)
//!     → dispatcher.rs (select, rewrite, forward, fail over)
//!     → response.rs (inject diagnostic headers, or build a 4xx/502)
//!     → Send to client, close
//! ```

pub mod context;
pub mod dispatcher;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use context::ForwardingContext;
pub use dispatcher::{Dispatched, Dispatcher};
pub use headers::HeaderList;
pub use request::ParsedRequest;
pub use server::HttpServer;
