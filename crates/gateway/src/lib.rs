pub mod api;
pub mod auth;
pub mod handler;
pub mod lifecycle;
pub mod ops;

pub use api::{build_router, ApiError, App};
pub use handler::{DerivedContext, Handler, HandlerError, Persistence, SyncReply, WorkProduct};
pub use lifecycle::Lifecycle;
