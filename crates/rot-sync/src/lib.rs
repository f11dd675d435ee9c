//! Authoritative scene state: request routing, derived motion and the
//! session that applies, broadcasts and persists each accepted change.

pub mod linkage;
pub mod protocol;
pub mod router;
pub mod session;

pub use protocol::{Outbound, Patch, Ping, Request};
pub use router::{Outcome, Rejection};
pub use session::{SceneSink, Session};
