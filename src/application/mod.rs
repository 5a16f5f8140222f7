// Application layer - use cases and orchestration.
// The service owns the in-memory ledger; custody and storage are supplied
// by the host process.

pub mod custody;
pub mod error;
pub mod service;

pub use custody::*;
pub use error::*;
pub use service::*;
