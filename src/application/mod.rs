// Application layer - use cases and orchestration.
// Services own the database handle, open transactions around the storage
// stores and publish notifications after commit.

pub mod clock;
pub mod config;
pub mod error;
mod loans;
pub mod notify;
pub mod reporting;
mod service;
mod transfers;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use notify::*;
pub use reporting::*;
pub use service::LedgerService;
pub use transfers::TransferResult;
