mod error;
mod journal;
mod ledger;
mod money;
mod transaction;
mod wallet;

pub use error::*;
pub use journal::*;
pub use ledger::*;
pub use money::*;
pub use transaction::*;
pub use wallet::*;
