pub mod assigner;
pub mod history;
pub mod ledger;
pub mod session;
pub mod spec;

pub use assigner::SpecAssigner;
pub use history::{DurationEstimate, DurationHistory, DurationRecord};
pub use ledger::SpecLedger;
pub use session::{ClaimOutcome, Completion, FinishOutcome, Session};
pub use spec::{Spec, SpecStatus};
