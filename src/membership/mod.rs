pub mod ledger;

pub use ledger::{DynMembershipLedger, MembershipLedger, SqliteMembershipLedger};
