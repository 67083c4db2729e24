pub mod conversation;
pub mod loan;
