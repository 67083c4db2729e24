pub mod config;
pub mod domain;

pub use domain::conversation::{ConversationRecord, Message, Role};
pub use domain::loan::{Loan, LoanCreate};
