//! Accounts and sessions for the people who create chatbots

mod accounts;

pub use accounts::{validate_email, AccountError, Session, User, UserManager, MIN_PASSWORD_LEN};
