pub mod checklist;
pub mod identity;
pub mod question;
pub mod role;
pub mod session;
pub mod store;
pub mod user;
