//! Persistence behind traits.
//!
//! Every repository has a PostgreSQL implementation holding the shared pool.
//! Handlers and services only see the traits.

pub mod checklist;
pub mod question;
pub mod session;
pub mod store;
pub mod user;

pub use checklist::{ChecklistRepository, PgChecklistRepository};
pub use question::{PgQuestionRepository, QuestionRepository};
pub use session::{PgSessionRepository, SessionRepository};
pub use store::{PgStoreRepository, StoreRepository};
pub use user::{PgUserRepository, UserRepository};
