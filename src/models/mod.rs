pub mod conversation;
pub mod habit;
pub mod journal;
pub mod mood;
pub mod user;
