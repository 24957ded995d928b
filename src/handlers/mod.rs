pub mod auth;
pub mod conversations;
pub mod habits;
pub mod health;
pub mod journal;
pub mod moods;
