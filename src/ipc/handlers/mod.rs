pub mod attendance;
pub mod backup_exchange;
pub mod classes;
pub mod core;
pub mod eligibility;
pub mod materi;
pub mod sessions;
pub mod tests;
