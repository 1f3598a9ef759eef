// src/models/mod.rs

pub mod question;
pub mod test_instance;
pub mod topic;
pub mod user;
