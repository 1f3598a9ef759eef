// src/utils/mod.rs

pub mod csv_import;
pub mod hash;
pub mod html;
pub mod jwt;
pub mod scoring;
pub mod selection;
pub mod timing;
pub mod topic_name;
