//! Command handlers

pub mod find;
pub mod record;
pub mod tables;
