//! Utility functions

pub mod file;
pub mod retry;
pub mod string;
