//! CLI command implementations

pub mod check;
pub mod convert;
pub mod validate;
