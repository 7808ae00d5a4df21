//! Command implementations for strata-cmd

pub mod convert;
pub mod layout;
