//! Command implementations for the logd CLI

pub mod serve;
