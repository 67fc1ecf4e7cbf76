//! Shared load scenarios for logd
//!
//! Named client/message mixes used by the `loadtest` binary so runs on
//! different machines are comparable.

mod scenarios;

pub use scenarios::{LoadScenario, SCENARIOS, message_widths};
