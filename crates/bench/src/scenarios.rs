//! Load scenarios
//!
//! # Terminology
//!
//! - Client: one Unix socket connection
//! - Message: one fixed-width, sequence-tagged write, one line in the log

/// Message widths in bytes
///
/// A width equal to the daemon's buffer capacity keeps one write per line.
pub mod message_widths {
    pub const TINY: usize = 32;
    pub const SHORT: usize = 96;
    pub const LINE: usize = 256;
    pub const PAGE: usize = 4096; // default buffer capacity
    pub const ALL: &[usize] = &[TINY, SHORT, LINE, PAGE];
}

/// A named client/message mix
#[derive(Debug, Clone, Copy)]
pub struct LoadScenario {
    pub name: &'static str,
    pub clients: usize,
    pub messages_per_client: u64,
    pub message_width: usize,
}

impl LoadScenario {
    pub const fn total_messages(&self) -> u64 {
        self.clients as u64 * self.messages_per_client
    }

    pub const fn total_bytes(&self) -> u64 {
        self.total_messages() * self.message_width as u64
    }

    /// Look a scenario up by name
    pub fn find(name: &str) -> Option<Self> {
        SCENARIOS.iter().find(|s| s.name == name).copied()
    }
}

/// Standard scenarios
pub const SCENARIOS: &[LoadScenario] = &[
    LoadScenario {
        name: "smoke",
        clients: 3,
        messages_per_client: 100,
        message_width: message_widths::SHORT,
    },
    LoadScenario {
        name: "punish",
        clients: 100,
        messages_per_client: 10_000,
        message_width: message_widths::SHORT,
    },
    LoadScenario {
        name: "wide",
        clients: 16,
        messages_per_client: 10_000,
        message_width: message_widths::PAGE,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_totals() {
        let scenario = LoadScenario::find("smoke").unwrap();
        assert_eq!(scenario.total_messages(), 300);
        assert_eq!(scenario.total_bytes(), 300 * 96);
    }

    #[test]
    fn unknown_scenario() {
        assert!(LoadScenario::find("nope").is_none());
    }

    #[test]
    fn scenario_widths_fit_tag() {
        assert!(
            SCENARIOS
                .iter()
                .all(|s| s.message_width >= logd_client::TAG_LEN)
        );
    }
}
