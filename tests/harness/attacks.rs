// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Attack simulation patterns for security testing.

use submission_guard::RouteClass;

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Route class under attack
    pub route: RouteClass,
    /// Total number of requests to send
    pub total_requests: usize,
    /// Number of distinct network addresses
    pub unique_ips: usize,
    /// Send a browser identifier with each request
    pub send_client_id: bool,
    /// Use a fresh browser identifier on every request
    pub rotate_client_id: bool,
    /// Fraction of requests filling a honeypot field (0.0-1.0)
    pub honeypot_ratio: f64,
    /// Fraction of requests using a throwaway mailbox (0.0-1.0)
    pub disposable_ratio: f64,
    /// Fraction of requests submitted faster than a human could (0.0-1.0)
    pub fast_submit_ratio: f64,
    /// Attach a challenge token
    pub include_challenge: bool,
    /// Attached challenge tokens are ones the service accepts
    pub valid_challenge: bool,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            route: RouteClass::Contact,
            total_requests: 100,
            unique_ips: 1,
            send_client_id: true,
            rotate_client_id: false,
            honeypot_ratio: 0.0,
            disposable_ratio: 0.0,
            fast_submit_ratio: 0.0,
            include_challenge: true,
            valid_challenge: true,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// One browser hammering the contact form.
    pub fn single_client_flood() -> Self {
        Self {
            total_requests: 200,
            ..Default::default()
        }
    }

    /// Many addresses, no browser identifier.
    pub fn distributed_campaign() -> Self {
        Self {
            total_requests: 500,
            unique_ips: 100,
            send_client_id: false,
            ..Default::default()
        }
    }

    /// One address minting a new browser identifier per request.
    pub fn client_id_rotation() -> Self {
        Self {
            total_requests: 60,
            rotate_client_id: true,
            ..Default::default()
        }
    }

    /// Form-filling bot that populates every field it sees.
    pub fn honeypot_spam() -> Self {
        Self {
            route: RouteClass::Testimonial,
            total_requests: 50,
            unique_ips: 50,
            rotate_client_id: true,
            honeypot_ratio: 1.0,
            ..Default::default()
        }
    }

    /// Throwaway mailboxes on the contact form.
    pub fn disposable_spam() -> Self {
        Self {
            total_requests: 50,
            unique_ips: 50,
            rotate_client_id: true,
            disposable_ratio: 1.0,
            ..Default::default()
        }
    }

    /// Scripted submissions posted immediately after render.
    pub fn fast_submit_bot() -> Self {
        Self {
            total_requests: 50,
            unique_ips: 50,
            rotate_client_id: true,
            fast_submit_ratio: 1.0,
            ..Default::default()
        }
    }

    /// Chat flood without challenge tokens.
    pub fn tokenless_chat_flood() -> Self {
        Self {
            route: RouteClass::Chat,
            total_requests: 100,
            unique_ips: 20,
            rotate_client_id: true,
            include_challenge: false,
            ..Default::default()
        }
    }

    /// Chat flood with forged challenge tokens.
    pub fn forged_challenge_flood() -> Self {
        Self {
            route: RouteClass::Chat,
            total_requests: 100,
            unique_ips: 20,
            rotate_client_id: true,
            valid_challenge: false,
            ..Default::default()
        }
    }

    /// Mixed traffic: mostly humans, some bots.
    pub fn mixed_traffic() -> Self {
        Self {
            total_requests: 300,
            unique_ips: 300,
            rotate_client_id: true,
            honeypot_ratio: 0.1,
            disposable_ratio: 0.1,
            fast_submit_ratio: 0.1,
            ..Default::default()
        }
    }

    /// Expected outcomes, for assertions.
    pub fn expectations(&self) -> AttackExpectations {
        let bot_ratio = self
            .honeypot_ratio
            .max(self.disposable_ratio)
            .max(self.fast_submit_ratio);

        AttackExpectations {
            should_rate_limit: !self.rotate_client_id
                && self.total_requests > self.unique_ips * 3,
            should_screen_out: bot_ratio >= 1.0
                || !self.valid_challenge
                || (!self.include_challenge && self.route == RouteClass::Chat),
        }
    }
}

/// Expected attack outcomes.
#[derive(Debug, Clone)]
pub struct AttackExpectations {
    /// Should the limiter engage
    pub should_rate_limit: bool,
    /// Should the pipeline reject everything that gets past the limiter
    pub should_screen_out: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flood_expects_rate_limiting() {
        let exp = AttackConfig::single_client_flood().expectations();
        assert!(exp.should_rate_limit);
        assert!(!exp.should_screen_out);
    }

    #[test]
    fn test_rotation_evades_rate_limiting() {
        let exp = AttackConfig::client_id_rotation().expectations();
        assert!(!exp.should_rate_limit);
    }

    #[test]
    fn test_honeypot_spam_is_screened() {
        let exp = AttackConfig::honeypot_spam().expectations();
        assert!(exp.should_screen_out);
    }
}
