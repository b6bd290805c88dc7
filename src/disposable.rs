// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Disposable email domain filter.
//!
//! A closed denylist of throwaway mail providers. It is necessarily
//! incomplete and only meant as a cheap first line.

use std::collections::HashSet;
use tracing::debug;

/// Known disposable/temporary mail providers.
const BUILTIN_DOMAINS: &[&str] = &[
    "10minutemail.com",
    "10minutemail.net",
    "20minutemail.com",
    "33mail.com",
    "anonbox.net",
    "burnermail.io",
    "discard.email",
    "dispostable.com",
    "dropmail.me",
    "emailondeck.com",
    "fakeinbox.com",
    "fakemail.net",
    "getairmail.com",
    "getnada.com",
    "guerrillamail.biz",
    "guerrillamail.com",
    "guerrillamail.de",
    "guerrillamail.info",
    "guerrillamail.net",
    "guerrillamail.org",
    "guerrillamailblock.com",
    "harakirimail.com",
    "inboxkitten.com",
    "jetable.org",
    "mail-temp.com",
    "mailcatch.com",
    "maildrop.cc",
    "mailinator.com",
    "mailinator.net",
    "mailnesia.com",
    "mailsac.com",
    "mintemail.com",
    "mohmal.com",
    "mytemp.email",
    "nada.email",
    "sharklasers.com",
    "spam4.me",
    "spambox.us",
    "spamgourmet.com",
    "temp-mail.io",
    "temp-mail.org",
    "tempail.com",
    "tempmail.com",
    "tempmail.net",
    "tempmailo.com",
    "tempr.email",
    "throwawaymail.com",
    "trashmail.com",
    "trashmail.de",
    "trashmail.net",
    "yopmail.com",
    "yopmail.fr",
    "yopmail.net",
];

/// Result of a disposable domain check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainCheck {
    Allowed,
    Disposable { domain: String },
}

impl DomainCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Rejects emails from known disposable domains.
#[derive(Debug, Clone)]
pub struct DisposableDomainFilter {
    denylist: HashSet<String>,
}

impl Default for DisposableDomainFilter {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl DisposableDomainFilter {
    /// Built-in list plus `extra` domains.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let denylist = BUILTIN_DOMAINS
            .iter()
            .map(|d| d.to_string())
            .chain(extra.into_iter().map(|d| normalize_domain(d.as_ref())))
            .filter(|d| !d.is_empty())
            .collect();
        Self { denylist }
    }

    pub fn len(&self) -> usize {
        self.denylist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.denylist.is_empty()
    }

    /// Check the domain part of `email`.
    pub fn check(&self, email: &str) -> DomainCheck {
        let domain = match email_domain(email) {
            Some(d) => d,
            None => return DomainCheck::Allowed,
        };

        // Match the domain itself or any parent: a.b.mailinator.com -> mailinator.com
        let mut candidate = domain.as_str();
        loop {
            if self.denylist.contains(candidate) {
                debug!(domain = %domain, matched = %candidate, "Disposable email domain");
                return DomainCheck::Disposable {
                    domain: candidate.to_string(),
                };
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => return DomainCheck::Allowed,
            }
        }
    }
}

/// Lowercased domain after the last `@`, if any.
pub fn email_domain(email: &str) -> Option<String> {
    let (_, domain) = email.trim().rsplit_once('@')?;
    let domain = normalize_domain(domain);
    (!domain.is_empty()).then_some(domain)
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}
