// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Wildcard domain patterns.
//!
//! Patterns are plain hostnames where `*` stands for any run of characters,
//! e.g. `*.example.com`, `foo.*.com` or `*.example.*`. Matching is
//! case-insensitive and anchored at both ends.

use regex::{Regex, RegexBuilder};

/// Check whether `domain` matches the wildcard `pattern`.
pub fn domain_matches(pattern: &str, domain: &str) -> bool {
    if pattern == domain {
        return true;
    }

    match compile_pattern(pattern) {
        Some(re) => re.is_match(domain),
        None => false,
    }
}

/// Check whether `domain` matches at least one of `patterns`.
pub fn matches_any<S: AsRef<str>>(patterns: &[S], domain: &str) -> bool {
    patterns.iter().any(|p| domain_matches(p.as_ref(), domain))
}

fn compile_pattern(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*?");

    RegexBuilder::new(&format!("^{body}$"))
        .case_insensitive(true)
        .build()
        .ok()
}
