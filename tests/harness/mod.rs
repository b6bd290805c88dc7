// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for abuse simulation against the submission guard.
//!
//! Provides request generators, attack patterns and outcome bookkeeping
//! for driving the limiter and pipeline the way a bot would.

pub mod attacks;
pub mod generators;
pub mod metrics;
