// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience primitives for the remote tier.
//!
//! - [`retry`]: exponential-backoff retry wrapped around every Redis command
//! - [`circuit_breaker`]: fail-fast protection when the remote tier is down

pub mod retry;
pub mod circuit_breaker;
