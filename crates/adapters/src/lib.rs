// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O

pub mod log;
pub mod platform;
pub mod traced;

pub use log::{
    LogPersister, LogSeverity, LogSink, NoOpLogPersister, NoOpLogSink, TracingLogPersister,
    TracingLogSink,
};
pub use platform::{ClientFactory, ClientRegistry, ModifyListenersError, PlatformClient, PlatformError};
pub use traced::TracedPlatformClient;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use log::{FakeLogPersister, FakeLogSink, LogLine};
#[cfg(any(test, feature = "test-support"))]
pub use platform::{FakePlatformClient, PlatformCall, PlatformOp};
