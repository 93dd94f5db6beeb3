// Test modules for agent-recovery crate
//
// Each source module has a corresponding test file that focuses on
// business logic verification.

// Shared fakes and fixtures
pub mod helpers;

pub mod backoff;
pub mod config;
