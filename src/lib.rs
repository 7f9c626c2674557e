//! Storage health assessment and staged recovery for failing devices.
//!
//! Raw telemetry (SMART/NVMe counters, read benchmarks, thermal zones) is
//! evaluated into PASS / WARN / FAIL verdicts per test; the recovery
//! controller drives an external imaging tool through read, trim and
//! scrape passes until the device is imaged or the retry budget runs out.

pub mod collectors;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod recovery;
pub mod report;
pub mod ui;
pub mod util;
