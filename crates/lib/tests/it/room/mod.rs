//! Room integration tests
//!
//! Several rooms share a loopback server; delivery is driven by hand so each
//! test picks the interleaving it needs.

mod handle_tests;
mod history_tests;
mod resync_tests;
mod scenario_tests;
mod subscription_tests;
