//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **dhis2**: reqwest-backed SQL view source and credential providers
//! - **cache**: in-process result cache with lazy expiry
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod cache;
pub mod dhis2;
