//! DHIS2 outbound adapters.
//!
//! This module provides a thin HTTP implementation of the `SqlViewSource`
//! port and the credential providers whose header it forwards.

mod credentials;
mod http_source;

pub use credentials::{ApiTokenCredentials, BasicAuthCredentials};
pub use http_source::{Dhis2HttpIdentity, Dhis2HttpSqlViewSource};
