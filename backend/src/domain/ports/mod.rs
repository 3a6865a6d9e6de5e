//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod credential_provider;
mod result_cache_store;
mod sql_view_source;

#[cfg(test)]
pub use credential_provider::MockCredentialProvider;
pub use credential_provider::{CredentialError, CredentialProvider};
#[cfg(test)]
pub use result_cache_store::MockResultCacheStore;
pub use result_cache_store::{CacheEntry, NewCacheEntry, ResultCacheError, ResultCacheStore};
#[cfg(test)]
pub use sql_view_source::MockSqlViewSource;
pub use sql_view_source::{
    FixtureSqlViewSource, RawPage, SqlViewPageRequest, SqlViewSource, SqlViewSourceError,
};
