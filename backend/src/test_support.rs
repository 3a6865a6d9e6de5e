//! Test utilities for the backend crate.
//!
//! This module provides shared helpers for both unit tests (in `src/`) and
//! integration tests (in `tests/`). It is only compiled for tests or with
//! the `test-support` feature.

mod sql_view_executor;

pub use sql_view_executor::{
    ImmediateSleeper, MutableClock, NoJitter, RecordingSleeper, ScriptedSqlViewSource, grid_page,
    object_page,
};
