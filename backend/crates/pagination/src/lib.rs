//! Paging primitives shared by SQL view execution and its HTTP adapters.
//!
//! The upstream SQL view endpoint pages its results with a 1-based `page`
//! query parameter and, on most server versions, echoes a `pager` envelope
//! describing how many pages remain. This crate keeps those transport
//! details in one place:
//!
//! - [`PageNumber`] is a validated, 1-based page index.
//! - [`Pager`] decodes the optional `pager` envelope and answers whether
//!   further pages exist.
//! - [`PageProgress`] is the progress event emitted after each page.

mod page_number;
mod pager;
mod progress;

pub use page_number::{PageNumber, PageNumberError};
pub use pager::Pager;
pub use progress::PageProgress;
