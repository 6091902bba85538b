//! Posting orchestration.
//!
//! [`Poster`] turns a raw article into allocated numbers and stored records,
//! undoing the allocation when a later step fails. [`NewsReader`] answers
//! the read-side queries that need more than one store.

mod auth;
mod header;
mod policy;
mod poster;
mod reader;

pub use auth::*;
pub use header::*;
pub use policy::*;
pub use poster::*;
pub use reader::*;
