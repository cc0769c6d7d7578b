//! Catalog backends holding storage policies.
//!
//! [`PolicyCatalog`] is the seam between the resolver and the place policies
//! live. [`postgres::PostgresCatalog`] talks to the Promscale catalog through the
//! tunnel; [`memory::MemoryCatalog`] keeps the same three-state model in process.

mod base;
pub mod memory;
pub mod postgres;

pub use base::*;
