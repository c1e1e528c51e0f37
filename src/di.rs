//! Dependency injection infrastructure.
//!
//! Compile-time wiring using the `FromRef` trait and the derive macros from
//! `tuplegrid-macros`.
//!
//! - `FromRef<T>`: Trait for extracting a value from a reference to `T`
//! - `#[derive(Context)]`: Makes each field of a struct extractable via `FromRef`
//! - `#[derive(FromContext)]`: Generates `FromRef` impl by resolving each field
//!
//! # Example
//!
//! ```ignore
//! use tuplegrid::{DatastoreContext, FromRef, TransactionEventBridge};
//!
//! let ctx = DatastoreContext::new(dialect, config);
//! let bridge = TransactionEventBridge::from_ref(&ctx);
//! ```

/// Trait for extracting a value from a reference to another type.
///
/// Types that implement `FromRef<T>` can be extracted from `&T`.
pub trait FromRef<T> {
    fn from_ref(input: &T) -> Self;
}

/// Blanket implementation: any Clone type can be extracted from itself.
impl<T: Clone> FromRef<T> for T {
    fn from_ref(input: &T) -> Self {
        input.clone()
    }
}

pub use tuplegrid_macros::{Context, FromContext};
