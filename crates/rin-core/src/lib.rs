//! Core types and the application state machine for the admission portal.
//!
//! This crate has no HTTP or database dependencies. Storage and notification
//! backends plug in through the traits in [`store`].

// Native `async fn` in traits; the store traits spell out `Send` futures.
#![allow(async_fn_in_trait)]

pub mod application;
pub mod clock;
pub mod error;
pub mod machine;
pub mod phase;
pub mod section;
pub mod store;
pub mod validate;

pub use error::{Error, Result};
