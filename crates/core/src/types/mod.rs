//! Core types for Boxlane.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod actor;
pub mod email;
pub mod id;
pub mod price;
pub mod status;

pub use actor::Actor;
pub use email::{Email, EmailError};
pub use id::*;
pub use price::{NegativePrice, Price};
pub use status::*;
