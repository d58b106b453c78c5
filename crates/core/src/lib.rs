//! Boxlane Core - Domain types and workflow rules.
//!
//! This crate provides the pieces shared by every Boxlane component:
//! - `storefront` - Customer and admin JSON API (port 3000)
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types, rules, and traits - no database
//! access, no HTTP clients. Rules take the current state and return a plan;
//! callers persist the plan with a compare-and-set write keyed on the state
//! they observed.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, emails, statuses, and actors
//! - [`otp`] - Verification code issuance and validation rules
//! - [`lifecycle`] - Order status transition table
//! - [`payment`] - Receipt upload and review rules
//! - [`upload`] - Receipt image constraints
//! - [`collaborators`] - Notifier, blob store, and clock interfaces

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod collaborators;
pub mod lifecycle;
pub mod otp;
pub mod payment;
pub mod types;
pub mod upload;

pub use collaborators::{
    BlobRef, BlobStore, BlobStoreError, Clock, CodeDelivery, Notifier, NotifyError, SystemClock,
};
pub use lifecycle::{LifecycleError, OrderState, Transition, TransitionPlan, plan_transition};
pub use otp::{CodeCheck, CodeError, CodePolicy, CodeRecord, OneTimeCode};
pub use payment::{DecisionPlan, PaymentRuleError, check_receipt_upload, plan_decision};
pub use types::*;
pub use upload::{ImageType, MAX_RECEIPT_BYTES, UploadError, validate_receipt_image};
