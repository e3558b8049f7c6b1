//! Common test utilities and helpers.
//!
//! - Custom assertions over output content streams and logs
//! - Test PDF builders
//! - PDF inspection helpers
//! - Stub detectors and generators

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;
pub mod pdf_helpers;
pub mod stubs;

pub use assertions::*;
pub use fixtures::*;
pub use pdf_helpers::*;
pub use stubs::*;
