//! Token issuance and validation services
//!
//! `TokenIssuer` mints tokens; `TokenValidator` runs the scan pipeline.
//! Rejections are ordinary `Validation` values, not errors; the only hard
//! error either service returns is a storage failure.

mod issuer;
mod validator;

pub use issuer::{IssueError, IssueOptions, IssuedToken, TokenIssuer};
pub use validator::{DenialReason, Granted, TokenValidator, Validation};
