//! Sign Verify Common Library
//!
//! サーバとクライアントで共有されるAPI型・レポート型

pub mod types;
pub mod error;

pub use types::{format_percentage, CaseReport, ErrorResponse, Verdict, VerifyResponse};
pub use error::{Error, Result};
