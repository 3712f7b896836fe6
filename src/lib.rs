//! Sign Verify
//!
//! 署名画像をSIFT特徴点で照合し、結果をケースフォルダに保存する。

pub mod case_study;
pub mod cli;
pub mod config;
pub mod draw;
pub mod error;
pub mod features;
pub mod matcher;
pub mod server;
pub mod verifier;
