// src/lib.rs

//! Content feed engine.
//!
//! Extracts organisation content with declarative field rules and deploys
//! it as CSV feeds to local directories, SSH hosts and S3 buckets.

pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
