//! Service layer for the feed engine.
//!
//! This module contains the business logic for:
//! - Field evaluation against a page (`FieldEvaluator`)
//! - Bundle extraction into records (`ContentExtractor`)
//! - Deployment status and row enrichment (`ContentDeployer`)
//! - Date normalisation and summary derivation

pub mod dates;
mod deployer;
mod evaluator;
mod extraction;
pub mod summary;

pub use deployer::{ContentDeployer, DeployOutcome};
pub use evaluator::{DocumentContext, FieldEvaluator, FieldOutcome, Page};
pub use extraction::{ContentExtractor, ExtractedRecord};
