//! Pipeline entry points for feed operations.
//!
//! - `Extractor`: Fetch organisation pages and extract teaser or article records
//! - `run_deploy`: Build a content type's feed for an environment and ship it
//! - `reship`: Re-deliver a feed kept after a failed delivery

pub mod deploy;
pub mod extract;

pub use deploy::{DeployReport, DeployRequest, build_targets, reship, run_deploy};
pub use extract::{ExtractOutcome, Extractor, extract_article, extract_teasers};
