// src/models/mod.rs

//! Domain models for the feed engine.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod content;
mod content_config;
mod fields;
mod rules;
mod settings;

// Re-export all public types
pub use content::{
    ContentItem, ContentStatus, Organisation, OrganisationSite, OrganisationStatus, SiteStatus,
};
pub use content_config::{
    ArticleConfig, ConfigDefaults, ContentConfig, ContentFields, ContentType, FieldsConfig,
    LoadingConfig, OrganisationConfig, OutputColumns, PageConfig, SummaryConfig,
};
pub use fields::{FieldName, FieldSource, Fields, merge};
pub use rules::{
    BODY_FIELD, ContentField, Css, ExcludeRule, Expression, FieldExtractor, FieldFilter,
    FieldSelector, FilterOutcome, FilterScope, MatchMode, Pattern, SelectorSource, TextCase,
};
pub use settings::{
    CrawlerConfig, Environment, EnvironmentName, HostSettings, PathsConfig, Settings,
    TransportConfig,
};
