//! Content items, organisations and deployment status.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::models::{ContentType, EnvironmentName, FieldName, FieldSource, Fields};

/// Deployment status of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentStatus {
    #[default]
    New,
    Pending,
    Staged,
    Deployed,
    /// Absorbing: never transitions and never deployed
    Skipped,
}

impl ContentStatus {
    /// Status after a deploy run to `environment`.
    pub fn advance(self, environment: EnvironmentName) -> Self {
        match self {
            ContentStatus::Deployed | ContentStatus::Skipped => self,
            _ if environment == EnvironmentName::Stage => ContentStatus::Staged,
            ContentStatus::Staged => ContentStatus::Deployed,
            _ => self,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ContentStatus::Skipped)
    }
}

/// An article, video, event, listing... as persisted by the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: u64,
    /// Organisation code
    pub code: String,
    /// Organisation site code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub content_type: ContentType,
    #[serde(default)]
    pub status: ContentStatus,
    #[serde(default)]
    pub fields: Fields,
}

impl FieldSource for ContentItem {
    fn fields(&self) -> Cow<'_, Fields> {
        let mut fields = self.fields.clone();
        fields.fill(FieldName::Id, &self.id.to_string());
        fields.fill(FieldName::Code, &self.code);
        fields.fill(FieldName::ContentType, self.content_type.key());
        Cow::Owned(fields)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrganisationStatus {
    #[default]
    Active,
    Archived,
}

/// An organisation whose content is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: OrganisationStatus,
    /// Whether the organisation has its own listing page
    #[serde(default)]
    pub listing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_text: Option<String>,
}

impl Organisation {
    pub fn is_archived(&self) -> bool {
        self.status == OrganisationStatus::Archived
    }
}

impl FieldSource for Organisation {
    fn fields(&self) -> Cow<'_, Fields> {
        let mut fields = Fields::new();
        fields.set(FieldName::Organisation, self.name.clone());
        fields.set(FieldName::OrganisationUrl, self.url.clone());
        if let Some(text) = &self.image_text {
            fields.set(FieldName::ImageText, text.clone());
        }
        Cow::Owned(fields)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SiteStatus {
    #[default]
    New,
    Review,
    Active,
    Archived,
}

impl SiteStatus {
    /// Production shows only active sites; other environments also show
    /// sites under review.
    pub fn is_published(&self, environment: EnvironmentName) -> bool {
        match environment {
            EnvironmentName::Prod => *self == SiteStatus::Active,
            _ => matches!(self, SiteStatus::Review | SiteStatus::Active),
        }
    }
}

/// A site belonging to an organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationSite {
    pub code: String,
    pub organisation: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: SiteStatus,
}

impl FieldSource for OrganisationSite {
    fn fields(&self) -> Cow<'_, Fields> {
        let mut fields = Fields::new();
        fields.set(FieldName::Site, self.url.clone());
        Cow::Owned(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let status = ContentStatus::Pending.advance(EnvironmentName::Stage);
        assert_eq!(status, ContentStatus::Staged);
        let status = status.advance(EnvironmentName::Prod);
        assert_eq!(status, ContentStatus::Deployed);
        assert_eq!(status.advance(EnvironmentName::Stage), ContentStatus::Deployed);
        assert_eq!(status.advance(EnvironmentName::Prod), ContentStatus::Deployed);
    }

    #[test]
    fn test_pending_not_promoted_outside_stage() {
        assert_eq!(
            ContentStatus::Pending.advance(EnvironmentName::Prod),
            ContentStatus::Pending
        );
        assert_eq!(ContentStatus::New.advance(EnvironmentName::Dev), ContentStatus::New);
        assert_eq!(
            ContentStatus::Staged.advance(EnvironmentName::Stage),
            ContentStatus::Staged
        );
    }

    #[test]
    fn test_skipped_is_absorbing() {
        for env in [EnvironmentName::Dev, EnvironmentName::Stage, EnvironmentName::Prod] {
            assert_eq!(ContentStatus::Skipped.advance(env), ContentStatus::Skipped);
        }
    }

    #[test]
    fn test_site_published_by_environment() {
        assert!(SiteStatus::Active.is_published(EnvironmentName::Prod));
        assert!(!SiteStatus::Review.is_published(EnvironmentName::Prod));
        assert!(SiteStatus::Review.is_published(EnvironmentName::Stage));
        assert!(!SiteStatus::New.is_published(EnvironmentName::Stage));
    }

    #[test]
    fn test_item_source_adds_identity() {
        let item = ContentItem {
            id: 42,
            code: "acme".into(),
            site: None,
            content_type: ContentType::Post,
            status: ContentStatus::New,
            fields: Fields::new(),
        };
        let fields = item.fields();
        assert_eq!(fields.value(FieldName::Id), "42");
        assert_eq!(fields.value(FieldName::Code), "acme");
        assert_eq!(fields.value(FieldName::ContentType), "post");
    }

    #[test]
    fn test_item_json() {
        let json = r#"{"id": 7, "code": "acme", "content_type": "white-papers", "status": "STAGED",
                       "fields": {"title": "Paper", "published_date": "2024-01-02"}}"#;
        let item: ContentItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.content_type, ContentType::WhitePaper);
        assert_eq!(item.status, ContentStatus::Staged);
        assert_eq!(item.fields.value(FieldName::Title), "Paper");
    }
}
