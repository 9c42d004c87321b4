//! Field vocabulary and the ordered, fill-if-absent `Fields` map.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed vocabulary of record fields.
///
/// Declaration order is the iteration order of [`Fields`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Id,
    Code,
    ContentType,
    Title,
    Author,
    Summary,
    Body,
    PublishedDate,
    Pubdate,
    Url,
    Image,
    ImageText,
    Thumbnail,
    Logo,
    Organisation,
    OrganisationUrl,
    Site,
    StartDate,
    EndDate,
    StartTime,
    EndTime,
    Timezone,
    Location,
    Category,
    Tags,
    Published,
}

impl FieldName {
    pub const ALL: [FieldName; 26] = [
        FieldName::Id,
        FieldName::Code,
        FieldName::ContentType,
        FieldName::Title,
        FieldName::Author,
        FieldName::Summary,
        FieldName::Body,
        FieldName::PublishedDate,
        FieldName::Pubdate,
        FieldName::Url,
        FieldName::Image,
        FieldName::ImageText,
        FieldName::Thumbnail,
        FieldName::Logo,
        FieldName::Organisation,
        FieldName::OrganisationUrl,
        FieldName::Site,
        FieldName::StartDate,
        FieldName::EndDate,
        FieldName::StartTime,
        FieldName::EndTime,
        FieldName::Timezone,
        FieldName::Location,
        FieldName::Category,
        FieldName::Tags,
        FieldName::Published,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Id => "id",
            FieldName::Code => "code",
            FieldName::ContentType => "content_type",
            FieldName::Title => "title",
            FieldName::Author => "author",
            FieldName::Summary => "summary",
            FieldName::Body => "body",
            FieldName::PublishedDate => "published_date",
            FieldName::Pubdate => "pubdate",
            FieldName::Url => "url",
            FieldName::Image => "image",
            FieldName::ImageText => "image_text",
            FieldName::Thumbnail => "thumbnail",
            FieldName::Logo => "logo",
            FieldName::Organisation => "organisation",
            FieldName::OrganisationUrl => "organisation_url",
            FieldName::Site => "site",
            FieldName::StartDate => "start_date",
            FieldName::EndDate => "end_date",
            FieldName::StartTime => "start_time",
            FieldName::EndTime => "end_time",
            FieldName::Timezone => "timezone",
            FieldName::Location => "location",
            FieldName::Category => "category",
            FieldName::Tags => "tags",
            FieldName::Published => "published",
        }
    }

    /// Fields whose values are dates and inherit the default date pattern.
    pub fn is_date(&self) -> bool {
        matches!(
            self,
            FieldName::PublishedDate | FieldName::StartDate | FieldName::EndDate
        )
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = String;

    /// Accepts `published_date`, `published-date` and `PUBLISHED_DATE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        FieldName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == key)
            .ok_or_else(|| format!("unknown field '{s}'"))
    }
}

/// Ordered string map used to assemble an output record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<FieldName, String>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: FieldName) -> Option<&str> {
        self.0.get(&name).map(String::as_str)
    }

    /// Value of `name`, or an empty string when absent.
    pub fn value(&self, name: FieldName) -> &str {
        self.get(name).unwrap_or("")
    }

    pub fn set(&mut self, name: FieldName, value: impl Into<String>) {
        self.0.insert(name, value.into());
    }

    pub fn remove(&mut self, name: FieldName) -> Option<String> {
        self.0.remove(&name)
    }

    /// True when the field is present with a non-empty value.
    pub fn is_filled(&self, name: FieldName) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Set `name` only if it is absent or empty. Returns whether it was set.
    pub fn fill(&mut self, name: FieldName, value: &str) -> bool {
        if self.is_filled(name) {
            return false;
        }
        self.0.insert(name, value.to_string());
        true
    }

    /// Merge each source in order; the first non-empty value for a key wins.
    pub fn add(&mut self, sources: &[&dyn FieldSource]) -> &mut Self {
        for source in sources {
            let fields = source.fields();
            for (name, value) in fields.iter() {
                if !value.is_empty() {
                    self.fill(name, value);
                }
            }
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(FieldName, String)> for Fields {
    fn from_iter<I: IntoIterator<Item = (FieldName, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Anything that contributes values to a record.
pub trait FieldSource {
    fn fields(&self) -> Cow<'_, Fields>;
}

impl FieldSource for Fields {
    fn fields(&self) -> Cow<'_, Fields> {
        Cow::Borrowed(self)
    }
}

/// Fill `target` from `sources`, most specific source first.
pub fn merge(target: &mut Fields, sources: &[&dyn FieldSource]) {
    target.add(sources);
}
