//! Records consumed from and produced for the iconfont.cn API.
//!
//! Only the fields the tools use are modelled; anything else in the
//! responses is ignored. iconfont.cn is loose about numeric fields (ids
//! sometimes arrive as strings), so ids are normalised to `String`.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Accepts a JSON string or number and returns it as a string.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Accepts a JSON number or numeric string, defaulting to zero.
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

/// Style filter for icon search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconType {
    /// No filter.
    #[default]
    All,
    /// Outline icons.
    Line,
    /// Filled icons.
    Fill,
    /// Flat colour icons.
    Flat,
    /// Hand-drawn icons.
    Hand,
    /// Simple icons.
    Simple,
    /// Detailed multi-colour icons.
    Complex,
}

impl IconType {
    /// All accepted names, for error messages and tool schemas.
    pub const NAMES: [&'static str; 7] = ["all", "line", "fill", "flat", "hand", "simple", "complex"];

    /// Parses a type name (case-insensitive).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Some(Self::All),
            "line" => Some(Self::Line),
            "fill" => Some(Self::Fill),
            "flat" => Some(Self::Flat),
            "hand" => Some(Self::Hand),
            "simple" => Some(Self::Simple),
            "complex" => Some(Self::Complex),
            _ => None,
        }
    }

    /// Value sent as the `fills` search parameter.
    #[must_use]
    pub const fn as_param(self) -> &'static str {
        match self {
            Self::All => "",
            Self::Line => "line",
            Self::Fill => "fill",
            Self::Flat => "flat",
            Self::Hand => "hand",
            Self::Simple => "simple",
            Self::Complex => "complex",
        }
    }
}

/// A single icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    /// Icon identifier.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// CSS class used in icon fonts.
    #[serde(default)]
    pub font_class: String,
    /// Unicode code point in the project font, if assigned.
    #[serde(default)]
    pub unicode: String,
    /// Inline SVG markup.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub show_svg: String,
    /// Uploader, when the API includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// One page of icon search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Total matches across all pages.
    pub total: u64,
    /// Page number (1-based).
    pub page: u32,
    /// Requested page size.
    pub page_size: u32,
    /// Icons on this page.
    pub icons: Vec<Icon>,
}

/// An icon project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Project name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default, deserialize_with = "string_or_number")]
    pub description: String,
    /// Number of icons, when the listing includes it.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub icon_count: u64,
    /// Font family used when the project is exported as a font.
    #[serde(default, deserialize_with = "string_or_number")]
    pub font_family: String,
    /// CSS class prefix.
    #[serde(default, deserialize_with = "string_or_number")]
    pub prefix: String,
}

/// Project metadata plus its icons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetail {
    /// Project metadata.
    pub project: Project,
    /// Icons in the project.
    #[serde(default)]
    pub icons: Vec<Icon>,
}

impl ProjectDetail {
    /// Returns the icons whose name or font class contains `keyword`
    /// (case-insensitive).
    #[must_use]
    pub fn matching_icons(&self, keyword: &str) -> Vec<&Icon> {
        let needle = keyword.trim().to_lowercase();
        self.icons
            .iter()
            .filter(|icon| {
                needle.is_empty()
                    || icon.name.to_lowercase().contains(&needle)
                    || icon.font_class.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

/// A page of icons matching a keyword within one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSearchResult {
    /// Project searched.
    pub project_id: String,
    /// Project name.
    pub project_name: String,
    /// Keyword searched for.
    pub keyword: String,
    /// Total matches across all pages.
    pub total: u64,
    /// Page number (1-based).
    pub page: u32,
    /// Page size.
    pub page_size: u32,
    /// Icons on this page.
    pub icons: Vec<Icon>,
}

/// A downloaded icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IconDownload {
    /// Icon identifier.
    pub icon_id: String,
    /// Icon name.
    pub name: String,
    /// SVG markup.
    pub svg: String,
    /// Where the SVG was written, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}
