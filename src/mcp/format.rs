//! Rendering of tool results.
//!
//! Every tool returns a structured value. [`render`] turns it into the text
//! placed in the MCP response: a short markdown document for humans, or
//! pretty-printed JSON for programmatic use.

use std::fmt::Write as _;

use serde::Serialize;

use crate::iconfont::{
    Icon, IconDownload, Project, ProjectDetail, ProjectSearchResult, SearchResult, SessionStatus,
};

/// Output format of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable markdown.
    #[default]
    Markdown,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Accepted format names.
    pub const NAMES: [&'static str; 2] = ["markdown", "json"];

    /// Parses a format name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Some(Self::Markdown),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
        }
    }
}

/// Values that have a markdown rendering.
pub trait Markdown {
    /// Renders the value as markdown.
    fn to_markdown(&self) -> String;
}

/// Renders `value` in the requested format.
#[must_use]
pub fn render<T>(value: &T, format: OutputFormat) -> String
where
    T: Serialize + Markdown + ?Sized,
{
    match format {
        OutputFormat::Markdown => value.to_markdown(),
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialise result: {e}\"}}")),
    }
}

/// A project detail together with where it came from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetailReport<'a> {
    /// The detail.
    #[serde(flatten)]
    pub detail: &'a ProjectDetail,
    /// `true` when served from the cache.
    pub from_cache: bool,
}

/// A session status with a headline message.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport<'a> {
    /// Headline.
    pub message: &'a str,
    /// Current status.
    #[serde(flatten)]
    pub status: SessionStatus,
}

/// Result of clearing the project detail cache.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheClearReport {
    /// Number of entries removed.
    pub dropped: usize,
}

/// Escapes a value for use inside a markdown table cell.
fn cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn icon_table(out: &mut String, icons: &[Icon]) {
    out.push_str("| ID | Name | Font class | Unicode |\n");
    out.push_str("|----|------|------------|---------|\n");
    for icon in icons {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            cell(&icon.id),
            cell(&icon.name),
            cell(&icon.font_class),
            cell(&icon.unicode)
        );
    }
}

impl Markdown for SearchResult {
    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## Icon search\n\n{} icons found (page {}, {} per page)\n\n",
            self.total, self.page, self.page_size
        );
        if self.icons.is_empty() {
            out.push_str("No icons on this page.\n");
        } else {
            icon_table(&mut out, &self.icons);
        }
        out
    }
}

impl Markdown for IconDownload {
    fn to_markdown(&self) -> String {
        let mut out = format!("## Icon {} ({})\n\n", cell(&self.name), self.icon_id);
        if let Some(path) = &self.path {
            let _ = writeln!(out, "Saved to `{}`\n", path.display());
        }
        out.push_str("```svg\n");
        out.push_str(&self.svg);
        if !self.svg.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n");
        out
    }
}

impl Markdown for [Project] {
    fn to_markdown(&self) -> String {
        if self.is_empty() {
            return "## Projects\n\nNo projects found.\n".to_string();
        }

        let mut out = format!("## Projects\n\n{} projects\n\n", self.len());
        out.push_str("| ID | Name | Icons | Font family | Prefix |\n");
        out.push_str("|----|------|-------|-------------|--------|\n");
        for project in self {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                cell(&project.id),
                cell(&project.name),
                project.icon_count,
                cell(&project.font_family),
                cell(&project.prefix)
            );
        }
        out
    }
}

impl Markdown for Vec<Project> {
    fn to_markdown(&self) -> String {
        self.as_slice().to_markdown()
    }
}

impl Markdown for ProjectDetailReport<'_> {
    fn to_markdown(&self) -> String {
        let project = &self.detail.project;
        let mut out = format!("## {} ({})\n\n", cell(&project.name), project.id);
        if !project.description.is_empty() {
            let _ = writeln!(out, "{}\n", project.description);
        }
        let _ = writeln!(out, "- Font family: {}", project.font_family);
        let _ = writeln!(out, "- Prefix: {}", project.prefix);
        let _ = writeln!(out, "- Icons: {}", self.detail.icons.len());
        let _ = writeln!(
            out,
            "- Source: {}\n",
            if self.from_cache { "cache" } else { "iconfont.cn" }
        );
        if !self.detail.icons.is_empty() {
            icon_table(&mut out, &self.detail.icons);
        }
        out
    }
}

impl Markdown for ProjectSearchResult {
    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## \"{}\" in {} ({})\n\n{} matching icons (page {}, {} per page)\n\n",
            cell(&self.keyword),
            cell(&self.project_name),
            self.project_id,
            self.total,
            self.page,
            self.page_size
        );
        if self.icons.is_empty() {
            out.push_str("No icons on this page.\n");
        } else {
            icon_table(&mut out, &self.icons);
        }
        out
    }
}

impl Markdown for StatusReport<'_> {
    fn to_markdown(&self) -> String {
        format!(
            "{}\n\n- Logged in: {}\n- Token present: {}\n",
            self.message,
            if self.status.logged_in { "yes" } else { "no" },
            if self.status.has_token { "yes" } else { "no" }
        )
    }
}

impl Markdown for CacheClearReport {
    fn to_markdown(&self) -> String {
        format!("Cleared {} cached project details.\n", self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn icon(id: &str, name: &str) -> Icon {
        Icon {
            id: id.to_string(),
            name: name.to_string(),
            font_class: format!("icon-{name}"),
            unicode: "e601".to_string(),
            show_svg: String::new(),
            author: None,
        }
    }

    #[test]
    fn parse_format_names() {
        assert_eq!(OutputFormat::parse("markdown"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::parse("MD"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::parse(" json "), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("yaml"), None);
        for name in OutputFormat::NAMES {
            assert_eq!(OutputFormat::parse(name).map(OutputFormat::as_str), Some(name));
        }
    }

    #[test]
    fn search_result_markdown_table() {
        let result = SearchResult {
            total: 1,
            page: 1,
            page_size: 20,
            icons: vec![icon("42", "home|page")],
        };
        let text = render(&result, OutputFormat::Markdown);
        assert!(text.contains("1 icons found"));
        assert!(text.contains("| 42 | home\\|page | icon-home\\|page | e601 |"));
    }

    #[test]
    fn search_result_json_uses_camel_case() {
        let result = SearchResult {
            total: 0,
            page: 2,
            page_size: 5,
            icons: Vec::new(),
        };
        let text = render(&result, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["pageSize"], 5);
        assert_eq!(value["page"], 2);
    }

    #[test]
    fn detail_report_flattens_detail() {
        let detail = ProjectDetail {
            project: Project {
                id: "7".to_string(),
                name: "Mine".to_string(),
                description: String::new(),
                icon_count: 1,
                font_family: "iconfont".to_string(),
                prefix: "icon-".to_string(),
            },
            icons: vec![icon("1", "home")],
        };
        let report = ProjectDetailReport {
            detail: &detail,
            from_cache: true,
        };

        let value: serde_json::Value =
            serde_json::from_str(&render(&report, OutputFormat::Json)).unwrap();
        assert_eq!(value["fromCache"], true);
        assert_eq!(value["project"]["id"], "7");
        assert_eq!(value["icons"].as_array().map(Vec::len), Some(1));

        let text = render(&report, OutputFormat::Markdown);
        assert!(text.contains("Source: cache"));
    }

    #[test]
    fn empty_project_list() {
        let projects: Vec<Project> = Vec::new();
        assert!(render(&projects, OutputFormat::Markdown).contains("No projects found"));
        assert_eq!(render(&projects, OutputFormat::Json), "[]");
    }

    #[test]
    fn status_report_never_contains_token() {
        let report = StatusReport {
            message: "Logged in",
            status: SessionStatus {
                logged_in: true,
                has_token: true,
            },
        };
        let json: serde_json::Value =
            serde_json::from_str(&render(&report, OutputFormat::Json)).unwrap();
        assert_eq!(json["message"], "Logged in");
        assert_eq!(json["loggedIn"], true);
        assert!(render(&report, OutputFormat::Markdown).contains("Logged in: yes"));
    }

    #[test]
    fn download_markdown_fences_svg() {
        let download = IconDownload {
            icon_id: "1".to_string(),
            name: "home".to_string(),
            svg: "<svg></svg>".to_string(),
            path: None,
        };
        let text = render(&download, OutputFormat::Markdown);
        assert!(text.contains("```svg\n<svg></svg>\n```"));
        assert!(!text.contains("Saved to"));
    }
}
