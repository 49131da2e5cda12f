//! Markdown rendering of a research report.
//!
//! Sections are laid out side by side in registration order, each record as a
//! bullet with its headline, link and a few scalar fields. The primary
//! source's detail and the enrichment pages follow their sections.

use crate::models::{FieldValue, PageContent, Record, ResearchReport, SourceReport, TopicReports};
use crate::utils::{slugify_title, truncate_chars};
use std::error::Error;
use std::fmt::Write;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Fields already shown in the bullet headline.
const HEADLINE_KEYS: &[&str] = &["title", "name", "url"];
/// Scalar fields rendered per record.
const MAX_FACTS: usize = 4;
const EXCERPT_CHARS: usize = 280;

/// Render `report` as a Markdown document.
pub fn report_to_markdown(report: &ResearchReport) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# Research: {}\n", report.query);
    let _ = writeln!(
        md,
        "_Generated {} from {} sources, {} records._\n",
        report.run_at.format("%Y-%m-%d %H:%M UTC"),
        report.sections.len(),
        report.total_records()
    );

    md.push_str("## Contents\n\n");
    for section in &report.sections {
        let _ = writeln!(
            md,
            "- [{}](#{}) ({})",
            section.source,
            slugify_title(&section.source),
            section.records.len()
        );
    }
    if !report.enrichments.is_empty() {
        md.push_str("- [Linked pages](#linked-pages)\n");
    }
    md.push('\n');

    for section in &report.sections {
        render_section(&mut md, section);
    }

    if !report.enrichments.is_empty() {
        md.push_str("## Linked pages\n\n");
        for page in &report.enrichments {
            render_page(&mut md, page);
        }
    }

    md
}

/// Render every report of a multi-topic run, one after another, separated by
/// horizontal rules.
pub fn reports_to_markdown(research: &TopicReports) -> String {
    research
        .reports
        .iter()
        .map(report_to_markdown)
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

/// Render `report` and write it to `path`, creating parent directories.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub async fn write_report(
    report: &ResearchReport,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn Error>> {
    write_markdown(&report_to_markdown(report), path.as_ref()).await
}

/// Render a multi-topic run and write it to `path`.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub async fn write_reports(
    research: &TopicReports,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn Error>> {
    write_markdown(&reports_to_markdown(research), path.as_ref()).await
}

async fn write_markdown(rendered: &str, path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create Markdown dir");
            return Err(e.into());
        }
    }

    fs::write(path, rendered).await?;
    info!(bytes = rendered.len(), "Wrote Markdown report");
    Ok(())
}

fn render_section(md: &mut String, section: &SourceReport) {
    let _ = writeln!(md, "## {}\n", section.source);

    if let Some(failure) = &section.failure {
        let _ = writeln!(md, "> Source failed: {failure}\n");
    }
    if section.records.is_empty() {
        md.push_str("_No results._\n\n");
        return;
    }

    for record in &section.records {
        render_record(md, record, "");
    }
    md.push('\n');

    if let Some(detail) = &section.detail {
        let _ = writeln!(md, "### Detail: {}\n", detail.headline());
        render_record(md, detail, "");
        for (key, value) in detail.fields() {
            if let FieldValue::Records(children) = value {
                let _ = writeln!(md, "\n**{key}**\n");
                for child in children {
                    render_record(md, child, "  ");
                }
            }
        }
        md.push('\n');
    }
}

fn render_record(md: &mut String, record: &Record, indent: &str) {
    let headline = record.headline();
    match record.text("url") {
        Some(url) => {
            let _ = writeln!(md, "{indent}- [{headline}]({url})");
        }
        None => {
            let _ = writeln!(md, "{indent}- {headline}");
        }
    }

    let facts: Vec<String> = record
        .fields()
        .iter()
        .filter(|(key, _)| !HEADLINE_KEYS.contains(&key.as_str()))
        .filter_map(|(key, value)| match value {
            FieldValue::Records(_) => None,
            FieldValue::Text(text) if text.chars().count() > 80 => None,
            FieldValue::List(items) if items.is_empty() => None,
            other => Some(format!("{key}: {}", other.display())),
        })
        .take(MAX_FACTS)
        .collect();
    if !facts.is_empty() {
        let _ = writeln!(md, "{indent}  - {}", facts.join(" · "));
    }

    let excerpt = ["text", "body", "summary", "description", "selftext"]
        .iter()
        .find_map(|key| record.text(key))
        .filter(|t| t.chars().count() > 80);
    if let Some(text) = excerpt {
        let _ = writeln!(md, "{indent}  > {}", truncate_chars(text, EXCERPT_CHARS));
    }
}

fn render_page(md: &mut String, page: &PageContent) {
    let title = page.title.as_deref().unwrap_or(&page.url);
    let _ = writeln!(md, "### [{title}]({})\n", page.url);
    let byline: Vec<&str> = [page.author.as_deref(), page.published.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !byline.is_empty() {
        let _ = writeln!(md, "_{}_\n", byline.join(", "));
    }
    if let Some(description) = &page.description {
        let _ = writeln!(md, "{description}\n");
    }
    if !page.body.is_empty() {
        let _ = writeln!(md, "> {}\n", truncate_chars(&page.body, EXCERPT_CHARS));
    }
}
