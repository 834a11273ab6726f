//! Report rendering: plain text, structured JSON and a styled HTML document.
//!
//! All functions are pure. `to_structured` serializes the report type itself,
//! so its fields mirror the report exactly and parse back to an equal value.

use crate::models::{BuildResult, ValidationReport, OUTPUT_EXCERPT_LIMIT};
use serde::Serialize;

/// Visual weight of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Error,
    Warning,
    Info,
    /// Verbatim text, e.g. toolchain output
    Preformatted,
}

impl SectionKind {
    fn css_class(&self) -> &'static str {
        match self {
            SectionKind::Error => "error",
            SectionKind::Warning => "warning",
            SectionKind::Info => "info",
            SectionKind::Preformatted => "output",
        }
    }

    fn bullet(&self) -> &'static str {
        match self {
            SectionKind::Error => "✗",
            SectionKind::Warning => "⚠",
            SectionKind::Info | SectionKind::Preformatted => "-",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub title: String,
    pub kind: SectionKind,
    pub items: Vec<String>,
}

/// Anything the formatter can render.
pub trait Reportable: Serialize {
    fn heading(&self) -> String;
    fn passed(&self) -> bool;
    /// Sections in display order; empty sections are skipped by renderers
    fn sections(&self) -> Vec<ReportSection>;
}

impl Reportable for ValidationReport {
    fn heading(&self) -> String {
        format!(
            "Validation {}: {} error(s), {} warning(s)",
            if self.valid { "passed" } else { "failed" },
            self.errors.len(),
            self.warnings.len()
        )
    }

    fn passed(&self) -> bool {
        self.valid
    }

    fn sections(&self) -> Vec<ReportSection> {
        vec![
            ReportSection {
                title: "Errors".to_string(),
                kind: SectionKind::Error,
                items: self.errors.clone(),
            },
            ReportSection {
                title: "Warnings".to_string(),
                kind: SectionKind::Warning,
                items: self.warnings.clone(),
            },
        ]
    }
}

impl Reportable for BuildResult {
    fn heading(&self) -> String {
        format!(
            "Build {}: target '{}' in {} ms",
            if self.success { "succeeded" } else { "failed" },
            self.target,
            self.duration.as_millis()
        )
    }

    fn passed(&self) -> bool {
        self.success
    }

    fn sections(&self) -> Vec<ReportSection> {
        let mut details = vec![format!("Project: {}", self.project_path.display())];
        if let Some(ref artifact) = self.artifact {
            details.push(format!(
                "Artifact: {} ({})",
                artifact.path.display(),
                artifact.size_formatted
            ));
            details.push(format!("Modified: {}", artifact.modified.to_rfc3339()));
        }

        let output = self.output_tail(OUTPUT_EXCERPT_LIMIT).trim_end();
        vec![
            ReportSection {
                title: "Details".to_string(),
                kind: SectionKind::Info,
                items: details,
            },
            ReportSection {
                title: "Error".to_string(),
                kind: SectionKind::Error,
                items: self.error.iter().cloned().collect(),
            },
            ReportSection {
                title: "Output".to_string(),
                kind: SectionKind::Preformatted,
                items: if output.is_empty() {
                    Vec::new()
                } else {
                    vec![output.to_string()]
                },
            },
        ]
    }
}

/// Plain text for terminals and logs.
pub fn to_text<R: Reportable>(report: &R) -> String {
    let mut text = String::new();
    text.push_str(&report.heading());
    text.push('\n');

    for section in report.sections() {
        if section.items.is_empty() {
            continue;
        }
        text.push('\n');
        text.push_str(&section.title);
        text.push_str(":\n");
        for item in &section.items {
            if section.kind == SectionKind::Preformatted {
                for line in item.lines() {
                    text.push_str("    ");
                    text.push_str(line);
                    text.push('\n');
                }
            } else {
                text.push_str(&format!("  {} {}\n", section.kind.bullet(), item));
            }
        }
    }
    text
}

/// Pretty JSON of the report's own fields.
pub fn to_structured<R: Reportable>(report: &R) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

const DOCUMENT_STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#222}\
h1.pass{color:#1b7f3b}h1.fail{color:#b3261e}\
section{margin-top:1.5rem}\
li.error{color:#b3261e}li.warning{color:#8a5a00}li.info{color:#333}\
pre{background:#f4f4f4;padding:1rem;overflow-x:auto}";

/// Self-contained HTML document with every value escaped.
pub fn to_document<R: Reportable>(report: &R) -> String {
    let heading = escape_html(&report.heading());
    let status = if report.passed() { "pass" } else { "fail" };

    let mut body = String::new();
    for section in report.sections() {
        if section.items.is_empty() {
            continue;
        }
        let class = section.kind.css_class();
        body.push_str(&format!(
            "<section class=\"{}\">\n<h2>{} ({})</h2>\n",
            class,
            escape_html(&section.title),
            section.items.len()
        ));
        if section.kind == SectionKind::Preformatted {
            for item in &section.items {
                body.push_str(&format!("<pre>{}</pre>\n", escape_html(item)));
            }
        } else {
            body.push_str("<ul>\n");
            for item in &section.items {
                body.push_str(&format!("<li class=\"{}\">{}</li>\n", class, escape_html(item)));
            }
            body.push_str("</ul>\n");
        }
        body.push_str("</section>\n");
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{heading}</title>\n<style>{style}</style>\n</head>\n<body>\n\
         <h1 class=\"{status}\">{heading}</h1>\n{body}</body>\n</html>\n",
        heading = heading,
        style = DOCUMENT_STYLE,
        status = status,
        body = body
    )
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
