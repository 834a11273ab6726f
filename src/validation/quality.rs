//! Advisory source checks for component classes. Findings are warnings only.

use super::structure::{source_files, DESIGNER_COMPONENT_MARKER};
use crate::config::BuilderConfig;
use crate::error::PhaseError;
use crate::models::ValidationReport;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

const ANNOTATIONS_PACKAGE: &str = "com.google.appinventor.components.annotations";

/// Imports a component class needs, by simple name.
pub const REQUIRED_IMPORTS: &[&str] = &["DesignerComponent", "SimpleObject"];

/// Annotations that expose a public method to the designer.
pub const BLOCK_ANNOTATIONS: &[&str] = &["@SimpleFunction", "@SimpleProperty", "@SimpleEvent"];

const BLOCK_ANNOTATION_NAMES: &str = "@SimpleFunction, @SimpleProperty or @SimpleEvent";

/// `public [static|final|synchronized]* <type> <name>(`.
///
/// Constructors have no type and don't match.
static PUBLIC_METHOD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^\s*public\s+(?:(?:static|final|synchronized|abstract)\s+)*",
        r"[\w.\[\]?]+(?:<[^()]*>)?(?:\[\])*\s+(\w+)\s*\(",
    ))
    .expect("valid method pattern")
});

fn imports(source: &str, simple_name: &str) -> bool {
    let exact = format!("import {}.{};", ANNOTATIONS_PACKAGE, simple_name);
    let wildcard = format!("import {}.*;", ANNOTATIONS_PACKAGE);
    source.contains(&exact) || source.contains(&wildcard)
}

/// Whether the annotation block directly above `line_index` carries a block annotation.
///
/// Walking upward, lines that close an argument list opened further up belong
/// to a multi-line annotation and are skipped until its opening line.
fn has_block_annotation(lines: &[&str], line_index: usize) -> bool {
    let mut open_args = 0usize;
    for line in lines[..line_index].iter().rev() {
        let trimmed = line.trim();
        if is_blank_or_comment(trimmed) {
            continue;
        }
        let closes = trimmed.matches(')').count();
        let opens = trimmed.matches('(').count();
        if open_args > 0 || (closes > opens && !trimmed.starts_with('@')) {
            open_args = (open_args + closes).saturating_sub(opens);
            if open_args > 0 {
                continue;
            }
        }
        if !trimmed.starts_with('@') {
            return false;
        }
        if BLOCK_ANNOTATIONS
            .iter()
            .any(|annotation| trimmed.starts_with(annotation))
        {
            return true;
        }
    }
    false
}

fn is_blank_or_comment(trimmed: &str) -> bool {
    trimmed.is_empty()
        || trimmed.starts_with("//")
        || trimmed.starts_with('*')
        || trimmed.starts_with("/*")
}

/// Findings for one source file. `display_name` prefixes each finding.
pub fn check_source(display_name: &str, source: &str) -> Vec<String> {
    let mut findings = Vec::new();
    if !source.contains(DESIGNER_COMPONENT_MARKER) {
        return findings;
    }

    for simple_name in REQUIRED_IMPORTS {
        if !imports(source, simple_name) {
            findings.push(format!(
                "{}: missing import {}.{}",
                display_name, ANNOTATIONS_PACKAGE, simple_name
            ));
        }
    }

    let lines: Vec<&str> = source.lines().collect();
    for (index, line) in lines.iter().enumerate() {
        let Some(caps) = PUBLIC_METHOD_REGEX.captures(line) else {
            continue;
        };
        if !has_block_annotation(&lines, index) {
            findings.push(format!(
                "{}:{}: public method '{}' has no {} annotation",
                display_name,
                index + 1,
                &caps[1],
                BLOCK_ANNOTATION_NAMES
            ));
        }
    }
    findings
}

/// Code quality phase over every `.java` file in the source directory.
pub fn check_code_quality(
    project: &Path,
    config: &BuilderConfig,
) -> Result<ValidationReport, PhaseError> {
    let mut report = ValidationReport::new();
    for path in source_files(&config.source_path(project), &["java"])? {
        let Ok(source) = std::fs::read_to_string(&path) else {
            report.warning(format!("Could not read {}", path.display()));
            continue;
        };
        let display = path.strip_prefix(project).unwrap_or(&path).display().to_string();
        for finding in check_source(&display, &source) {
            report.warning(finding);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_COMPONENT: &str = r#"package com.example;

import com.google.appinventor.components.annotations.DesignerComponent;
import com.google.appinventor.components.annotations.SimpleFunction;
import com.google.appinventor.components.annotations.SimpleObject;
import com.google.appinventor.components.annotations.SimpleProperty;

@DesignerComponent(version = 1, description = "Demo")
@SimpleObject(external = true)
public class Widget extends AndroidNonvisibleComponent {
    public Widget(ComponentContainer container) {
        super(container.$form());
    }

    /** Adds two numbers. */
    @SimpleFunction(description = "Add")
    public int Add(int a, int b) {
        return a + b;
    }

    @DesignerProperty(editorType = PropertyTypeConstants.PROPERTY_TYPE_STRING)
    @SimpleProperty
    public void Label(String label) {
    }

    private void helper() {
    }
}
"#;

    #[test]
    fn test_well_formed_component_has_no_findings() {
        assert!(check_source("Widget.java", GOOD_COMPONENT).is_empty());
    }

    #[test]
    fn test_unannotated_public_method() {
        let source = GOOD_COMPONENT.replace(
            "    private void helper() {",
            concat!(
                "    public static List<String> Names() {\n",
                "        return null;\n",
                "    }\n\n",
                "    private void helper() {",
            ),
        );
        let findings = check_source("Widget.java", &source);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].contains("public method 'Names'"));
    }

    #[test]
    fn test_missing_imports() {
        let source = GOOD_COMPONENT.replace(
            "import com.google.appinventor.components.annotations.SimpleObject;\n",
            "",
        );
        let findings = check_source("Widget.java", &source);
        assert_eq!(
            findings,
            vec![format!("Widget.java: missing import {}.SimpleObject", ANNOTATIONS_PACKAGE)]
        );
    }

    #[test]
    fn test_wildcard_import_accepted() {
        let source = concat!(
            "import com.google.appinventor.components.annotations.*;\n",
            "@DesignerComponent\n",
            "class W {}",
        );
        assert!(check_source("W.java", source).is_empty());
    }

    #[test]
    fn test_non_component_files_are_skipped() {
        assert!(check_source("Util.java", "public class Util { public void x() {} }").is_empty());
    }

    #[test]
    fn test_multi_line_block_annotation_is_recognized() {
        let source = GOOD_COMPONENT.replace(
            "    @SimpleFunction(description = \"Add\")\n",
            "    @SimpleFunction(\n        description = \"Add\",\n        userVisible = true)\n",
        );
        assert!(source.contains("userVisible"));
        assert!(check_source("Widget.java", &source).is_empty());
    }

    #[test]
    fn test_multi_line_other_annotation_still_warns() {
        let source = GOOD_COMPONENT.replace(
            "    @SimpleFunction(description = \"Add\")\n",
            "    @Deprecated(\n        since = \"2\")\n",
        );
        let findings = check_source("Widget.java", &source);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].contains("public method 'Add'"));
    }

    #[test]
    fn test_multi_line_field_initializer_does_not_hide_missing_annotation() {
        let source = GOOD_COMPONENT.replace(
            "    private void helper() {",
            concat!(
                "    private final int limit = compute(\n",
                "        1, 2);\n",
                "    public void Reset() {\n",
                "    }\n\n",
                "    private void helper() {",
            ),
        );
        let findings = check_source("Widget.java", &source);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].contains("public method 'Reset'"));
    }
}
