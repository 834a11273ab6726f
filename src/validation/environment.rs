//! External tool checks: presence and minimum version.

use crate::config::BuilderConfig;
use crate::models::ValidationReport;
use crate::system::process::query_version;
use crate::system::ProcessRunner;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::path::Path;

/// `java version "1.8.0_292"`, `openjdk version "17.0.2"`, `Apache Ant(TM) version 1.10.12`
static VERSION_KEYWORD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"version\s+"?(\d+(?:\.\d+)*)"#).expect("valid version pattern")
});

/// Fallback for banners without the keyword, e.g. `kotlinc-jvm 1.9.0 (JRE 17)`.
static DOTTED_NUMBER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+\.\d+(?:\.\d+)*)").expect("valid dotted number pattern"));

/// One row of the tools table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequirement {
    /// Name used in findings
    pub label: &'static str,
    /// Executable whose version is checked
    pub command: String,
    pub minimum: &'static str,
    pub mandatory: bool,
}

/// java (>= 1.8), the build toolchain (>= 1.10), kotlinc (>= 1.3, optional).
pub fn tool_requirements(config: &BuilderConfig) -> Vec<ToolRequirement> {
    vec![
        ToolRequirement {
            label: "java",
            command: config.java_command.clone(),
            minimum: "1.8",
            mandatory: true,
        },
        ToolRequirement {
            label: "ant",
            command: config.toolchain_command.clone(),
            minimum: "1.10",
            mandatory: true,
        },
        ToolRequirement {
            label: "kotlinc",
            command: config.kotlin_command.clone(),
            minimum: "1.3",
            mandatory: false,
        },
    ]
}

/// Extract the first version number from a `-version` banner.
pub fn parse_version(banner: &str) -> Option<String> {
    VERSION_KEYWORD_REGEX
        .captures(banner)
        .or_else(|| DOTTED_NUMBER_REGEX.captures(banner))
        .map(|caps| caps[1].to_string())
}

/// Compare dotted versions numerically; missing components count as zero.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| part.parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Environment phase. Tools are checked one after another.
pub async fn check_environment(
    runner: &ProcessRunner,
    project: &Path,
    config: &BuilderConfig,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let workdir = if project.is_dir() {
        project.to_path_buf()
    } else {
        std::env::temp_dir()
    };

    for tool in tool_requirements(config) {
        let timeout = config.version_timeout();
        let banner = match query_version(runner, &tool.command, &workdir, timeout).await {
            Ok(banner) => banner,
            Err(e) => {
                log::warn!("[Validate] [ENV] {} version check failed: {}", tool.label, e);
                let message = format!("{} is not available ({}): {}", tool.label, tool.command, e);
                if tool.mandatory {
                    report.error(message);
                } else {
                    report.warning(message);
                }
                continue;
            }
        };

        let Some(version) = parse_version(&banner) else {
            report.warning(format!("Could not determine {} version", tool.label));
            continue;
        };

        log::info!("[Validate] [ENV] {} {}", tool.label, version);
        if compare_versions(&version, tool.minimum) == Ordering::Less {
            let message = format!(
                "{} version {} is below the minimum supported {}",
                tool.label, version, tool.minimum
            );
            if tool.mandatory {
                report.error(message);
            } else {
                report.warning(message);
            }
        }
    }

    report
}
