//! Build descriptor rule table.
//!
//! The descriptor is checked by literal substring match against the tokens
//! the external toolchain reads. Rules produce findings; severity decides
//! whether a finding is an error or a warning.

use crate::models::ValidationReport;

/// Targets every descriptor must declare.
pub const REQUIRED_TARGETS: &[&str] = &["clean", "compile", "package"];

/// Layout properties every descriptor must declare.
pub const REQUIRED_PROPERTIES: &[&str] = &["src.dir", "build.dir", "dist.dir", "lib.dir"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One literal token the descriptor is expected to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRule {
    pub token: String,
    pub severity: Severity,
    /// Finding reported when the token is absent
    pub message: String,
}

impl DescriptorRule {
    pub fn applies_to(&self, descriptor_text: &str) -> bool {
        !descriptor_text.contains(&self.token)
    }
}

pub fn target_token(name: &str) -> String {
    format!("<target name=\"{}\"", name)
}

pub fn property_token(name: &str) -> String {
    format!("<property name=\"{}\"", name)
}

pub fn declares_target(descriptor_text: &str, name: &str) -> bool {
    descriptor_text.contains(&target_token(name))
}

pub fn declares_property(descriptor_text: &str, name: &str) -> bool {
    descriptor_text.contains(&property_token(name))
}

/// The full rule table for a descriptor named `descriptor_file`.
pub fn descriptor_rules(descriptor_file: &str) -> Vec<DescriptorRule> {
    let mut rules = Vec::new();

    for target in REQUIRED_TARGETS {
        rules.push(DescriptorRule {
            token: target_token(target),
            severity: Severity::Error,
            message: format!("Missing required target in {}: {}", descriptor_file, target),
        });
    }

    for property in REQUIRED_PROPERTIES {
        rules.push(DescriptorRule {
            token: property_token(property),
            severity: Severity::Error,
            message: format!(
                "Missing required property in {}: {}",
                descriptor_file, property
            ),
        });
    }

    // Compiler level and encoding declarations on the javac task
    let advisories = [
        ("source=\"", "No Java source level declared (source=\"...\")"),
        ("target=\"", "No Java target level declared (target=\"...\")"),
        ("encoding=\"UTF-8\"", "Source encoding is not declared as UTF-8"),
    ];
    for (token, message) in advisories {
        rules.push(DescriptorRule {
            token: token.to_string(),
            severity: Severity::Warning,
            message: format!("{} in {}", message, descriptor_file),
        });
    }

    rules
}

/// Apply the rule table to descriptor text.
pub fn check_descriptor(descriptor_file: &str, descriptor_text: &str) -> ValidationReport {
    let mut report = ValidationReport::new();
    for rule in descriptor_rules(descriptor_file) {
        if rule.applies_to(descriptor_text) {
            match rule.severity {
                Severity::Error => report.error(rule.message),
                Severity::Warning => report.warning(rule.message),
            }
        }
    }
    report
}
