//! Configuration validation.
//!
//! Detects unknown/misspelled fields and limits that would make a retention
//! pass meaningless or destructive.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::schema::DicelogConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "limit", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "retention.records_limit"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Known keys per config section.
fn known_sections() -> HashMap<&'static str, &'static [&'static str]> {
    HashMap::from([
        (
            "paths",
            &["data_dir", "bot_subdir", "document_name", "archive_db"][..],
        ),
        (
            "retention",
            &[
                "records_limit",
                "participants_limit",
                "dice_users_limit",
                "color_map_limit",
                "concurrency",
                "document_timeout_secs",
                "dry_run",
            ][..],
        ),
    ])
}

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

/// Validate a config file at the given path, or the discovered one if `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let is_toml = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .is_none_or(|e| e == "toml");

    match std::fs::read_to_string(actual_path) {
        Ok(content) if is_toml => {
            let mut result = validate_toml_str(&crate::env_subst::substitute_env(&content));
            result.config_path = Some(actual_path.clone());
            result
        },
        Ok(content) => {
            let content = crate::env_subst::substitute_env(&content);
            let mut diagnostics = Vec::new();
            match crate::loader::parse_config(&content, actual_path) {
                Ok(config) => check_limits(&config, &mut diagnostics),
                Err(e) => diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    category: "type-error",
                    path: String::new(),
                    message: format!("failed to parse config: {e}"),
                }),
            }
            ValidationResult {
                diagnostics,
                config_path: Some(actual_path.clone()),
            }
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: Some(actual_path.clone()),
        },
    }
}

/// Validate a TOML string without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    if let Some(table) = toml_value.as_table() {
        check_unknown_fields(table, &mut diagnostics);
    }

    match toml::from_str::<DicelogConfig>(toml_str) {
        Ok(config) => check_limits(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    table: &toml::map::Map<String, toml::Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let sections = known_sections();
    let section_names: Vec<&str> = sections.keys().copied().collect();

    for (key, value) in table {
        let Some(fields) = sections.get(key.as_str()) else {
            let message = match suggest(key, &section_names, 3) {
                Some(s) => format!("unknown section (did you mean \"{s}\"?)"),
                None => "unknown section".to_string(),
            };
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "unknown-field",
                path: key.clone(),
                message,
            });
            continue;
        };

        let Some(inner) = value.as_table() else {
            continue;
        };
        for field in inner.keys() {
            if fields.contains(&field.as_str()) {
                continue;
            }
            let message = match suggest(field, fields, 3) {
                Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                None => "unknown field".to_string(),
            };
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "unknown-field",
                path: format!("{key}.{field}"),
                message,
            });
        }
    }
}

fn check_limits(config: &DicelogConfig, diagnostics: &mut Vec<Diagnostic>) {
    let r = &config.retention;
    for (name, value) in [
        ("records_limit", r.records_limit),
        ("participants_limit", r.participants_limit),
        ("dice_users_limit", r.dice_users_limit),
        ("color_map_limit", r.color_map_limit),
    ] {
        if value == 0 {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "limit",
                path: format!("retention.{name}"),
                message: "limit must be at least 1; 0 would empty the collection".into(),
            });
        }
    }

    if r.concurrency == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "limit",
            path: "retention.concurrency".into(),
            message: "concurrency must be at least 1".into(),
        });
    }

    if r.document_timeout_secs == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "limit",
            path: "retention.document_timeout_secs".into(),
            message: "no per-document deadline; a pathological document can stall the run"
                .into(),
        });
    }

    if r.color_map_limit < r.participants_limit {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "limit",
            path: "retention.color_map_limit".into(),
            message: "smaller than participants_limit; active users may lose their colors"
                .into(),
        });
    }
}
