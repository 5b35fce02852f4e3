//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] before the proxy
//! accepts traffic: an empty target list, a zero timeout, malformed
//! target URLs, and override directives that could never produce a valid
//! outbound request. Every problem is reported, each with a suggestion
//! where one helps.

use axum::http::{HeaderName, HeaderValue, Method};

use super::model::Config;
use crate::error::ValidationError;
use crate::target::Target;

/// Validate a single target URL. Returns `Ok(())` or a human-readable error.
pub fn validate_target_url(url: &str) -> Result<(), String> {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else if parsed.host_str().map_or(true, str::is_empty) {
                Err(format!("'{url}' has no host"))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

/// Validate a `Method` override. Returns `Ok(())` or a human-readable error.
pub fn validate_method(method: &str) -> Result<(), String> {
    Method::from_bytes(method.as_bytes())
        .map(|_| ())
        .map_err(|_| format!("'{method}' is not a valid HTTP method"))
}

fn validate_overrides(target: &Target, id: &str, errors: &mut Vec<ValidationError>) {
    if let Some(method) = target.method_override() {
        if let Err(msg) = validate_method(method) {
            errors.push(ValidationError {
                target: id.to_string(),
                field: "Method".into(),
                message: msg,
                suggestion: None,
            });
        }
    }

    if let Some(host) = target.host_override() {
        if host.is_empty() || HeaderValue::from_str(host).is_err() {
            errors.push(ValidationError {
                target: id.to_string(),
                field: "Host".into(),
                message: format!("'{host}' is not a valid host override"),
                suggestion: None,
            });
        }
    }

    for (key, value) in target.header_overrides() {
        if HeaderName::from_bytes(key.as_bytes()).is_err() {
            errors.push(ValidationError {
                target: id.to_string(),
                field: key.clone(),
                message: "not a valid header name".into(),
                suggestion: Some("query parameters on a target URL become headers".into()),
            });
        } else if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError {
                target: id.to_string(),
                field: key.clone(),
                message: format!("'{value}' is not a valid header value"),
                suggestion: None,
            });
        }
    }
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.timeout == 0 {
        errors.push(ValidationError {
            target: "(root)".into(),
            field: "timeout".into(),
            message: "timeout must be greater than zero".into(),
            suggestion: Some(format!(
                "the default is {}ms",
                super::model::DEFAULT_TIMEOUT_MS
            )),
        });
    }

    if config.targets.is_empty() {
        errors.push(ValidationError {
            target: "(root)".into(),
            field: "targets".into(),
            message: "at least one target must be defined".into(),
            suggestion: Some("the first target is the primary".into()),
        });
        return Err(errors);
    }

    for (i, url) in config.targets.iter().enumerate() {
        let id = format!("targets[{i}]");

        if let Err(msg) = validate_target_url(url) {
            errors.push(ValidationError {
                target: id,
                field: "url".into(),
                suggestion: (!url.contains("://")).then(|| format!("did you mean 'http://{url}'?")),
                message: msg,
            });
            continue;
        }

        if let Ok(target) = Target::parse(url) {
            validate_overrides(&target, &id, &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let mut lines = vec![format!(
        "  {} targets, timeout {}ms\n",
        config.targets.len(),
        config.timeout
    )];

    for (i, url) in config.targets.iter().enumerate() {
        let role = if i == 0 { "primary" } else { "secondary" };
        lines.push(format!("  [{i}] {url} ({role})"));

        if let Ok(target) = Target::parse(url) {
            let mode = if target.is_fixed_path() {
                "fixed path"
            } else {
                "append inbound path"
            };
            lines.push(format!("    path:    {mode}"));
            if let Some(method) = target.method_override() {
                lines.push(format!("    method:  {method}"));
            }
            if let Some(host) = target.host_override() {
                lines.push(format!("    host:    {host}"));
            }
            for (key, value) in target.header_overrides() {
                lines.push(format!("    header:  {key}: {value}"));
            }
        }
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}
