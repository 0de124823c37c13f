//! Attribute validation for declared resources

use std::collections::HashMap;
use std::sync::LazyLock;

use cortx_core::resource::Value;
use regex::Regex;

use crate::client::VersioningStatus;

/// Lowercase letters, digits, dots and hyphens; starts and ends alphanumeric
static BUCKET_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9.-]*[a-z0-9]$").ok());

/// Validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation
pub type ValidationResult = Result<(), Vec<ValidationError>>;

fn error(path: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        path: path.to_string(),
        message: message.into(),
    }
}

/// Check a bucket name against the naming rules
pub fn validate_bucket_name(name: &str) -> Result<(), ValidationError> {
    if name.len() < 3 || name.len() > 63 {
        return Err(error(
            "bucket",
            format!("bucket must be between 3 and 63 characters, got {}", name.len()),
        ));
    }
    if !BUCKET_NAME.as_ref().is_some_and(|re| re.is_match(name)) {
        return Err(error(
            "bucket",
            format!(
                "Invalid bucket name '{}'. Only lowercase letters, numbers, dots and hyphens are allowed",
                name
            ),
        ));
    }
    if name.contains("..") {
        return Err(error(
            "bucket",
            format!("Invalid bucket name '{}'. Adjacent dots are not allowed", name),
        ));
    }
    Ok(())
}

/// Validate bucket resource attributes
pub fn validate_bucket(attributes: &HashMap<String, Value>) -> ValidationResult {
    let mut errors = Vec::new();

    match attributes.get("bucket") {
        Some(Value::String(name)) => {
            if let Err(e) = validate_bucket_name(name) {
                errors.push(e);
            }
        }
        Some(_) => errors.push(error("bucket", "bucket must be a string")),
        // defaults to the resource name
        None => {}
    }

    if let Some(value) = attributes.get("versioning") {
        match value {
            Value::String(status) => {
                // Accept both lowercase (enabled) and CamelCase (Enabled)
                if VersioningStatus::parse(&capitalize_first(status)).is_none() {
                    errors.push(error(
                        "versioning",
                        format!(
                            "Invalid versioning value '{}'. Must be one of: enabled, suspended",
                            status
                        ),
                    ));
                }
            }
            _ => errors.push(error("versioning", "versioning must be a string")),
        }
    }

    for flag in ["force_destroy", "object_lock_enabled"] {
        if let Some(value) = attributes.get(flag)
            && !matches!(value, Value::Bool(_))
        {
            errors.push(error(flag, format!("{} must be a boolean", flag)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate object data source arguments
pub fn validate_object(attributes: &HashMap<String, Value>) -> ValidationResult {
    let mut errors = Vec::new();
    for required in ["bucket", "key"] {
        match attributes.get(required) {
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(Value::String(_)) | None => {
                errors.push(error(required, format!("{} is required", required)))
            }
            Some(_) => errors.push(error(required, format!("{} must be a string", required))),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse a declared versioning value
pub fn parse_versioning(value: &str) -> Option<VersioningStatus> {
    VersioningStatus::parse(&capitalize_first(value))
}

/// Capitalize the first letter of a string
fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}

/// Validate a resource based on its type
pub fn validate_resource(
    resource_type: &str,
    attributes: &HashMap<String, Value>,
) -> ValidationResult {
    match resource_type {
        "cortx.bucket" => validate_bucket(attributes),
        "cortx.object" => validate_object(attributes),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(name: &str) -> HashMap<String, Value> {
        HashMap::from([("bucket".to_string(), Value::String(name.to_string()))])
    }

    #[test]
    fn valid_bucket() {
        let mut attrs = bucket("my-bucket.logs");
        attrs.insert("versioning".to_string(), Value::String("enabled".to_string()));
        attrs.insert("force_destroy".to_string(), Value::Bool(true));
        assert!(validate_bucket(&attrs).is_ok());
    }

    #[test]
    fn bucket_name_length() {
        let errors = validate_bucket(&bucket("ab")).unwrap_err();
        assert!(errors[0].message.contains("between 3 and 63 characters"));

        let long = "a".repeat(64);
        assert!(validate_bucket(&bucket(&long)).is_err());
    }

    #[test]
    fn bucket_name_characters() {
        assert!(validate_bucket_name("My_Bucket").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("a..b").is_err());
        assert!(validate_bucket_name("cortx-bucket-01").is_ok());
    }

    #[test]
    fn invalid_versioning_status() {
        let mut attrs = bucket("my-bucket");
        attrs.insert("versioning".to_string(), Value::String("on".to_string()));

        let errors = validate_bucket(&attrs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("enabled, suspended"));
    }

    #[test]
    fn parse_versioning_accepts_both_cases() {
        assert_eq!(parse_versioning("suspended"), Some(VersioningStatus::Suspended));
        assert_eq!(parse_versioning("Enabled"), Some(VersioningStatus::Enabled));
        assert_eq!(parse_versioning("off"), None);
    }

    #[test]
    fn object_requires_bucket_and_key() {
        let errors = validate_object(&bucket("my-bucket")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "key");
    }

    #[test]
    fn flags_must_be_boolean() {
        let mut attrs = bucket("my-bucket");
        attrs.insert("force_destroy".to_string(), Value::String("yes".to_string()));
        let errors = validate_resource("cortx.bucket", &attrs).unwrap_err();
        assert_eq!(errors[0].path, "force_destroy");
    }
}
