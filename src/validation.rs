//! Instance naming rules.
//!
//! The identifier doubles as the compose project name, the working
//! directory name and the DNS label, so the character set is the
//! intersection of what all three accept.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, TenantBoxError};

pub const MAX_INSTANCE_NAME_LENGTH: usize = 32;
pub const MAX_TEMPLATE_NAME_LENGTH: usize = 24;
/// RFC 1035 label limit
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

static INSTANCE_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("Invalid instance name regex")
});

// No hyphens: the last hyphen of an identifier always starts the template.
static TEMPLATE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+$").expect("Invalid template name regex"));

pub fn validate_instance_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TenantBoxError::invalid_input("instance name cannot be empty"));
    }
    if name.len() > MAX_INSTANCE_NAME_LENGTH {
        return Err(TenantBoxError::invalid_input(format!(
            "instance name is too long: {} characters (max: {})",
            name.len(),
            MAX_INSTANCE_NAME_LENGTH
        )));
    }
    if !INSTANCE_NAME_REGEX.is_match(name) {
        return Err(TenantBoxError::invalid_input(format!(
            "instance name '{}' may only contain lowercase letters, digits and inner hyphens",
            name
        )));
    }
    Ok(())
}

pub fn validate_template_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TenantBoxError::invalid_input("template name cannot be empty"));
    }
    if name.len() > MAX_TEMPLATE_NAME_LENGTH || !TEMPLATE_NAME_REGEX.is_match(name) {
        return Err(TenantBoxError::invalid_input(format!(
            "template name '{}' may only contain lowercase letters and digits",
            name
        )));
    }
    Ok(())
}

/// Stable identifier of an instance: `<name>-<template>`. Template names
/// carry no hyphen, so distinct (name, template) pairs never collide.
pub fn instance_identifier(instance_name: &str, template_name: &str) -> String {
    format!("{}-{}", instance_name, template_name)
}

/// Check an identifier received from outside (path parameters and the like).
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty()
        || identifier.len() > MAX_IDENTIFIER_LENGTH
        || !INSTANCE_NAME_REGEX.is_match(identifier)
    {
        return Err(TenantBoxError::invalid_input(format!(
            "invalid instance identifier '{}'",
            identifier
        )));
    }
    Ok(())
}
