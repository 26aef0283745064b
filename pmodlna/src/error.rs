//! Types d'erreurs pour pmodlna

use std::{io, path::PathBuf};

use crate::condition::Operator;
use crate::media::Property;

/// Erreurs de chargement des profils DLNA
///
/// Every variant raised while compiling a template carries the profile name
/// and the path of the offending rule inside that template.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile '{profile}': {location}: invalid regex '{pattern}': {source}")]
    InvalidRegex {
        profile: String,
        location: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("profile '{profile}': {location}: '{value}' is not a number (property {property})")]
    InvalidNumber {
        profile: String,
        location: String,
        property: Property,
        value: String,
    },

    #[error("profile '{profile}': {location}: '{value}' is not a boolean (property {property})")]
    InvalidFlag {
        profile: String,
        location: String,
        property: Property,
        value: String,
    },

    #[error("profile '{profile}': {location}: operator {operator} cannot be applied to {property}")]
    OperatorMismatch {
        profile: String,
        location: String,
        operator: Operator,
        property: Property,
    },

    #[error("profile '{profile}': {location}: value list is empty")]
    EmptyValueList { profile: String, location: String },

    #[error("profile '{profile}': identification declares no criteria")]
    EmptyIdentification { profile: String },

    #[error("profile without a name at position {0}")]
    MissingName(usize),

    #[error("profile '{0}' is declared more than once")]
    DuplicateProfile(String),

    #[error("no default profile (a profile without identification) is configured")]
    MissingDefault,

    #[error("several default profiles are configured: {}", .0.join(", "))]
    MultipleDefaults(Vec<String>),

    #[error("cannot read profile templates from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid profile template {origin}: {source}")]
    Template {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Type Result spécialisé pour pmodlna
pub type Result<T> = std::result::Result<T, ProfileError>;

/// Where a rule lives inside a profile template, used to build error messages.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RuleLocation<'a> {
    pub profile: &'a str,
    pub path: &'a str,
}

impl RuleLocation<'_> {
    pub(crate) fn invalid_regex(&self, pattern: &str, source: regex::Error) -> ProfileError {
        ProfileError::InvalidRegex {
            profile: self.profile.to_string(),
            location: self.path.to_string(),
            pattern: pattern.to_string(),
            source,
        }
    }

    pub(crate) fn invalid_number(&self, property: Property, value: &str) -> ProfileError {
        ProfileError::InvalidNumber {
            profile: self.profile.to_string(),
            location: self.path.to_string(),
            property,
            value: value.to_string(),
        }
    }

    pub(crate) fn invalid_flag(&self, property: Property, value: &str) -> ProfileError {
        ProfileError::InvalidFlag {
            profile: self.profile.to_string(),
            location: self.path.to_string(),
            property,
            value: value.to_string(),
        }
    }

    pub(crate) fn operator_mismatch(&self, operator: Operator, property: Property) -> ProfileError {
        ProfileError::OperatorMismatch {
            profile: self.profile.to_string(),
            location: self.path.to_string(),
            operator,
            property,
        }
    }

    pub(crate) fn empty_list(&self) -> ProfileError {
        ProfileError::EmptyValueList {
            profile: self.profile.to_string(),
            location: self.path.to_string(),
        }
    }
}
