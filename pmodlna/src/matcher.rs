//! Identification des devices : choix du profil d'un client.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use tracing::{debug, trace};

use crate::catalogue::ProfileSet;
use crate::error::{ProfileError, Result};
use crate::identity::{DeviceIdentity, IdentityField};
use crate::profile::DeviceProfile;
use crate::schema::{HeaderMatch, IdentificationSpec};

const REGEX_SYNTAX: &[char] = &[
    '\\', '^', '$', '.', '|', '?', '*', '+', '(', ')', '[', ']', '{', '}',
];

/// Pattern for one identity field.
#[derive(Debug, Clone)]
enum FieldPattern {
    Substring(String),
    /// The raw pattern is also tried as a plain substring, so literal values
    /// holding a `.` (URLs, model numbers) still match.
    Regex { raw: String, re: Regex },
}

impl FieldPattern {
    fn compile(raw: &str, profile: &str, location: &str) -> Result<Self> {
        if raw.contains(REGEX_SYNTAX) {
            let re = build_regex(raw, profile, location)?;
            Ok(FieldPattern::Regex {
                raw: raw.to_lowercase(),
                re,
            })
        } else {
            Ok(FieldPattern::Substring(raw.to_lowercase()))
        }
    }

    fn matches(&self, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        let lowered = value.to_lowercase();
        match self {
            FieldPattern::Substring(s) => lowered.contains(s.as_str()),
            FieldPattern::Regex { raw, re } => lowered.contains(raw.as_str()) || re.is_match(value),
        }
    }
}

#[derive(Debug, Clone)]
enum HeaderValue {
    Equals(String),
    Substring(String),
    Regex(Regex),
}

#[derive(Debug, Clone)]
struct HeaderMatcher {
    name: String,
    value: HeaderValue,
}

impl HeaderMatcher {
    fn matches(&self, identity: &DeviceIdentity) -> bool {
        let Some(actual) = identity.header(&self.name) else {
            return false;
        };
        match &self.value {
            HeaderValue::Equals(expected) => actual.eq_ignore_ascii_case(expected),
            HeaderValue::Substring(expected) => actual.to_lowercase().contains(expected.as_str()),
            HeaderValue::Regex(re) => re.is_match(actual),
        }
    }
}

/// Compiled identification block of a profile.
///
/// Every configured field and every header matcher must match (AND).
#[derive(Debug, Clone)]
pub struct Identification {
    fields: Vec<(IdentityField, FieldPattern)>,
    headers: Vec<HeaderMatcher>,
}

impl Identification {
    pub(crate) fn compile(spec: &IdentificationSpec, profile: &str) -> Result<Self> {
        let configured = [
            (IdentityField::FriendlyName, &spec.friendly_name),
            (IdentityField::Manufacturer, &spec.manufacturer),
            (IdentityField::ManufacturerUrl, &spec.manufacturer_url),
            (IdentityField::ModelName, &spec.model_name),
            (IdentityField::ModelNumber, &spec.model_number),
            (IdentityField::ModelDescription, &spec.model_description),
            (IdentityField::ModelUrl, &spec.model_url),
            (IdentityField::SerialNumber, &spec.serial_number),
        ];

        let mut fields = Vec::new();
        for (field, value) in configured {
            let Some(raw) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            let location = format!("identification.{}", field.as_str());
            fields.push((field, FieldPattern::compile(raw, profile, &location)?));
        }

        let headers = spec
            .headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let location = format!("identification.headers[{}]", i);
                let value = match header.match_type {
                    HeaderMatch::Equals => HeaderValue::Equals(header.value.clone()),
                    HeaderMatch::Substring => HeaderValue::Substring(header.value.to_lowercase()),
                    HeaderMatch::Regex => {
                        HeaderValue::Regex(build_regex(&header.value, profile, &location)?)
                    }
                };
                Ok::<_, ProfileError>(HeaderMatcher {
                    name: header.name.clone(),
                    value,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if fields.is_empty() && headers.is_empty() {
            return Err(ProfileError::EmptyIdentification {
                profile: profile.to_string(),
            });
        }

        Ok(Self { fields, headers })
    }

    pub fn matches(&self, identity: &DeviceIdentity) -> bool {
        self.fields
            .iter()
            .all(|(field, pattern)| pattern.matches(identity.field(*field)))
            && self.headers.iter().all(|h| h.matches(identity))
    }
}

fn build_regex(pattern: &str, profile: &str, location: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ProfileError::InvalidRegex {
            profile: profile.to_string(),
            location: location.to_string(),
            pattern: pattern.to_string(),
            source,
        })
}

/// Picks the profile of a client.
///
/// Profiles are tried in declaration order and the first one whose
/// identification fully matches wins; the default profile is returned when
/// none does.
pub fn resolve<'a>(identity: &DeviceIdentity, profiles: &'a ProfileSet) -> &'a Arc<DeviceProfile> {
    let found = profiles.profiles().iter().find(|profile| {
        let matched = profile
            .identification
            .as_ref()
            .is_some_and(|id| id.matches(identity));
        trace!(profile = %profile.name, matched, "Trying device profile");
        matched
    });

    match found {
        Some(profile) => {
            debug!(
                profile = %profile.name,
                friendly_name = identity.friendly_name(),
                "Device profile resolved"
            );
            profile
        }
        None => {
            debug!(
                friendly_name = identity.friendly_name(),
                manufacturer = identity.manufacturer(),
                "No device profile matched, using default"
            );
            profiles.default_profile()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::HeaderSpec;

    fn sony_identification() -> Identification {
        let spec = IdentificationSpec {
            friendly_name: Some(r"KDL-\d{2}([A-Z]X\d2\d|CX400).*".to_string()),
            manufacturer: Some("Sony".to_string()),
            headers: vec![HeaderSpec {
                name: "X-AV-Client-Info".to_string(),
                value: r".*KDL-\d{2}([A-Z]X\d2\d|CX400).*".to_string(),
                match_type: HeaderMatch::Regex,
            }],
            ..Default::default()
        };
        Identification::compile(&spec, "Sony Bravia (2011)").unwrap()
    }

    #[test]
    fn test_all_fields_must_match() {
        let id = sony_identification();

        let bravia = DeviceIdentity::new()
            .with_friendly_name("KDL-55CX400")
            .with_manufacturer("Sony Corporation")
            .with_header("x-av-client-info", "av=5.0; cn=\"Sony Corporation\"; mn=\"BRAVIA KDL-55CX400\"");
        assert!(id.matches(&bravia));

        let no_header = DeviceIdentity::new()
            .with_friendly_name("KDL-55CX400")
            .with_manufacturer("Sony");
        assert!(!id.matches(&no_header));

        let other_vendor = DeviceIdentity::new()
            .with_friendly_name("KDL-55CX400")
            .with_manufacturer("Samsung")
            .with_header("X-AV-Client-Info", "KDL-55CX400");
        assert!(!id.matches(&other_vendor));
    }

    #[test]
    fn test_literal_patterns_match_as_substring() {
        let spec = IdentificationSpec {
            manufacturer_url: Some("http://www.microsoft.com/".to_string()),
            model_name: Some("Xbox".to_string()),
            ..Default::default()
        };
        let id = Identification::compile(&spec, "Xbox").unwrap();

        let xbox = DeviceIdentity::new()
            .with_manufacturer_url("http://www.microsoft.com/")
            .with_model_name("Xbox 360");
        assert!(id.matches(&xbox));

        let empty = DeviceIdentity::new();
        assert!(!id.matches(&empty));

        // `+` rend la valeur régulière mais le texte brut reste accepté
        let spec = IdentificationSpec {
            model_number: Some("C+D".to_string()),
            ..Default::default()
        };
        let id = Identification::compile(&spec, "C+D").unwrap();
        assert!(id.matches(&DeviceIdentity::new().with_model_number("c+d-100")));
        assert!(id.matches(&DeviceIdentity::new().with_model_number("CCD")));
        assert!(!id.matches(&DeviceIdentity::new().with_model_number("DC")));
    }

    #[test]
    fn test_header_match_modes() {
        let spec = IdentificationSpec {
            headers: vec![
                HeaderSpec {
                    name: "User-Agent".to_string(),
                    value: "Linux/2.6 UPnP/1.0".to_string(),
                    match_type: HeaderMatch::Substring,
                },
                HeaderSpec {
                    name: "X-Device".to_string(),
                    value: "Renderer".to_string(),
                    match_type: HeaderMatch::Equals,
                },
            ],
            ..Default::default()
        };
        let id = Identification::compile(&spec, "Headers").unwrap();

        let ok = DeviceIdentity::new()
            .with_header("user-agent", "Foo Linux/2.6 UPnP/1.0 Bar")
            .with_header("X-DEVICE", "renderer");
        assert!(id.matches(&ok));

        let wrong = DeviceIdentity::new()
            .with_header("user-agent", "Foo Linux/2.6 UPnP/1.0 Bar")
            .with_header("X-Device", "Renderer 2");
        assert!(!id.matches(&wrong));
    }

    #[test]
    fn test_invalid_and_empty_identification() {
        let spec = IdentificationSpec {
            friendly_name: Some("KDL-(".to_string()),
            ..Default::default()
        };
        let err = Identification::compile(&spec, "Broken").unwrap_err();
        assert!(err.to_string().contains("identification.friendly_name"));

        let empty = IdentificationSpec {
            manufacturer: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Identification::compile(&empty, "Empty"),
            Err(ProfileError::EmptyIdentification { .. })
        ));
    }
}
