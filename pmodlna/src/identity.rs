//! Identité d'un client qui se connecte au serveur.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identity field a profile template can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityField {
    FriendlyName,
    Manufacturer,
    ManufacturerUrl,
    ModelName,
    ModelNumber,
    ModelDescription,
    ModelUrl,
    SerialNumber,
}

impl IdentityField {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentityField::FriendlyName => "friendly_name",
            IdentityField::Manufacturer => "manufacturer",
            IdentityField::ManufacturerUrl => "manufacturer_url",
            IdentityField::ModelName => "model_name",
            IdentityField::ModelNumber => "model_number",
            IdentityField::ModelDescription => "model_description",
            IdentityField::ModelUrl => "model_url",
            IdentityField::SerialNumber => "serial_number",
        }
    }
}

/// Snapshot of a connecting client: the fields of its UPnP description
/// document and the headers of its HTTP request.
///
/// Built once per session with the `with_*` methods and never modified
/// afterwards. Header names are compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    friendly_name: String,
    manufacturer: String,
    manufacturer_url: String,
    model_name: String,
    model_number: String,
    model_description: String,
    model_url: String,
    serial_number: String,
    headers: Headers,
}

impl DeviceIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_friendly_name(mut self, value: impl Into<String>) -> Self {
        self.friendly_name = value.into();
        self
    }

    pub fn with_manufacturer(mut self, value: impl Into<String>) -> Self {
        self.manufacturer = value.into();
        self
    }

    pub fn with_manufacturer_url(mut self, value: impl Into<String>) -> Self {
        self.manufacturer_url = value.into();
        self
    }

    pub fn with_model_name(mut self, value: impl Into<String>) -> Self {
        self.model_name = value.into();
        self
    }

    pub fn with_model_number(mut self, value: impl Into<String>) -> Self {
        self.model_number = value.into();
        self
    }

    pub fn with_model_description(mut self, value: impl Into<String>) -> Self {
        self.model_description = value.into();
        self
    }

    pub fn with_model_url(mut self, value: impl Into<String>) -> Self {
        self.model_url = value.into();
        self
    }

    pub fn with_serial_number(mut self, value: impl Into<String>) -> Self {
        self.serial_number = value.into();
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name.as_ref(), value.into());
        self
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn field(&self, field: IdentityField) -> &str {
        match field {
            IdentityField::FriendlyName => &self.friendly_name,
            IdentityField::Manufacturer => &self.manufacturer,
            IdentityField::ManufacturerUrl => &self.manufacturer_url,
            IdentityField::ModelName => &self.model_name,
            IdentityField::ModelNumber => &self.model_number,
            IdentityField::ModelDescription => &self.model_description,
            IdentityField::ModelUrl => &self.model_url,
            IdentityField::SerialNumber => &self.serial_number,
        }
    }

    /// Value of a request header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// Request headers keyed by their lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    fn insert(&mut self, name: &str, value: String) {
        self.0.insert(name.to_ascii_lowercase(), value);
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

impl From<BTreeMap<String, String>> for Headers {
    fn from(map: BTreeMap<String, String>) -> Self {
        let mut headers = Headers::default();
        for (name, value) in map {
            headers.insert(&name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_case_insensitive() {
        let identity = DeviceIdentity::new().with_header("X-AV-Client-Info", "av=5.0");
        assert_eq!(identity.header("x-av-client-info"), Some("av=5.0"));
        assert_eq!(identity.header("X-AV-CLIENT-INFO"), Some("av=5.0"));
        assert_eq!(identity.header("User-Agent"), None);
    }

    #[test]
    fn test_deserialize_lowercases_header_names() {
        let identity: DeviceIdentity = serde_yaml::from_str(
            "friendly_name: KDL-55CX400\nheaders:\n  X-AV-Physical-Unit-Info: pa=\"BRAVIA\"\n",
        )
        .unwrap();
        assert_eq!(identity.friendly_name(), "KDL-55CX400");
        assert_eq!(identity.manufacturer(), "");
        assert_eq!(
            identity.header("x-av-physical-unit-info"),
            Some("pa=\"BRAVIA\"")
        );
    }
}
