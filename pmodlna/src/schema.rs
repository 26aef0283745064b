//! Format YAML des modèles de profils DLNA.
//!
//! These are the raw documents read from the template catalogue. They are
//! compiled into [`DeviceProfile`](crate::DeviceProfile)s by
//! [`ProfileSet`](crate::ProfileSet); nothing here is evaluated directly.

use serde::{Deserialize, Serialize};

use crate::condition::ConditionSpec;
use crate::media::MediaKind;
use crate::profile::CodecScope;

/// One profile template.
///
/// List fields and bitrate limits left out of a specific profile are taken
/// from the default profile at load time; an explicitly empty list stays empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_type: Option<String>,
    /// Absent on the default profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification: Option<IdentificationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_streaming_bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_static_bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_play: Option<Vec<DirectPlaySpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcoding: Option<Vec<TranscodeSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_rules: Option<Vec<CodecRuleSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_rules: Option<Vec<ContainerRuleSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_types: Option<Vec<MimeTypeSpec>>,
    /// Server identity presented to the devices of this profile.
    #[serde(default, skip_serializing_if = "AdvertisedIdentity::is_empty")]
    pub advertised: AdvertisedIdentity,
    /// Value of the Sony `X-AV-Server-Info` aggregation flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sony_aggregation_flags: Option<String>,
}

impl ProfileDocument {
    /// Fills the fields this template leaves out with the default profile's.
    pub fn with_fallback(mut self, default: &ProfileDocument) -> Self {
        fn fill<T: Clone>(slot: &mut Option<T>, fallback: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(fallback);
            }
        }

        fill(&mut self.client_type, &default.client_type);
        fill(&mut self.max_streaming_bitrate, &default.max_streaming_bitrate);
        fill(&mut self.max_static_bitrate, &default.max_static_bitrate);
        fill(&mut self.direct_play, &default.direct_play);
        fill(&mut self.transcoding, &default.transcoding);
        fill(&mut self.codec_rules, &default.codec_rules);
        fill(&mut self.container_rules, &default.container_rules);
        fill(&mut self.mime_types, &default.mime_types);
        fill(&mut self.sony_aggregation_flags, &default.sony_aggregation_flags);

        let advertised = &mut self.advertised;
        fill(&mut advertised.manufacturer, &default.advertised.manufacturer);
        fill(&mut advertised.manufacturer_url, &default.advertised.manufacturer_url);
        fill(&mut advertised.model_name, &default.advertised.model_name);
        fill(&mut advertised.model_number, &default.advertised.model_number);
        fill(&mut advertised.model_url, &default.advertised.model_url);
        self
    }

    pub fn is_default(&self) -> bool {
        self.identification.is_none()
    }
}

/// Description fields the server announces to a device, in place of its
/// own, when the device only browses servers it knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvertisedIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
}

impl AdvertisedIdentity {
    pub fn is_empty(&self) -> bool {
        self == &AdvertisedIdentity::default()
    }
}

/// Patterns identifying the devices a profile applies to.
///
/// A value containing regex syntax is matched as a case-insensitive regex,
/// any other value as a case-insensitive substring. A regex value also
/// matches when the device field contains the pattern text literally, so
/// URLs and model numbers holding a `.` need no escaping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentificationSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSpec {
    pub name: String,
    pub value: String,
    #[serde(default, rename = "match")]
    pub match_type: HeaderMatch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMatch {
    #[default]
    Equals,
    Substring,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectPlaySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(rename = "type")]
    pub kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Encoder limits for this target.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codec_rules: Vec<CodecRuleSpec>,
    /// MPEG-TS output must use 192-byte M2TS packets.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enable_mpegts_m2ts_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecRuleSpec {
    #[serde(rename = "type")]
    pub scope: CodecScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRuleSpec {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeTypeSpec {
    pub container: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub mime_type: String,
}

/// Contents of a template file: a `profiles:` list or a single profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TemplateFile {
    Many { profiles: Vec<ProfileDocument> },
    One(ProfileDocument),
}

impl TemplateFile {
    pub fn into_documents(self) -> Vec<ProfileDocument> {
        match self {
            TemplateFile::Many { profiles } => profiles,
            TemplateFile::One(profile) => vec![profile],
        }
    }
}
