//! Profils DLNA compilés.
//!
//! A [`DeviceProfile`] is a flat, read-only record: fallback values from the
//! default profile are already filled in, literals are parsed and regexes
//! compiled. Profiles are shared between negotiations behind an `Arc`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, ConditionSpec};
use crate::error::{ProfileError, Result, RuleLocation};
use crate::matcher::Identification;
use crate::media::{MediaDescriptor, MediaKind};
use crate::schema::{
    AdvertisedIdentity, CodecRuleSpec, ContainerRuleSpec, DirectPlaySpec, MimeTypeSpec,
    ProfileDocument, TranscodeSpec,
};

/// Comma separated list of containers or codecs.
///
/// An empty list, or one holding `*`, accepts every value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueList(Vec<String>);

impl ValueList {
    pub fn parse(raw: Option<&str>) -> Self {
        let items: Vec<String> = raw
            .unwrap_or_default()
            .split(',')
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .collect();

        if items.iter().any(|v| v == "*") {
            ValueList(Vec::new())
        } else {
            ValueList(items)
        }
    }

    pub fn is_any(&self) -> bool {
        self.0.is_empty()
    }

    pub fn accepts(&self, value: &str) -> bool {
        self.is_any() || self.0.iter().any(|v| v.eq_ignore_ascii_case(value.trim()))
    }

    /// First listed value, `None` for a wildcard list.
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for ValueList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("*")
        } else {
            f.write_str(&self.0.join(","))
        }
    }
}

impl Serialize for ValueList {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Which codec of a stream a codec rule constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecScope {
    /// Video codec of a video item.
    VideoCodec,
    /// Audio codec of a video item.
    VideoAudioCodec,
    /// Audio codec of an audio item.
    AudioCodec,
}

impl fmt::Display for CodecScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CodecScope::VideoCodec => "video_codec",
            CodecScope::VideoAudioCodec => "video_audio_codec",
            CodecScope::AudioCodec => "audio_codec",
        })
    }
}

#[derive(Debug, Clone)]
pub struct DirectPlayRule {
    pub kind: MediaKind,
    pub containers: ValueList,
    pub video_codecs: ValueList,
    pub audio_codecs: ValueList,
}

/// Conditions that must all hold for a codec to be accepted.
///
/// Rules of one scope targeting the same codec list are alternatives: one
/// passing rule is enough, unless a rule is `required`, in which case it must
/// pass on its own.
#[derive(Debug, Clone, Serialize)]
pub struct CodecConstraintRule {
    pub scope: CodecScope,
    pub codecs: ValueList,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    pub conditions: Vec<Condition>,
}

impl CodecConstraintRule {
    pub fn applies_to(&self, scope: CodecScope, codec: Option<&str>) -> bool {
        self.scope == scope
            && (self.codecs.is_any() || codec.is_some_and(|c| self.codecs.accepts(c)))
    }

    /// First condition the media fails, if any.
    pub fn first_failure(&self, media: &MediaDescriptor) -> Option<&Condition> {
        self.conditions.iter().find(|c| !c.evaluate_media(media))
    }
}

#[derive(Debug, Clone)]
pub struct ContainerConstraintRule {
    pub kind: MediaKind,
    pub containers: ValueList,
    pub conditions: Vec<Condition>,
}

impl ContainerConstraintRule {
    pub fn applies_to(&self, kind: MediaKind, container: Option<&str>) -> bool {
        self.kind == kind
            && (self.containers.is_any() || container.is_some_and(|c| self.containers.accepts(c)))
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeTarget {
    pub kind: MediaKind,
    pub container: String,
    pub video_codecs: ValueList,
    pub audio_codecs: ValueList,
    pub codec_rules: Vec<CodecConstraintRule>,
    pub enable_mpegts_m2ts_mode: bool,
}

impl TranscodeTarget {
    /// Whether the target declares what it produces for its kind.
    pub fn is_declared(&self) -> bool {
        if self.container.is_empty() {
            return false;
        }
        match self.kind {
            MediaKind::Video => !self.video_codecs.is_any(),
            MediaKind::Audio => !self.audio_codecs.is_any(),
            MediaKind::Photo => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MimeTypeRule {
    pub kind: MediaKind,
    pub containers: ValueList,
    pub mime_type: String,
}

/// Compiled device profile.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub name: String,
    pub client_type: Option<String>,
    /// `None` for the default profile.
    pub identification: Option<Identification>,
    pub max_streaming_bitrate: Option<u64>,
    pub max_static_bitrate: Option<u64>,
    pub direct_play: Vec<DirectPlayRule>,
    pub transcoding: Vec<TranscodeTarget>,
    pub codec_rules: Vec<CodecConstraintRule>,
    pub container_rules: Vec<ContainerConstraintRule>,
    pub mime_types: Vec<MimeTypeRule>,
    /// Server description fields announced to matching devices.
    pub advertised: AdvertisedIdentity,
    pub sony_aggregation_flags: Option<String>,
}

impl DeviceProfile {
    /// Compiles a template whose fallbacks have already been applied.
    pub fn compile(doc: &ProfileDocument) -> Result<Self> {
        let profile = doc.name.as_str();

        let identification = doc
            .identification
            .as_ref()
            .map(|spec| Identification::compile(spec, profile))
            .transpose()?;

        let direct_play = doc
            .direct_play
            .iter()
            .flatten()
            .map(compile_direct_play)
            .collect();

        let transcoding = doc
            .transcoding
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, spec)| compile_transcode(spec, profile, i))
            .collect::<Result<Vec<_>>>()?;

        let codec_rules = doc
            .codec_rules
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, spec)| compile_codec_rule(spec, profile, &format!("codec_rules[{}]", i)))
            .collect::<Result<Vec<_>>>()?;

        let container_rules = doc
            .container_rules
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, spec)| compile_container_rule(spec, profile, i))
            .collect::<Result<Vec<_>>>()?;

        let mime_types = doc.mime_types.iter().flatten().map(compile_mime_type).collect();

        Ok(Self {
            name: doc.name.clone(),
            client_type: doc.client_type.clone(),
            identification,
            max_streaming_bitrate: doc.max_streaming_bitrate,
            max_static_bitrate: doc.max_static_bitrate,
            direct_play,
            transcoding,
            codec_rules,
            container_rules,
            mime_types,
            advertised: doc.advertised.clone(),
            sony_aggregation_flags: doc.sony_aggregation_flags.clone(),
        })
    }

    pub fn is_default(&self) -> bool {
        self.identification.is_none()
    }

    /// MIME type this profile declares for a container, if any.
    pub fn mime_type(&self, kind: MediaKind, container: &str) -> Option<&str> {
        self.mime_types
            .iter()
            .find(|m| m.kind == kind && m.containers.accepts(container))
            .map(|m| m.mime_type.as_str())
    }
}

fn compile_direct_play(spec: &DirectPlaySpec) -> DirectPlayRule {
    DirectPlayRule {
        kind: spec.kind,
        containers: ValueList::parse(spec.container.as_deref()),
        video_codecs: ValueList::parse(spec.video_codec.as_deref()),
        audio_codecs: ValueList::parse(spec.audio_codec.as_deref()),
    }
}

fn compile_transcode(spec: &TranscodeSpec, profile: &str, index: usize) -> Result<TranscodeTarget> {
    let codec_rules = spec
        .codec_rules
        .iter()
        .enumerate()
        .map(|(i, rule)| {
            compile_codec_rule(rule, profile, &format!("transcoding[{}].codec_rules[{}]", index, i))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TranscodeTarget {
        kind: spec.kind,
        container: spec
            .container
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase(),
        video_codecs: ValueList::parse(spec.video_codec.as_deref()),
        audio_codecs: ValueList::parse(spec.audio_codec.as_deref()),
        codec_rules,
        enable_mpegts_m2ts_mode: spec.enable_mpegts_m2ts_mode,
    })
}

fn compile_codec_rule(spec: &CodecRuleSpec, profile: &str, path: &str) -> Result<CodecConstraintRule> {
    Ok(CodecConstraintRule {
        scope: spec.scope,
        codecs: ValueList::parse(spec.codec.as_deref()),
        required: spec.required,
        conditions: compile_conditions(&spec.conditions, profile, path)?,
    })
}

fn compile_container_rule(
    spec: &ContainerRuleSpec,
    profile: &str,
    index: usize,
) -> Result<ContainerConstraintRule> {
    let path = format!("container_rules[{}]", index);
    Ok(ContainerConstraintRule {
        kind: spec.kind,
        containers: ValueList::parse(spec.container.as_deref()),
        conditions: compile_conditions(&spec.conditions, profile, &path)?,
    })
}

fn compile_conditions(specs: &[ConditionSpec], profile: &str, path: &str) -> Result<Vec<Condition>> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let location = format!("{}.conditions[{}]", path, i);
            Condition::compile(
                spec,
                RuleLocation {
                    profile,
                    path: &location,
                },
            )
        })
        .collect()
}

fn compile_mime_type(spec: &MimeTypeSpec) -> MimeTypeRule {
    MimeTypeRule {
        kind: spec.kind,
        containers: ValueList::parse(Some(spec.container.as_str())),
        mime_type: spec.mime_type.clone(),
    }
}

/// Rejects a template that would be ambiguous once loaded.
pub(crate) fn check_name(doc: &ProfileDocument, position: usize) -> Result<()> {
    if doc.name.trim().is_empty() {
        return Err(ProfileError::MissingName(position));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_list() {
        let list = ValueList::parse(Some("mp3, FLAC,m4a,wma"));
        assert!(list.accepts("mp3"));
        assert!(list.accepts("flac"));
        assert!(!list.accepts("ogg"));
        assert_eq!(list.first(), Some("mp3"));
        assert_eq!(list.to_string(), "mp3,flac,m4a,wma");

        assert!(ValueList::parse(None).is_any());
        assert!(ValueList::parse(Some("")).is_any());
        assert!(ValueList::parse(Some("*")).accepts("anything"));
    }

    #[test]
    fn test_codec_rule_scope() {
        let rule = CodecConstraintRule {
            scope: CodecScope::VideoCodec,
            codecs: ValueList::parse(Some("h264")),
            required: false,
            conditions: Vec::new(),
        };
        assert!(rule.applies_to(CodecScope::VideoCodec, Some("H264")));
        assert!(!rule.applies_to(CodecScope::VideoCodec, Some("mpeg2video")));
        assert!(!rule.applies_to(CodecScope::VideoCodec, None));
        assert!(!rule.applies_to(CodecScope::VideoAudioCodec, Some("h264")));

        let generic = CodecConstraintRule {
            codecs: ValueList::default(),
            ..rule
        };
        assert!(generic.applies_to(CodecScope::VideoCodec, None));
    }

    #[test]
    fn test_compile_reports_rule_location() {
        let doc: ProfileDocument = serde_yaml::from_str(
            r#"
name: Broken
codec_rules:
  - type: video_codec
    codec: h264
    conditions:
      - { condition: less_than_equal, property: video_framerate, value: "30" }
  - type: video_codec
    conditions:
      - { condition: less_than_equal, property: width, value: "wide" }
"#,
        )
        .unwrap();

        let err = DeviceProfile::compile(&doc).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Broken"), "{}", message);
        assert!(message.contains("codec_rules[1].conditions[0]"), "{}", message);
    }

    #[test]
    fn test_transcode_target_declaration() {
        let target = |container: &str, video: Option<&str>, kind| TranscodeTarget {
            kind,
            container: container.to_string(),
            video_codecs: ValueList::parse(video),
            audio_codecs: ValueList::default(),
            codec_rules: Vec::new(),
            enable_mpegts_m2ts_mode: false,
        };

        assert!(target("ts", Some("h264"), MediaKind::Video).is_declared());
        assert!(!target("ts", None, MediaKind::Video).is_declared());
        assert!(!target("", Some("h264"), MediaKind::Video).is_declared());
        assert!(target("jpeg", None, MediaKind::Photo).is_declared());
    }
}
