//! Choix de la cible de transcodage.

use serde::Serialize;
use tracing::debug;

use crate::media::{MediaDescriptor, MediaKind, Property};
use crate::profile::{CodecConstraintRule, CodecScope, DeviceProfile, TranscodeTarget, ValueList};

/// Upper bounds the encoder must respect, gathered from the constraints of
/// the chosen target. When several rules bound the same attribute the
/// smallest bound is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EncoderLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_framerate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_video_bitrate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_audio_channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_audio_bitrate: Option<u64>,
}

impl EncoderLimits {
    fn from_rules(rules: &[CodecConstraintRule]) -> Self {
        let mut limits = EncoderLimits::default();
        for condition in rules.iter().flat_map(|r| r.conditions.iter()) {
            let Some(bound) = condition.upper_bound() else {
                continue;
            };
            match condition.property {
                Property::Width => tighten(&mut limits.max_width, bound as u32),
                Property::Height => tighten(&mut limits.max_height, bound as u32),
                Property::VideoBitrate => tighten(&mut limits.max_video_bitrate, bound as u64),
                Property::AudioChannels => tighten(&mut limits.max_audio_channels, bound as u32),
                Property::AudioBitrate => tighten(&mut limits.max_audio_bitrate, bound as u64),
                Property::VideoFramerate => {
                    limits.max_framerate = Some(limits.max_framerate.map_or(bound, |v| v.min(bound)));
                }
                _ => {}
            }
        }
        limits
    }
}

fn tighten<T: Ord + Copy>(slot: &mut Option<T>, bound: T) {
    *slot = Some(slot.map_or(bound, |v| v.min(bound)));
}

/// What the media must be converted into.
#[derive(Debug, Clone, Serialize)]
pub struct TranscodePlan {
    /// Index of the target in the profile's transcoding list.
    pub target: usize,
    pub kind: MediaKind,
    pub container: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    /// Codec rules the encoder output must satisfy.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<CodecConstraintRule>,
    pub limits: EncoderLimits,
    /// MPEG-TS output uses M2TS (192-byte) packets.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub enable_mpegts_m2ts_mode: bool,
}

/// Selects the first transcoding target of the profile usable for the media.
///
/// A target is usable when its kind matches and it declares a container and,
/// for audio and video, the codecs it produces. Returns `None` when the
/// profile has no such target.
pub fn select_target(profile: &DeviceProfile, media: &MediaDescriptor) -> Option<TranscodePlan> {
    let (index, target) = profile
        .transcoding
        .iter()
        .enumerate()
        .find(|(_, target)| target.kind == media.kind && target.is_declared())?;

    let plan = build_plan(profile, index, target, media);
    debug!(
        profile = %profile.name,
        container = %plan.container,
        video_codec = ?plan.video_codec,
        audio_codec = ?plan.audio_codec,
        "Transcoding target selected"
    );
    Some(plan)
}

fn build_plan(
    profile: &DeviceProfile,
    index: usize,
    target: &TranscodeTarget,
    media: &MediaDescriptor,
) -> TranscodePlan {
    let (video_codec, audio_codec) = match media.kind {
        MediaKind::Video => (
            output_codec(&target.video_codecs, media.video_codec.as_deref()),
            output_codec(&target.audio_codecs, media.audio_codec.as_deref()),
        ),
        MediaKind::Audio => (None, output_codec(&target.audio_codecs, media.audio_codec.as_deref())),
        MediaKind::Photo => (None, None),
    };

    let mut constraints = target.codec_rules.clone();
    let scopes = match media.kind {
        MediaKind::Video => vec![
            (CodecScope::VideoCodec, video_codec.as_deref()),
            (CodecScope::VideoAudioCodec, audio_codec.as_deref()),
        ],
        MediaKind::Audio => vec![(CodecScope::AudioCodec, audio_codec.as_deref())],
        MediaKind::Photo => Vec::new(),
    };
    constraints.extend(
        profile
            .codec_rules
            .iter()
            .filter(|rule| scopes.iter().any(|(scope, codec)| rule.applies_to(*scope, *codec)))
            .cloned(),
    );

    let mut limits = EncoderLimits::from_rules(&constraints);
    if media.kind == MediaKind::Video {
        if let Some(cap) = profile.max_streaming_bitrate {
            tighten(&mut limits.max_video_bitrate, cap);
        }
    }

    TranscodePlan {
        target: index,
        kind: target.kind,
        container: target.container.clone(),
        video_codec,
        audio_codec,
        constraints,
        limits,
        enable_mpegts_m2ts_mode: target.enable_mpegts_m2ts_mode,
    }
}

/// Keeps the source codec when the target accepts it, otherwise the first
/// codec the target lists.
fn output_codec(accepted: &ValueList, source: Option<&str>) -> Option<String> {
    if accepted.is_any() {
        return None;
    }
    match source {
        Some(codec) if accepted.accepts(codec) => Some(codec.trim().to_ascii_lowercase()),
        _ => accepted.first().map(str::to_string),
    }
}
