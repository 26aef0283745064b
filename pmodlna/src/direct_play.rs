//! Vérification de la lecture directe d'un flux par un profil.

use std::fmt;

use serde::Serialize;
use tracing::trace;

use crate::condition::{Condition, Operator};
use crate::media::{MediaDescriptor, MediaKind, Property};
use crate::profile::{CodecConstraintRule, CodecScope, DeviceProfile, DirectPlayRule, ValueList};

/// Why a direct-play rule (or the profile as a whole) rejected a stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum RejectCause {
    NoRuleForKind {
        kind: MediaKind,
    },
    ContainerNotSupported {
        container: Option<String>,
    },
    VideoCodecNotSupported {
        codec: Option<String>,
    },
    AudioCodecNotSupported {
        codec: Option<String>,
    },
    BitrateAboveLimit {
        bitrate: u64,
        limit: u64,
    },
    ConditionFailed {
        scope: String,
        property: Property,
        operator: Operator,
        expected: String,
        observed: Option<String>,
    },
}

/// Rejection kept for diagnostics: the one of the rule that came closest to
/// accepting the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    /// Index of the direct-play rule, `None` when the profile as a whole refused.
    pub rule: Option<usize>,
    #[serde(flatten)]
    pub cause: RejectCause,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rule) = self.rule {
            write!(f, "direct_play[{}]: ", rule)?;
        }
        match &self.cause {
            RejectCause::NoRuleForKind { kind } => write!(f, "no direct play rule for {}", kind),
            RejectCause::ContainerNotSupported { container } => {
                write!(f, "container {} not supported", container.as_deref().unwrap_or("<unknown>"))
            }
            RejectCause::VideoCodecNotSupported { codec } => {
                write!(f, "video codec {} not supported", codec.as_deref().unwrap_or("<unknown>"))
            }
            RejectCause::AudioCodecNotSupported { codec } => {
                write!(f, "audio codec {} not supported", codec.as_deref().unwrap_or("<unknown>"))
            }
            RejectCause::BitrateAboveLimit { bitrate, limit } => {
                write!(f, "bitrate {} above limit {}", bitrate, limit)
            }
            RejectCause::ConditionFailed {
                scope,
                property,
                operator,
                expected,
                observed,
            } => write!(
                f,
                "{}: {} {} {} failed (observed {})",
                scope,
                property,
                operator,
                expected,
                observed.as_deref().unwrap_or("<unknown>")
            ),
        }
    }
}

/// Outcome of the direct-play check.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayDecision {
    /// The stream is sent unmodified.
    DirectPlay { rule: usize },
    /// The codecs are accepted but the stream must be remuxed into `container`.
    DirectStream { rule: usize, container: String },
    NeedsTranscode { reason: Rejection },
}

/// Checks whether a profile can play a stream directly, remuxing allowed.
pub fn check_direct_play(profile: &DeviceProfile, media: &MediaDescriptor) -> PlayDecision {
    check_direct_play_with(profile, media, true)
}

/// Checks whether a profile can play a stream directly.
///
/// Rules are tried in order and the first one that fully passes wins. Only
/// when no rule accepts the stream as it is, and `allow_direct_stream` is
/// set, rules whose codecs match are tried again with their own container.
/// A stream refused only because of `max_static_bitrate` is streamed in its
/// own container when it fits `max_streaming_bitrate`.
pub fn check_direct_play_with(
    profile: &DeviceProfile,
    media: &MediaDescriptor,
    allow_direct_stream: bool,
) -> PlayDecision {
    let mut closest: Option<Rejection> = None;
    let static_limit = within_limit(media.bitrate, profile.max_static_bitrate);
    let rules = || {
        profile
            .direct_play
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.kind == media.kind)
    };

    match static_limit.clone() {
        Err(cause) => keep_closest(&mut closest, None, cause),
        Ok(()) => {
            for (index, rule) in rules() {
                match check_rule(profile, rule, media, None) {
                    Ok(()) => return PlayDecision::DirectPlay { rule: index },
                    Err(cause) => {
                        trace!(profile = %profile.name, rule = index, ?cause, "Direct play rule rejected");
                        keep_closest(&mut closest, Some(index), cause);
                    }
                }
            }
        }
    }

    let can_remux = allow_direct_stream
        && media.kind != MediaKind::Photo
        && within_limit(media.bitrate, profile.max_streaming_bitrate).is_ok();

    if can_remux {
        for (index, rule) in rules() {
            if accepts_container(&rule.containers, media) {
                // déjà essayée telle quelle, sauf si seul le débit statique l'a écartée
                if static_limit.is_ok() || check_rule(profile, rule, media, None).is_err() {
                    continue;
                }
                return PlayDecision::DirectStream {
                    rule: index,
                    container: source_container(&rule.containers, media),
                };
            }
            if !declares_codecs(rule, media.kind) {
                continue;
            }
            let Some(container) = rule.containers.first() else {
                continue;
            };
            if check_rule(profile, rule, media, Some(container)).is_ok() {
                return PlayDecision::DirectStream {
                    rule: index,
                    container: container.to_string(),
                };
            }
        }
    }

    let reason = closest.unwrap_or(Rejection {
        rule: None,
        cause: RejectCause::NoRuleForKind { kind: media.kind },
    });
    PlayDecision::NeedsTranscode { reason }
}

impl RejectCause {
    /// How far a rule got before rejecting the stream.
    fn depth(&self) -> u8 {
        match self {
            RejectCause::NoRuleForKind { .. } => 0,
            RejectCause::ContainerNotSupported { .. } => 1,
            RejectCause::VideoCodecNotSupported { .. } | RejectCause::AudioCodecNotSupported { .. } => 2,
            RejectCause::ConditionFailed { .. } => 3,
            RejectCause::BitrateAboveLimit { .. } => 4,
        }
    }
}

/// Keeps the rejection of the rule that came closest to accepting the
/// stream; on a tie the earliest rule wins.
fn keep_closest(closest: &mut Option<Rejection>, rule: Option<usize>, cause: RejectCause) {
    let closer = closest
        .as_ref()
        .is_none_or(|current| cause.depth() > current.cause.depth());
    if closer {
        *closest = Some(Rejection { rule, cause });
    }
}

/// Source container the rule accepts, kept when the stream is only re-sent
/// at the streaming bitrate.
fn source_container(containers: &ValueList, media: &MediaDescriptor) -> String {
    media
        .containers()
        .find(|c| containers.accepts(c))
        .or_else(|| containers.first())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn within_limit(bitrate: Option<u64>, limit: Option<u64>) -> Result<(), RejectCause> {
    match (bitrate, limit) {
        (Some(bitrate), Some(limit)) if bitrate > limit => {
            Err(RejectCause::BitrateAboveLimit { bitrate, limit })
        }
        _ => Ok(()),
    }
}

/// A rule can only be used for remuxing when it says which codecs it takes.
fn declares_codecs(rule: &DirectPlayRule, kind: MediaKind) -> bool {
    match kind {
        MediaKind::Video => !rule.video_codecs.is_any(),
        MediaKind::Audio => !rule.audio_codecs.is_any(),
        MediaKind::Photo => false,
    }
}

fn accepts_container(containers: &ValueList, media: &MediaDescriptor) -> bool {
    containers.is_any() || media.containers().any(|c| containers.accepts(c))
}

/// Checks one rule. `remux_into` replaces the container check by the
/// container the stream would be remuxed into.
fn check_rule(
    profile: &DeviceProfile,
    rule: &DirectPlayRule,
    media: &MediaDescriptor,
    remux_into: Option<&str>,
) -> Result<(), RejectCause> {
    if remux_into.is_none() && !accepts_container(&rule.containers, media) {
        return Err(RejectCause::ContainerNotSupported {
            container: media.container.clone(),
        });
    }

    match media.kind {
        MediaKind::Video => {
            if !rule.video_codecs.is_any() {
                let accepted = media
                    .video_codec
                    .as_deref()
                    .is_some_and(|c| rule.video_codecs.accepts(c));
                if !accepted {
                    return Err(RejectCause::VideoCodecNotSupported {
                        codec: media.video_codec.clone(),
                    });
                }
            }
            check_audio_codec(&rule.audio_codecs, media)?;
        }
        MediaKind::Audio => check_audio_codec(&rule.audio_codecs, media)?,
        MediaKind::Photo => {}
    }

    check_container_rules(profile, media, remux_into)?;

    match media.kind {
        MediaKind::Video => {
            check_codec_rules(&profile.codec_rules, CodecScope::VideoCodec, media.video_codec.as_deref(), media)?;
            check_codec_rules(
                &profile.codec_rules,
                CodecScope::VideoAudioCodec,
                media.audio_codec.as_deref(),
                media,
            )?;
        }
        MediaKind::Audio => {
            check_codec_rules(&profile.codec_rules, CodecScope::AudioCodec, media.audio_codec.as_deref(), media)?;
        }
        MediaKind::Photo => {}
    }

    Ok(())
}

/// A stream without audio passes any audio codec list.
fn check_audio_codec(accepted: &ValueList, media: &MediaDescriptor) -> Result<(), RejectCause> {
    match media.audio_codec.as_deref() {
        Some(codec) if !accepted.accepts(codec) => Err(RejectCause::AudioCodecNotSupported {
            codec: Some(codec.to_string()),
        }),
        _ => Ok(()),
    }
}

fn check_container_rules(
    profile: &DeviceProfile,
    media: &MediaDescriptor,
    remux_into: Option<&str>,
) -> Result<(), RejectCause> {
    for rule in &profile.container_rules {
        let applies = match remux_into {
            Some(container) => rule.applies_to(media.kind, Some(container)),
            None if rule.containers.is_any() => rule.kind == media.kind,
            None => media.containers().any(|c| rule.applies_to(media.kind, Some(c))),
        };
        if !applies {
            continue;
        }
        if let Some(condition) = rule.conditions.iter().find(|c| !c.evaluate_media(media)) {
            return Err(condition_failed(format!("container {}", rule.containers), condition, media));
        }
    }
    Ok(())
}

/// Applies the codec rules of one scope.
///
/// Rules targeting the same codec list are alternatives, rules targeting
/// different lists (a generic rule and a codec specific one) must all be
/// satisfied, and a required rule must always pass.
pub(crate) fn check_codec_rules(
    rules: &[CodecConstraintRule],
    scope: CodecScope,
    codec: Option<&str>,
    media: &MediaDescriptor,
) -> Result<(), RejectCause> {
    // (codecs, one rule passed, first failure)
    let mut groups: Vec<(&ValueList, bool, Option<RejectCause>)> = Vec::new();

    for rule in rules.iter().filter(|r| r.applies_to(scope, codec)) {
        let failure = rule.first_failure(media).map(|condition| {
            let label = format!("{} {}", scope, codec.unwrap_or("*"));
            condition_failed(label, condition, media)
        });

        if rule.required {
            if let Some(cause) = failure {
                return Err(cause);
            }
            continue;
        }

        match groups.iter_mut().find(|(codecs, _, _)| **codecs == rule.codecs) {
            Some(group) => {
                if failure.is_none() {
                    group.1 = true;
                } else if group.2.is_none() {
                    group.2 = failure;
                }
            }
            None => groups.push((&rule.codecs, failure.is_none(), failure)),
        }
    }

    for (_, passed, failure) in groups {
        if let (false, Some(cause)) = (passed, failure) {
            return Err(cause);
        }
    }
    Ok(())
}

fn condition_failed(scope: String, condition: &Condition, media: &MediaDescriptor) -> RejectCause {
    RejectCause::ConditionFailed {
        scope,
        property: condition.property,
        operator: condition.operator,
        expected: condition.value.clone(),
        observed: media.attribute(condition.property).map(|v| v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ProfileDocument;

    fn profile(yaml: &str) -> DeviceProfile {
        let doc: ProfileDocument = serde_yaml::from_str(yaml).unwrap();
        DeviceProfile::compile(&doc).unwrap()
    }

    #[test]
    fn test_container_list() {
        let denon = profile(
            r#"
name: Denon AVR
direct_play:
  - { container: "mp3,flac,m4a,wma", type: audio }
"#,
        );

        let mp3 = MediaDescriptor::audio("mp3").with_audio_codec("mp3");
        assert_eq!(check_direct_play(&denon, &mp3), PlayDecision::DirectPlay { rule: 0 });

        let ogg = MediaDescriptor::audio("ogg").with_audio_codec("vorbis");
        let PlayDecision::NeedsTranscode { reason } = check_direct_play(&denon, &ogg) else {
            panic!("ogg must not be played directly");
        };
        assert_eq!(reason.rule, Some(0));
        assert!(matches!(reason.cause, RejectCause::ContainerNotSupported { .. }));
    }

    #[test]
    fn test_kind_must_match() {
        let denon = profile(
            r#"
name: Denon AVR
direct_play:
  - { container: "mp3,flac,m4a,wma", type: audio }
"#,
        );
        let video = MediaDescriptor::video("mp3").with_video_codec("mjpeg");
        let PlayDecision::NeedsTranscode { reason } = check_direct_play(&denon, &video) else {
            panic!("a video item must not match an audio rule");
        };
        assert_eq!(
            reason.cause,
            RejectCause::NoRuleForKind {
                kind: MediaKind::Video
            }
        );
    }

    const TV: &str = r#"
name: TV
direct_play:
  - { container: ts, video_codec: h264, audio_codec: "ac3,aac", type: video }
  - { container: mp4, video_codec: "h264,mpeg4", audio_codec: "aac,mp3", type: video }
codec_rules:
  - type: video_codec
    conditions:
      - { condition: less_than_equal, property: width, value: "1920" }
      - { condition: less_than_equal, property: height, value: "1080" }
  - type: video_codec
    codec: h264
    conditions:
      - { condition: less_than_equal, property: video_framerate, value: "30" }
      - { condition: less_than_equal, property: video_bitrate, value: "20000000" }
  - type: video_audio_codec
    codec: aac
    conditions:
      - { condition: less_than_equal, property: audio_channels, value: "2" }
"#;

    #[test]
    fn test_codec_conditions_gate_direct_play() {
        let tv = profile(TV);

        let ok = MediaDescriptor::video("ts")
            .with_video_codec("h264")
            .with_audio_codec("aac")
            .with_framerate(25.0)
            .with_video_bitrate(8_000_000);
        assert_eq!(check_direct_play(&tv, &ok), PlayDecision::DirectPlay { rule: 0 });

        let fast = ok.clone().with_framerate(60.0);
        let PlayDecision::NeedsTranscode { reason } = check_direct_play(&tv, &fast) else {
            panic!("60 fps must be refused");
        };
        assert_eq!(reason.rule, Some(0));
        match reason.cause {
            RejectCause::ConditionFailed {
                property, observed, ..
            } => {
                assert_eq!(property, Property::VideoFramerate);
                assert_eq!(observed.as_deref(), Some("60"));
            }
            other => panic!("unexpected cause {:?}", other),
        }

        let uhd = ok.clone().with_resolution(3840, 2160);
        assert!(matches!(check_direct_play(&tv, &uhd), PlayDecision::NeedsTranscode { .. }));

        let surround = ok.with_audio_channels(6);
        assert!(matches!(
            check_direct_play(&tv, &surround),
            PlayDecision::NeedsTranscode { .. }
        ));
    }

    #[test]
    fn test_direct_stream_when_only_container_differs() {
        let tv = profile(TV);
        let mkv = MediaDescriptor::video("matroska,webm")
            .with_video_codec("h264")
            .with_audio_codec("ac3")
            .with_framerate(24.0);

        assert_eq!(
            check_direct_play(&tv, &mkv),
            PlayDecision::DirectStream {
                rule: 0,
                container: "ts".to_string()
            }
        );

        let PlayDecision::NeedsTranscode { reason } = check_direct_play_with(&tv, &mkv, false) else {
            panic!("remuxing is disabled");
        };
        assert!(matches!(reason.cause, RejectCause::ContainerNotSupported { .. }));
    }

    #[test]
    fn test_same_codec_rules_are_alternatives_unless_required() {
        let lenient = profile(
            r#"
name: Lenient
direct_play:
  - { container: mp4, video_codec: h264, type: video }
codec_rules:
  - type: video_codec
    codec: h264
    conditions:
      - { condition: less_than_equal, property: video_level, value: "41" }
  - type: video_codec
    codec: h264
    conditions:
      - { condition: equals, property: video_profile, value: "high" }
"#,
        );
        let mut high_51 = MediaDescriptor::video("mp4")
            .with_video_codec("h264")
            .with_video_level(51.0);
        high_51.video_profile = Some("High".to_string());
        assert_eq!(check_direct_play(&lenient, &high_51), PlayDecision::DirectPlay { rule: 0 });

        let strict = profile(
            r#"
name: Strict
direct_play:
  - { container: mp4, video_codec: h264, type: video }
codec_rules:
  - type: video_codec
    codec: h264
    required: true
    conditions:
      - { condition: less_than_equal, property: video_level, value: "41" }
  - type: video_codec
    codec: h264
    conditions:
      - { condition: equals, property: video_profile, value: "high" }
"#,
        );
        assert!(matches!(
            check_direct_play(&strict, &high_51),
            PlayDecision::NeedsTranscode { .. }
        ));
    }

    #[test]
    fn test_static_bitrate_limit() {
        let capped = profile(
            r#"
name: Capped
max_static_bitrate: 10000000
max_streaming_bitrate: 10000000
direct_play:
  - { container: mp3, audio_codec: mp3, type: audio }
"#,
        );
        let big = MediaDescriptor::audio("mp3")
            .with_audio_codec("mp3")
            .with_bitrate(12_000_000);
        let PlayDecision::NeedsTranscode { reason } = check_direct_play(&capped, &big) else {
            panic!("bitrate is above the static limit");
        };
        assert_eq!(reason.rule, None);
        assert_eq!(
            reason.cause,
            RejectCause::BitrateAboveLimit {
                bitrate: 12_000_000,
                limit: 10_000_000
            }
        );
    }

    #[test]
    fn test_static_limit_falls_back_to_streaming() {
        let tv = profile(
            r#"
name: TV
max_static_bitrate: 10000000
max_streaming_bitrate: 140000000
direct_play:
  - { container: ts, video_codec: h264, audio_codec: aac, type: video }
"#,
        );
        let ts = MediaDescriptor::video("ts")
            .with_video_codec("h264")
            .with_audio_codec("aac")
            .with_bitrate(12_000_000);
        assert_eq!(
            check_direct_play(&tv, &ts),
            PlayDecision::DirectStream {
                rule: 0,
                container: "ts".to_string()
            }
        );

        let mut mkv = ts.clone();
        mkv.container = Some("mkv".to_string());
        assert_eq!(
            check_direct_play(&tv, &mkv),
            PlayDecision::DirectStream {
                rule: 0,
                container: "ts".to_string()
            }
        );

        // sous la limite statique, lecture directe
        let small = ts.with_bitrate(8_000_000);
        assert_eq!(check_direct_play(&tv, &small), PlayDecision::DirectPlay { rule: 0 });

        let big = small.with_bitrate(12_000_000);
        let PlayDecision::NeedsTranscode { reason } = check_direct_play_with(&tv, &big, false) else {
            panic!("streaming is disabled");
        };
        assert!(matches!(reason.cause, RejectCause::BitrateAboveLimit { .. }));
    }

    #[test]
    fn test_photo_container_rules() {
        let tv = profile(
            r#"
name: Photo TV
direct_play:
  - { container: "jpeg,jpg", type: photo }
container_rules:
  - type: photo
    conditions:
      - { condition: less_than_equal, property: width, value: "1920" }
      - { condition: less_than_equal, property: height, value: "1080" }
"#,
        );
        let small = MediaDescriptor::photo("jpeg").with_resolution(1280, 720);
        assert_eq!(check_direct_play(&tv, &small), PlayDecision::DirectPlay { rule: 0 });

        let large = MediaDescriptor::photo("jpeg").with_resolution(4000, 3000);
        let PlayDecision::NeedsTranscode { reason } = check_direct_play(&tv, &large) else {
            panic!("photo is too large");
        };
        assert!(reason.to_string().contains("width"));
    }
}
