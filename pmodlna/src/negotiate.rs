//! Négociation de la lecture d'un média pour un client.
//!
//! Resolves the client's profile, then tries direct play, direct stream and
//! transcoding in that order. The result is a plain value object the caller
//! can log, serialize or hand to the streaming layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalogue::ProfileSet;
use crate::direct_play::{PlayDecision, Rejection, check_direct_play_with};
use crate::identity::DeviceIdentity;
use crate::matcher::resolve;
use crate::media::MediaDescriptor;
use crate::mime::resolve_mime_type;
use crate::profile::DeviceProfile;
use crate::transcode::{TranscodePlan, select_target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMethod {
    DirectPlay,
    /// Codecs are kept, only the container changes.
    DirectStream,
    Transcode,
    /// Neither played directly nor covered by a transcoding target.
    Unsupported,
}

impl PlayMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayMethod::DirectPlay => "direct_play",
            PlayMethod::DirectStream => "direct_stream",
            PlayMethod::Transcode => "transcode",
            PlayMethod::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for PlayMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationOptions {
    /// Allow remuxing into a container of a direct-play rule.
    pub direct_stream: bool,
}

impl Default for NegotiationOptions {
    fn default() -> Self {
        Self {
            direct_stream: true,
        }
    }
}

/// Outcome of a negotiation.
#[derive(Debug, Clone, Serialize)]
pub struct Negotiation {
    pub method: PlayMethod,
    /// Name of the resolved profile.
    pub profile: String,
    /// Container the client receives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TranscodePlan>,
    /// Why the media could not be played as it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
    #[serde(skip)]
    pub device_profile: Arc<DeviceProfile>,
}

/// Negotiates playback with default options.
pub fn negotiate(identity: &DeviceIdentity, media: &MediaDescriptor, profiles: &ProfileSet) -> Negotiation {
    negotiate_with(identity, media, profiles, NegotiationOptions::default())
}

pub fn negotiate_with(
    identity: &DeviceIdentity,
    media: &MediaDescriptor,
    profiles: &ProfileSet,
    options: NegotiationOptions,
) -> Negotiation {
    let profile = Arc::clone(resolve(identity, profiles));
    let negotiation = negotiate_for_profile(profile, media, options);

    debug!(
        profile = %negotiation.profile,
        kind = %media.kind,
        container = ?media.container,
        method = %negotiation.method,
        "Playback negotiated"
    );
    negotiation
}

/// Negotiates playback against an already resolved profile.
pub fn negotiate_for_profile(
    profile: Arc<DeviceProfile>,
    media: &MediaDescriptor,
    options: NegotiationOptions,
) -> Negotiation {
    let mut negotiation = Negotiation {
        method: PlayMethod::Unsupported,
        profile: profile.name.clone(),
        container: None,
        mime_type: None,
        target: None,
        reason: None,
        device_profile: Arc::clone(&profile),
    };

    let reason = match check_direct_play_with(&profile, media, options.direct_stream) {
        PlayDecision::DirectPlay { .. } => {
            negotiation.method = PlayMethod::DirectPlay;
            negotiation.container = media.containers().next().map(str::to_string);
            negotiation.mime_type = negotiation
                .container
                .as_deref()
                .and_then(|c| resolve_mime_type(&profile, media.kind, c));
            return negotiation;
        }
        PlayDecision::DirectStream { container, .. } => {
            negotiation.method = PlayMethod::DirectStream;
            negotiation.mime_type = resolve_mime_type(&profile, media.kind, &container);
            negotiation.container = Some(container);
            return negotiation;
        }
        PlayDecision::NeedsTranscode { reason } => reason,
    };

    negotiation.reason = Some(reason);
    if let Some(plan) = select_target(&profile, media) {
        negotiation.method = PlayMethod::Transcode;
        negotiation.mime_type = resolve_mime_type(&profile, media.kind, &plan.container);
        negotiation.container = Some(plan.container.clone());
        negotiation.target = Some(plan);
    }
    negotiation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use crate::schema::ProfileDocument;

    fn profile(yaml: &str) -> Arc<DeviceProfile> {
        let doc: ProfileDocument = serde_yaml::from_str(yaml).unwrap();
        Arc::new(DeviceProfile::compile(&doc).unwrap())
    }

    const RADIO: &str = r#"
name: Radio
direct_play:
  - { container: "mp3,flac", type: audio }
transcoding:
  - { container: mp3, audio_codec: mp3, type: audio }
"#;

    #[test]
    fn test_direct_play_reports_source_container() {
        let radio = profile(RADIO);
        let media = MediaDescriptor::audio("flac").with_audio_codec("flac");
        let n = negotiate_for_profile(radio, &media, NegotiationOptions::default());

        assert_eq!(n.method, PlayMethod::DirectPlay);
        assert_eq!(n.profile, "Radio");
        assert_eq!(n.container.as_deref(), Some("flac"));
        assert_eq!(n.mime_type.as_deref(), Some("audio/flac"));
        assert!(n.target.is_none());
        assert!(n.reason.is_none());
    }

    #[test]
    fn test_transcode_keeps_the_reason() {
        let radio = profile(RADIO);
        let media = MediaDescriptor::audio("ogg").with_audio_codec("vorbis");
        let n = negotiate_for_profile(radio, &media, NegotiationOptions::default());

        assert_eq!(n.method, PlayMethod::Transcode);
        assert_eq!(n.container.as_deref(), Some("mp3"));
        assert_eq!(n.mime_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(n.target.as_ref().map(|t| t.kind), Some(MediaKind::Audio));
        assert!(n.reason.is_some());
    }

    #[test]
    fn test_unsupported_without_target() {
        let radio = profile(RADIO);
        let media = MediaDescriptor::video("mkv").with_video_codec("h264");
        let n = negotiate_for_profile(radio, &media, NegotiationOptions::default());

        assert_eq!(n.method, PlayMethod::Unsupported);
        assert!(n.container.is_none());
        assert!(n.target.is_none());
    }

    #[test]
    fn test_serialized_form() {
        let radio = profile(RADIO);
        let media = MediaDescriptor::audio("ogg").with_audio_codec("vorbis");
        let n = negotiate_for_profile(radio, &media, NegotiationOptions::default());

        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["method"], "transcode");
        assert_eq!(json["profile"], "Radio");
        assert_eq!(json["target"]["container"], "mp3");
        assert_eq!(json["reason"]["cause"], "container_not_supported");
        assert_eq!(json["reason"]["rule"], 0);
        assert!(json.get("device_profile").is_none());
    }
}
