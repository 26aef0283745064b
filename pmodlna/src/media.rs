//! Description technique d'un flux média à négocier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of media a rule or a stream applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Photo,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Photo => "photo",
        })
    }
}

/// Attributes of one concrete media stream.
///
/// Every attribute except the kind is optional: media analysis does not always
/// report everything, and conditions decide how to treat a missing value.
/// `container` may hold a comma separated list (`"mov,mp4,m4a"`), as media
/// probes report it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    pub container: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,

    /// Total bitrate of the file, in bits per second.
    pub bitrate: Option<u64>,

    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_framerate: Option<f64>,
    pub video_bitrate: Option<u64>,
    pub video_level: Option<f64>,
    pub video_profile: Option<String>,
    pub video_bit_depth: Option<u32>,
    pub video_codec_tag: Option<String>,
    pub ref_frames: Option<u32>,
    pub is_anamorphic: Option<bool>,
    pub is_interlaced: Option<bool>,
    pub is_avc: Option<bool>,

    pub audio_channels: Option<u32>,
    pub audio_bitrate: Option<u64>,
    pub audio_sample_rate: Option<u32>,
    pub audio_bit_depth: Option<u32>,
    pub audio_profile: Option<String>,

    pub num_audio_streams: Option<u32>,
    pub num_video_streams: Option<u32>,
}

impl MediaDescriptor {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            container: None,
            video_codec: None,
            audio_codec: None,
            bitrate: None,
            width: None,
            height: None,
            video_framerate: None,
            video_bitrate: None,
            video_level: None,
            video_profile: None,
            video_bit_depth: None,
            video_codec_tag: None,
            ref_frames: None,
            is_anamorphic: None,
            is_interlaced: None,
            is_avc: None,
            audio_channels: None,
            audio_bitrate: None,
            audio_sample_rate: None,
            audio_bit_depth: None,
            audio_profile: None,
            num_audio_streams: None,
            num_video_streams: None,
        }
    }

    pub fn video(container: impl Into<String>) -> Self {
        Self::new(MediaKind::Video).with_container(container)
    }

    pub fn audio(container: impl Into<String>) -> Self {
        Self::new(MediaKind::Audio).with_container(container)
    }

    pub fn photo(container: impl Into<String>) -> Self {
        Self::new(MediaKind::Photo).with_container(container)
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = Some(codec.into());
        self
    }

    pub fn with_audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = Some(codec.into());
        self
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_framerate(mut self, framerate: f64) -> Self {
        self.video_framerate = Some(framerate);
        self
    }

    pub fn with_video_bitrate(mut self, bitrate: u64) -> Self {
        self.video_bitrate = Some(bitrate);
        self
    }

    pub fn with_video_level(mut self, level: f64) -> Self {
        self.video_level = Some(level);
        self
    }

    pub fn with_audio_channels(mut self, channels: u32) -> Self {
        self.audio_channels = Some(channels);
        self
    }

    pub fn with_audio_profile(mut self, profile: impl Into<String>) -> Self {
        self.audio_profile = Some(profile.into());
        self
    }

    /// Containers reported for the stream, split on commas.
    pub fn containers(&self) -> impl Iterator<Item = &str> {
        self.container
            .as_deref()
            .into_iter()
            .flat_map(|c| c.split(','))
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Bitrate of the video stream. Probes often only report the total
    /// bitrate of a video file, which is then used instead.
    pub fn video_bitrate(&self) -> Option<u64> {
        match self.kind {
            MediaKind::Video => self.video_bitrate.or(self.bitrate),
            _ => self.video_bitrate,
        }
    }

    /// Reads the attribute a condition refers to.
    pub fn attribute(&self, property: Property) -> Option<AttributeValue<'_>> {
        use AttributeValue::{Flag, Number, Text};

        match property {
            Property::AudioChannels => self.audio_channels.map(|v| Number(v.into())),
            Property::AudioBitrate => self.audio_bitrate.map(|v| Number(v as f64)),
            Property::AudioSampleRate => self.audio_sample_rate.map(|v| Number(v.into())),
            Property::AudioBitDepth => self.audio_bit_depth.map(|v| Number(v.into())),
            Property::AudioProfile => self.audio_profile.as_deref().map(Text),
            Property::Bitrate => self.bitrate.map(|v| Number(v as f64)),
            Property::Width => self.width.map(|v| Number(v.into())),
            Property::Height => self.height.map(|v| Number(v.into())),
            Property::VideoBitDepth => self.video_bit_depth.map(|v| Number(v.into())),
            Property::VideoBitrate => self.video_bitrate().map(|v| Number(v as f64)),
            Property::VideoFramerate => self.video_framerate.map(Number),
            Property::VideoLevel => self.video_level.map(Number),
            Property::VideoProfile => self.video_profile.as_deref().map(Text),
            Property::VideoCodecTag => self.video_codec_tag.as_deref().map(Text),
            Property::RefFrames => self.ref_frames.map(|v| Number(v.into())),
            Property::IsAnamorphic => self.is_anamorphic.map(Flag),
            Property::IsInterlaced => self.is_interlaced.map(Flag),
            Property::IsAvc => self.is_avc.map(Flag),
            Property::NumAudioStreams => self.num_audio_streams.map(|v| Number(v.into())),
            Property::NumVideoStreams => self.num_video_streams.map(|v| Number(v.into())),
        }
    }
}

/// Media attribute a condition can refer to.
///
/// Adding an attribute means adding a variant here and its accessor in
/// [`MediaDescriptor::attribute`]; rule tables refer to attributes by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    AudioChannels,
    AudioBitrate,
    AudioSampleRate,
    AudioBitDepth,
    AudioProfile,
    Bitrate,
    Width,
    Height,
    VideoBitDepth,
    VideoBitrate,
    VideoFramerate,
    VideoLevel,
    VideoProfile,
    VideoCodecTag,
    RefFrames,
    IsAnamorphic,
    IsInterlaced,
    IsAvc,
    NumAudioStreams,
    NumVideoStreams,
}

/// Type of the values an attribute takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Number,
    Text,
    Flag,
}

impl Property {
    pub fn value_type(self) -> ValueType {
        match self {
            Property::AudioProfile | Property::VideoProfile | Property::VideoCodecTag => {
                ValueType::Text
            }
            Property::IsAnamorphic | Property::IsInterlaced | Property::IsAvc => ValueType::Flag,
            _ => ValueType::Number,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Property::AudioChannels => "audio_channels",
            Property::AudioBitrate => "audio_bitrate",
            Property::AudioSampleRate => "audio_sample_rate",
            Property::AudioBitDepth => "audio_bit_depth",
            Property::AudioProfile => "audio_profile",
            Property::Bitrate => "bitrate",
            Property::Width => "width",
            Property::Height => "height",
            Property::VideoBitDepth => "video_bit_depth",
            Property::VideoBitrate => "video_bitrate",
            Property::VideoFramerate => "video_framerate",
            Property::VideoLevel => "video_level",
            Property::VideoProfile => "video_profile",
            Property::VideoCodecTag => "video_codec_tag",
            Property::RefFrames => "ref_frames",
            Property::IsAnamorphic => "is_anamorphic",
            Property::IsInterlaced => "is_interlaced",
            Property::IsAvc => "is_avc",
            Property::NumAudioStreams => "num_audio_streams",
            Property::NumVideoStreams => "num_video_streams",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute value read from a [`MediaDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue<'a> {
    Number(f64),
    Text(&'a str),
    Flag(bool),
}

impl fmt::Display for AttributeValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => f.write_str(s),
            AttributeValue::Flag(b) => write!(f, "{}", b),
        }
    }
}
