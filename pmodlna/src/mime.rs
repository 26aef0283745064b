//! Types MIME annoncés aux renderers.

use crate::media::MediaKind;
use crate::profile::DeviceProfile;

/// Usual MIME types by container, used when a profile declares none.
const DEFAULT_MIME_TYPES: &[(MediaKind, &str, &str)] = &[
    (MediaKind::Audio, "mp3", "audio/mpeg"),
    (MediaKind::Audio, "flac", "audio/flac"),
    (MediaKind::Audio, "m4a", "audio/mp4"),
    (MediaKind::Audio, "aac", "audio/aac"),
    (MediaKind::Audio, "wav", "audio/wav"),
    (MediaKind::Audio, "ogg", "audio/ogg"),
    (MediaKind::Audio, "wma", "audio/x-ms-wma"),
    (MediaKind::Audio, "asf", "audio/x-ms-wma"),
    (MediaKind::Video, "ts", "video/vnd.dlna.mpeg-tts"),
    (MediaKind::Video, "mpegts", "video/vnd.dlna.mpeg-tts"),
    (MediaKind::Video, "mpeg", "video/mpeg"),
    (MediaKind::Video, "mp4", "video/mp4"),
    (MediaKind::Video, "mkv", "video/x-matroska"),
    (MediaKind::Video, "matroska", "video/x-matroska"),
    (MediaKind::Video, "avi", "video/avi"),
    (MediaKind::Video, "asf", "video/x-ms-asf"),
    (MediaKind::Video, "wmv", "video/x-ms-wmv"),
    (MediaKind::Video, "webm", "video/webm"),
    (MediaKind::Photo, "jpeg", "image/jpeg"),
    (MediaKind::Photo, "jpg", "image/jpeg"),
    (MediaKind::Photo, "png", "image/png"),
    (MediaKind::Photo, "gif", "image/gif"),
];

/// MIME type to announce for a container, preferring the profile's own table.
pub fn resolve_mime_type(profile: &DeviceProfile, kind: MediaKind, container: &str) -> Option<String> {
    if let Some(mime) = profile.mime_type(kind, container) {
        return Some(mime.to_string());
    }
    default_mime_type(kind, container).map(str::to_string)
}

pub fn default_mime_type(kind: MediaKind, container: &str) -> Option<&'static str> {
    let container = container.trim();
    DEFAULT_MIME_TYPES
        .iter()
        .find(|(k, c, _)| *k == kind && c.eq_ignore_ascii_case(container))
        .map(|(_, _, mime)| *mime)
}
