//! # pmodlna - Négociation de lecture DLNA
//!
//! Decides how a media item is delivered to a DLNA client: played as it is,
//! remuxed into another container, transcoded, or refused.
//!
//! The decision is driven by device profiles, declarative YAML templates
//! that identify a family of devices and list what they can play:
//!
//! - [`resolve`] picks the profile of a client from its [`DeviceIdentity`]
//! - [`check_direct_play`] checks a [`MediaDescriptor`] against the
//!   direct-play rules and codec constraints of the profile
//! - [`select_target`] chooses the transcoding target when needed
//! - [`negotiate`] chains the three and returns a [`Negotiation`]
//!
//! Profiles are loaded into an immutable [`ProfileSet`]; the process-wide
//! [`catalogue()`] swaps sets atomically on reload.
//!
//! ## Usage
//!
//! ```no_run
//! use pmodlna::{DeviceIdentity, MediaDescriptor, PlayMethod, catalogue, NegotiationOptions};
//!
//! let tv = DeviceIdentity::new()
//!     .with_friendly_name("KDL-55CX400")
//!     .with_manufacturer("Sony");
//! let movie = MediaDescriptor::video("mkv").with_video_codec("hevc");
//!
//! let negotiation = catalogue().negotiate(&tv, &movie, NegotiationOptions::default());
//! if negotiation.method == PlayMethod::Transcode {
//!     println!("transcode to {:?}", negotiation.container);
//! }
//! ```

pub mod catalogue;
pub mod condition;
pub mod direct_play;
pub mod error;
pub mod identity;
pub mod matcher;
pub mod media;
pub mod mime;
pub mod negotiate;
pub mod profile;
pub mod schema;
pub mod transcode;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

pub use catalogue::{
    LoadReport, ProfileCatalogue, ProfileSet, ProfileSource, builtin_documents, catalogue,
    parse_template,
};
pub use condition::{Condition, ConditionSpec, Operator};
pub use direct_play::{PlayDecision, RejectCause, Rejection, check_direct_play, check_direct_play_with};
pub use error::{ProfileError, Result};
pub use identity::DeviceIdentity;
pub use matcher::resolve;
pub use media::{AttributeValue, MediaDescriptor, MediaKind, Property};
pub use mime::{default_mime_type, resolve_mime_type};
pub use negotiate::{
    Negotiation, NegotiationOptions, PlayMethod, negotiate, negotiate_for_profile, negotiate_with,
};
pub use profile::{CodecScope, DeviceProfile, ValueList};
pub use schema::ProfileDocument;
pub use transcode::{EncoderLimits, TranscodePlan, select_target};

#[cfg(feature = "pmoconfig")]
pub use config_ext::DlnaConfigExt;
