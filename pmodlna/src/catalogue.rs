//! Catalogue des profils DLNA.
//!
//! Profiles come from YAML templates: the ones bundled with the crate and,
//! optionally, a user directory whose templates shadow bundled profiles of
//! the same name. A [`ProfileSet`] is immutable once built; the
//! [`ProfileCatalogue`] swaps whole sets atomically so that negotiations in
//! flight keep the set they started with.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::error::{ProfileError, Result};
use crate::identity::DeviceIdentity;
use crate::matcher::resolve;
use crate::media::MediaDescriptor;
use crate::negotiate::{Negotiation, NegotiationOptions, negotiate_with};
use crate::profile::{DeviceProfile, check_name};
use crate::schema::{ProfileDocument, TemplateFile};

/// Profils embarqués, dans leur ordre de priorité.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("sony_bravia_2011.yaml", include_str!("profiles/sony_bravia_2011.yaml")),
    ("denon_avr.yaml", include_str!("profiles/denon_avr.yaml")),
    ("default.yaml", include_str!("profiles/default.yaml")),
];

/// Parses the templates bundled with the crate.
pub fn builtin_documents() -> Result<Vec<ProfileDocument>> {
    let mut documents = Vec::new();
    for (origin, text) in BUILTIN_TEMPLATES {
        documents.extend(parse_template(origin, text)?);
    }
    Ok(documents)
}

/// Parses the text of one template file.
pub fn parse_template(origin: &str, text: &str) -> Result<Vec<ProfileDocument>> {
    serde_yaml::from_str::<TemplateFile>(text)
        .map(TemplateFile::into_documents)
        .map_err(|source| ProfileError::Template {
            origin: origin.to_string(),
            source,
        })
}

/// Ordered, immutable set of compiled profiles plus the default profile.
#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: Vec<Arc<DeviceProfile>>,
    default: Arc<DeviceProfile>,
}

impl ProfileSet {
    /// Builds a set from templates, failing on the first invalid one.
    ///
    /// Exactly one template must lack an identification block: it becomes
    /// the default profile and provides the fallback values of the others.
    pub fn from_documents(documents: Vec<ProfileDocument>) -> Result<Self> {
        assemble(documents, true).map(|(set, _)| set)
    }

    /// The profiles bundled with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_documents(builtin_documents()?)
    }

    /// Specific profiles in matching order, the default one excluded.
    pub fn profiles(&self) -> &[Arc<DeviceProfile>] {
        &self.profiles
    }

    pub fn default_profile(&self) -> &Arc<DeviceProfile> {
        &self.default
    }

    /// Looks a profile up by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&Arc<DeviceProfile>> {
        self.profiles
            .iter()
            .chain(std::iter::once(&self.default))
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Number of profiles, the default one included.
    pub fn len(&self) -> usize {
        self.profiles.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles
            .iter()
            .chain(std::iter::once(&self.default))
            .map(|p| p.name.as_str())
    }
}

/// Compiles templates into a set. When `strict` is false, invalid specific
/// profiles are set aside and returned instead of failing the whole load.
fn assemble(documents: Vec<ProfileDocument>, strict: bool) -> Result<(ProfileSet, Vec<ProfileError>)> {
    let mut rejected = Vec::new();
    let mut reject = |error: ProfileError| -> Result<()> {
        if strict {
            return Err(error);
        }
        warn!(error = %error, "Rejecting DLNA profile");
        rejected.push(error);
        Ok(())
    };

    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for (position, doc) in documents.into_iter().enumerate() {
        if let Err(e) = check_name(&doc, position) {
            reject(e)?;
            continue;
        }
        if !seen.insert(doc.name.to_lowercase()) {
            reject(ProfileError::DuplicateProfile(doc.name.clone()))?;
            continue;
        }
        kept.push(doc);
    }

    let defaults: Vec<&ProfileDocument> = kept.iter().filter(|d| d.is_default()).collect();
    let default_doc = match defaults.as_slice() {
        [] => return Err(ProfileError::MissingDefault),
        [single] => (*single).clone(),
        many => {
            return Err(ProfileError::MultipleDefaults(
                many.iter().map(|d| d.name.clone()).collect(),
            ));
        }
    };
    let default = Arc::new(DeviceProfile::compile(&default_doc)?);

    let mut profiles = Vec::new();
    for doc in kept.into_iter().filter(|d| !d.is_default()) {
        match DeviceProfile::compile(&doc.with_fallback(&default_doc)) {
            Ok(profile) => profiles.push(Arc::new(profile)),
            Err(e) => reject(e)?,
        }
    }

    Ok((ProfileSet { profiles, default }, rejected))
}

/// Where the catalogue reads its templates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSource {
    /// User template directory (`*.yaml`, `*.yml`), read in file name order.
    pub directory: Option<PathBuf>,
    /// Append the bundled profiles after the user ones.
    pub builtin: bool,
}

impl Default for ProfileSource {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Result of a lenient load: the usable set and the templates set aside.
#[derive(Debug)]
pub struct LoadReport {
    pub set: ProfileSet,
    pub rejected: Vec<ProfileError>,
}

impl ProfileSource {
    pub fn builtin() -> Self {
        Self {
            directory: None,
            builtin: true,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(path.into()),
            builtin: true,
        }
    }

    pub fn with_builtin(mut self, builtin: bool) -> Self {
        self.builtin = builtin;
        self
    }

    /// Loads the templates of this source.
    ///
    /// Unreadable files and invalid specific profiles are logged and reported
    /// in [`LoadReport::rejected`]. The load only fails when the directory
    /// cannot be listed or the default profile is missing, duplicated or
    /// invalid.
    pub fn load(&self) -> Result<LoadReport> {
        let mut rejected = Vec::new();
        let mut documents = match &self.directory {
            Some(dir) => read_template_dir(dir, &mut rejected)?,
            None => Vec::new(),
        };

        if self.builtin {
            let user_names: HashSet<String> = documents.iter().map(|d| d.name.to_lowercase()).collect();
            let user_default = documents.iter().any(ProfileDocument::is_default);

            for doc in builtin_documents()? {
                if user_names.contains(&doc.name.to_lowercase()) {
                    info!(profile = %doc.name, "User template overrides bundled DLNA profile");
                    continue;
                }
                if user_default && doc.is_default() {
                    continue;
                }
                documents.push(doc);
            }
        }

        let (set, mut compile_errors) = assemble(documents, false)?;
        rejected.append(&mut compile_errors);

        info!(
            profiles = set.len(),
            rejected = rejected.len(),
            default = %set.default_profile().name,
            "📺 DLNA profiles loaded"
        );
        Ok(LoadReport { set, rejected })
    }
}

fn read_template_dir(dir: &Path, rejected: &mut Vec<ProfileError>) -> Result<Vec<ProfileDocument>> {
    if !dir.exists() {
        debug!(path = %dir.display(), "No user DLNA profile directory");
        return Ok(Vec::new());
    }

    let io_error = |source| ProfileError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        let is_template = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if is_template && path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut documents = Vec::new();
    for path in files {
        let origin = path.display().to_string();
        let parsed = fs::read_to_string(&path)
            .map_err(|source| ProfileError::Io {
                path: path.clone(),
                source,
            })
            .and_then(|text| parse_template(&origin, &text));

        match parsed {
            Ok(docs) => {
                debug!(path = %origin, profiles = docs.len(), "DLNA template read");
                documents.extend(docs);
            }
            Err(e) => {
                warn!(error = %e, "Skipping DLNA template");
                rejected.push(e);
            }
        }
    }
    Ok(documents)
}

/// Shared, reloadable profile catalogue.
///
/// The lock only guards the pointer to the current set: readers clone the
/// `Arc` and negotiate without holding it.
pub struct ProfileCatalogue {
    current: RwLock<Arc<ProfileSet>>,
}

impl ProfileCatalogue {
    pub fn new(set: ProfileSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// Set in use; it stays valid even if the catalogue is reloaded meanwhile.
    pub fn snapshot(&self) -> Arc<ProfileSet> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    /// Installs a new set and returns the previous one.
    pub fn replace(&self, set: ProfileSet) -> Arc<ProfileSet> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, Arc::new(set))
    }

    /// Reloads from `source`. On failure the current set is kept.
    pub fn reload(&self, source: &ProfileSource) -> Result<Vec<ProfileError>> {
        match source.load() {
            Ok(report) => {
                self.replace(report.set);
                Ok(report.rejected)
            }
            Err(e) => {
                warn!(error = %e, "DLNA profile reload failed, keeping current profiles");
                Err(e)
            }
        }
    }

    pub fn resolve(&self, identity: &DeviceIdentity) -> Arc<DeviceProfile> {
        Arc::clone(resolve(identity, &self.snapshot()))
    }

    pub fn negotiate(
        &self,
        identity: &DeviceIdentity,
        media: &MediaDescriptor,
        options: NegotiationOptions,
    ) -> Negotiation {
        negotiate_with(identity, media, &self.snapshot(), options)
    }
}

static CATALOGUE: Lazy<ProfileCatalogue> = Lazy::new(|| {
    let set = ProfileSet::builtin().expect("bundled DLNA profiles are valid");
    ProfileCatalogue::new(set)
});

/// Catalogue global du process, initialisé avec les profils embarqués.
pub fn catalogue() -> &'static ProfileCatalogue {
    &CATALOGUE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles() {
        let set = ProfileSet::builtin().unwrap();
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["Sony Bravia (2011)", "Denon AVR", "Default"]);
        assert!(set.default_profile().is_default());
        assert!(set.get("denon avr").is_some());
    }

    #[test]
    fn test_bundled_templates_are_valid() {
        let documents = builtin_documents().unwrap();
        assert_eq!(documents.len(), BUILTIN_TEMPLATES.len());

        let default = documents.iter().find(|d| d.is_default()).unwrap();
        for doc in &documents {
            let compiled = DeviceProfile::compile(&doc.clone().with_fallback(default));
            assert!(compiled.is_ok(), "{}: {:?}", doc.name, compiled.err());
        }

        // the global catalogue is built from the same templates
        assert_eq!(catalogue().snapshot().len(), BUILTIN_TEMPLATES.len());
    }

    #[test]
    fn test_default_profile_must_be_unique() {
        let named = |name: &str| ProfileDocument {
            name: name.to_string(),
            ..Default::default()
        };

        assert!(matches!(
            ProfileSet::from_documents(vec![named("A"), named("B")]),
            Err(ProfileError::MultipleDefaults(names)) if names == vec!["A", "B"]
        ));

        let sony = parse_template("sony", include_str!("profiles/sony_bravia_2011.yaml")).unwrap();
        assert!(matches!(
            ProfileSet::from_documents(sony),
            Err(ProfileError::MissingDefault)
        ));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut docs = builtin_documents().unwrap();
        let copy = docs[1].clone();
        docs.insert(0, copy);
        assert!(matches!(
            ProfileSet::from_documents(docs),
            Err(ProfileError::DuplicateProfile(name)) if name == "Denon AVR"
        ));
    }

    #[test]
    fn test_specific_profiles_inherit_from_default() {
        let set = ProfileSet::builtin().unwrap();
        let denon = set.get("Denon AVR").unwrap();
        let default = set.default_profile();

        assert_eq!(denon.transcoding.len(), default.transcoding.len());
        assert_eq!(denon.max_streaming_bitrate, default.max_streaming_bitrate);
        // own list kept
        assert_eq!(denon.direct_play.len(), 1);
    }

    #[test]
    fn test_reload_keeps_set_on_failure() {
        let catalogue = ProfileCatalogue::new(ProfileSet::builtin().unwrap());
        let before = catalogue.snapshot();

        let broken = ProfileSource::builtin().with_builtin(false);
        assert!(matches!(
            catalogue.reload(&broken),
            Err(ProfileError::MissingDefault)
        ));
        assert!(Arc::ptr_eq(&before, &catalogue.snapshot()));
    }
}
