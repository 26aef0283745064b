//! Extension de pmoconfig pour les profils DLNA

use std::path::PathBuf;

use anyhow::Result;

use crate::catalogue::{ProfileCatalogue, ProfileSource};
use crate::negotiate::NegotiationOptions;

const DEFAULT_PROFILES_DIR: &str = "profiles";

/// Trait d'extension pour pmoconfig::Config
pub trait DlnaConfigExt {
    /// Source des profils : `dlna.profiles.directory` (relatif au répertoire
    /// de configuration) et `dlna.profiles.builtin`
    fn dlna_profile_source(&self) -> Result<ProfileSource>;

    fn dlna_negotiation_options(&self) -> NegotiationOptions;

    /// Construit un catalogue à partir de la configuration
    fn dlna_catalogue(&self) -> Result<ProfileCatalogue> {
        let report = self.dlna_profile_source()?.load()?;
        Ok(ProfileCatalogue::new(report.set))
    }
}

impl DlnaConfigExt for pmoconfig::Config {
    fn dlna_profile_source(&self) -> Result<ProfileSource> {
        let directory =
            self.get_managed_dir(&["dlna", "profiles", "directory"], DEFAULT_PROFILES_DIR)?;

        Ok(ProfileSource {
            directory: Some(PathBuf::from(directory)),
            builtin: self.get_dlna_builtin_profiles(),
        })
    }

    fn dlna_negotiation_options(&self) -> NegotiationOptions {
        NegotiationOptions {
            direct_stream: self.get_dlna_direct_stream(),
        }
    }
}
