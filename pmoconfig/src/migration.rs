//! Migration de l'ancien schéma de `network.xml`
//!
//! Older releases stored the network settings with a different set of
//! element names (`HttpServerPortNumber`, `EnableIPV4`, a wildcard string for
//! the virtual interface names, ...). This module rewrites such a file in the
//! current schema, once, before the server starts.
//!
//! The migration never aborts startup: a missing, unreadable or unexpected
//! file is reported as [`MigrationOutcome::Skipped`] and left untouched, and a
//! file already in the current schema is not rewritten.

use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};

use quick_xml::{Reader, events::Event};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const ROOT_ELEMENT: &str = "NetworkConfiguration";

/// Elements that only exist in the legacy schema.
const LEGACY_ONLY: &[&str] = &[
    "HttpServerPortNumber",
    "HttpsPortNumber",
    "PublicPort",
    "EnableIPV4",
    "EnableIPV6",
    "UPnPCreateHttpPortMap",
    "UDPPortRange",
    "EnableSSDPTracing",
    "SSDPTracingFilter",
    "UDPSendCount",
    "UDPSendDelay",
    "GatewayMonitorPeriod",
    "EnableMultiSocketBinding",
    "TrustAllIP6Interfaces",
    "HDHomerunPortRange",
    "AutoDiscoveryTracing",
];

/// Elements that only exist in the current schema.
const CURRENT_ONLY: &[&str] = &["InternalHttpPort", "InternalHttpsPort", "PublicHttpPort"];

const DEFAULT_HTTP_PORT: u16 = 8096;
const DEFAULT_HTTPS_PORT: u16 = 8920;
const DEFAULT_VIRTUAL_INTERFACE_NAMES: &str = "vEthernet*";

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("{0} does not exist")]
    NotFound(PathBuf),

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("document has no root element")]
    Empty,

    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),

    #[error("cannot read legacy settings: {0}")]
    Deserialize(#[from] quick_xml::de::DeError),

    #[error("cannot write migrated settings: {0}")]
    Serialize(#[from] quick_xml::se::SeError),
}

/// Result of a migration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The file was rewritten in the current schema.
    Migrated,
    /// The file is already in the current schema and was left untouched.
    AlreadyMigrated,
    /// Nothing was done.
    Skipped { reason: String },
}

/// Network settings in the legacy schema, with the legacy defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct LegacyNetworkConfiguration {
    #[serde(rename = "RequireHttps")]
    require_https: bool,
    #[serde(rename = "CertificatePath")]
    certificate_path: String,
    #[serde(rename = "CertificatePassword")]
    certificate_password: String,
    #[serde(rename = "BaseUrl")]
    base_url: String,
    #[serde(rename = "PublicHttpsPort")]
    public_https_port: u16,
    #[serde(rename = "HttpServerPortNumber")]
    http_server_port_number: u16,
    #[serde(rename = "HttpsPortNumber")]
    https_port_number: u16,
    #[serde(rename = "EnableHttps")]
    enable_https: bool,
    #[serde(rename = "PublicPort")]
    public_port: u16,
    #[serde(rename = "EnableIPV6")]
    enable_ipv6: bool,
    #[serde(rename = "EnableIPV4")]
    enable_ipv4: bool,
    #[serde(rename = "IgnoreVirtualInterfaces")]
    ignore_virtual_interfaces: bool,
    #[serde(rename = "VirtualInterfaceNames")]
    virtual_interface_names: String,
    #[serde(rename = "PublishedServerUriBySubnet", with = "string_array")]
    published_server_uri_by_subnet: Vec<String>,
    #[serde(rename = "AutoDiscovery")]
    auto_discovery: bool,
    #[serde(rename = "RemoteIPFilter", with = "string_array")]
    remote_ip_filter: Vec<String>,
    #[serde(rename = "IsRemoteIPFilterBlacklist")]
    is_remote_ip_filter_blacklist: bool,
    #[serde(rename = "EnableUPnP")]
    enable_upnp: bool,
    #[serde(rename = "EnableRemoteAccess")]
    enable_remote_access: bool,
    #[serde(rename = "LocalNetworkSubnets", with = "string_array")]
    local_network_subnets: Vec<String>,
    #[serde(rename = "LocalNetworkAddresses", with = "string_array")]
    local_network_addresses: Vec<String>,
    #[serde(rename = "KnownProxies", with = "string_array")]
    known_proxies: Vec<String>,
    #[serde(rename = "EnablePublishedServerUriByRequest")]
    enable_published_server_uri_by_request: bool,
}

impl Default for LegacyNetworkConfiguration {
    fn default() -> Self {
        Self {
            require_https: false,
            certificate_path: String::new(),
            certificate_password: String::new(),
            base_url: String::new(),
            public_https_port: DEFAULT_HTTPS_PORT,
            http_server_port_number: DEFAULT_HTTP_PORT,
            https_port_number: DEFAULT_HTTPS_PORT,
            enable_https: false,
            public_port: DEFAULT_HTTP_PORT,
            enable_ipv6: false,
            enable_ipv4: true,
            ignore_virtual_interfaces: true,
            virtual_interface_names: DEFAULT_VIRTUAL_INTERFACE_NAMES.to_string(),
            published_server_uri_by_subnet: Vec::new(),
            auto_discovery: true,
            remote_ip_filter: Vec::new(),
            is_remote_ip_filter_blacklist: false,
            enable_upnp: false,
            enable_remote_access: true,
            local_network_subnets: Vec::new(),
            local_network_addresses: Vec::new(),
            known_proxies: Vec::new(),
            enable_published_server_uri_by_request: false,
        }
    }
}

/// Network settings in the current schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct NetworkConfiguration {
    pub auto_discovery: bool,
    pub base_url: String,
    pub certificate_password: String,
    pub certificate_path: String,
    pub enable_https: bool,
    #[serde(rename = "EnableIPv4")]
    pub enable_ipv4: bool,
    #[serde(rename = "EnableIPv6")]
    pub enable_ipv6: bool,
    pub enable_published_server_uri_by_request: bool,
    pub enable_remote_access: bool,
    #[serde(rename = "EnableUPnP")]
    pub enable_upnp: bool,
    pub ignore_virtual_interfaces: bool,
    pub internal_http_port: u16,
    pub internal_https_port: u16,
    #[serde(rename = "IsRemoteIPFilterBlacklist")]
    pub is_remote_ip_filter_blacklist: bool,
    #[serde(with = "string_array")]
    pub known_proxies: Vec<String>,
    #[serde(with = "string_array")]
    pub local_network_addresses: Vec<String>,
    #[serde(with = "string_array")]
    pub local_network_subnets: Vec<String>,
    pub public_http_port: u16,
    pub public_https_port: u16,
    #[serde(with = "string_array")]
    pub published_server_uri_by_subnet: Vec<String>,
    #[serde(rename = "RemoteIPFilter", with = "string_array")]
    pub remote_ip_filter: Vec<String>,
    pub require_https: bool,
    #[serde(with = "string_array")]
    pub virtual_interface_names: Vec<String>,
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        LegacyNetworkConfiguration::default().into()
    }
}

impl From<LegacyNetworkConfiguration> for NetworkConfiguration {
    fn from(old: LegacyNetworkConfiguration) -> Self {
        Self {
            auto_discovery: old.auto_discovery,
            base_url: normalize_base_url(&old.base_url),
            certificate_password: old.certificate_password,
            certificate_path: old.certificate_path,
            enable_https: old.enable_https,
            enable_ipv4: old.enable_ipv4,
            enable_ipv6: old.enable_ipv6,
            enable_published_server_uri_by_request: old.enable_published_server_uri_by_request,
            enable_remote_access: old.enable_remote_access,
            enable_upnp: old.enable_upnp,
            ignore_virtual_interfaces: old.ignore_virtual_interfaces,
            internal_http_port: old.http_server_port_number,
            internal_https_port: old.https_port_number,
            is_remote_ip_filter_blacklist: old.is_remote_ip_filter_blacklist,
            known_proxies: old.known_proxies,
            local_network_addresses: old.local_network_addresses,
            local_network_subnets: old.local_network_subnets,
            public_http_port: old.public_port,
            public_https_port: old.public_https_port,
            published_server_uri_by_subnet: old.published_server_uri_by_subnet,
            remote_ip_filter: old.remote_ip_filter,
            require_https: old.require_https,
            virtual_interface_names: migrate_virtual_interface_names(&old.virtual_interface_names),
        }
    }
}

impl NetworkConfiguration {
    /// Serializes the settings as an indented XML document.
    pub fn to_xml(&self) -> Result<String, MigrationError> {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        let mut serializer = quick_xml::se::Serializer::with_root(&mut xml, Some(ROOT_ELEMENT))?;
        serializer.indent(' ', 2);
        self.serialize(serializer)?;
        xml.push('\n');
        Ok(xml)
    }

    pub fn from_xml(xml: &str) -> Result<Self, MigrationError> {
        Ok(quick_xml::de::from_str(xml)?)
    }
}

/// `<Name><string>a</string><string>b</string></Name>`
mod string_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct Borrowed<'a> {
        #[serde(rename = "string")]
        items: &'a [String],
    }

    #[derive(Deserialize)]
    struct Owned {
        #[serde(rename = "string", default)]
        items: Vec<String>,
    }

    pub fn serialize<S: Serializer>(items: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        Borrowed { items }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Owned::deserialize(deserializer).map(|o| o.items)
    }
}

/// Normalise la base URL : vide si blanche, `/` initial ajouté, `/` final retiré.
pub fn normalize_base_url(value: &str) -> String {
    if value.trim().is_empty() {
        return String::new();
    }

    let mut url = if value.starts_with('/') {
        value.to_string()
    } else {
        format!("/{}", value)
    };
    if url.ends_with('/') {
        url.pop();
    }
    url
}

/// Converts the legacy wildcard string into a list of interface name prefixes.
///
/// `vEthernet*` (any case) becomes `["veth"]`; any other value has its `*`
/// removed and is split on commas.
pub fn migrate_virtual_interface_names(value: &str) -> Vec<String> {
    if value.eq_ignore_ascii_case(DEFAULT_VIRTUAL_INTERFACE_NAMES) {
        return vec!["veth".to_string()];
    }

    value
        .replace('*', "")
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Migrates `path` to the current schema if it holds legacy settings.
pub fn migrate_network_configuration(path: &Path) -> MigrationOutcome {
    match try_migrate(path) {
        Ok(MigrationOutcome::Migrated) => {
            info!(path=%path.display(), "✅ Legacy network configuration migrated");
            MigrationOutcome::Migrated
        }
        Ok(outcome) => {
            debug!(path=%path.display(), ?outcome, "Network configuration left untouched");
            outcome
        }
        Err(MigrationError::NotFound(_)) => {
            info!(path=%path.display(), "No network configuration to migrate");
            MigrationOutcome::Skipped {
                reason: "file not found".to_string(),
            }
        }
        Err(e) => {
            warn!(path=%path.display(), error=%e, "Skipping network configuration migration");
            MigrationOutcome::Skipped {
                reason: e.to_string(),
            }
        }
    }
}

fn try_migrate(path: &Path) -> Result<MigrationOutcome, MigrationError> {
    let xml = fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => MigrationError::NotFound(path.to_path_buf()),
        _ => MigrationError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let (root, children) = scan_elements(&xml)?;
    if root != ROOT_ELEMENT {
        return Err(MigrationError::UnexpectedRoot(root));
    }

    let is_current = children.iter().any(|c| CURRENT_ONLY.contains(&c.as_str()));
    let is_legacy = children.iter().any(|c| LEGACY_ONLY.contains(&c.as_str()));
    if is_current || !is_legacy {
        return Ok(MigrationOutcome::AlreadyMigrated);
    }

    let legacy: LegacyNetworkConfiguration = quick_xml::de::from_str(&xml)?;
    let migrated = NetworkConfiguration::from(legacy).to_xml()?;
    write_atomically(path, &migrated)?;
    Ok(MigrationOutcome::Migrated)
}

/// Returns the root element name and the names of its direct children.
fn scan_elements(xml: &str) -> Result<(String, HashSet<String>), MigrationError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root = None;
    let mut children = HashSet::new();
    let mut depth = 0usize;

    loop {
        let (name, opens) = match reader.read_event()? {
            Event::Start(e) => (String::from_utf8_lossy(e.local_name().as_ref()).into_owned(), true),
            Event::Empty(e) => (String::from_utf8_lossy(e.local_name().as_ref()).into_owned(), false),
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        match depth {
            0 if root.is_none() => root = Some(name),
            1 => {
                children.insert(name);
            }
            _ => {}
        }
        if opens {
            depth += 1;
        }
    }

    root.map(|r| (r, children)).ok_or(MigrationError::Empty)
}

fn write_atomically(path: &Path, contents: &str) -> Result<(), MigrationError> {
    let tmp = path.with_extension("xml.tmp");
    let io_error = |source| MigrationError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, contents).map_err(io_error)?;
    fs::rename(&tmp, path).map_err(io_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<NetworkConfiguration xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <RequireHttps>false</RequireHttps>
  <BaseUrl>jellyfin/</BaseUrl>
  <HttpServerPortNumber>8097</HttpServerPortNumber>
  <HttpsPortNumber>8921</HttpsPortNumber>
  <PublicPort>18096</PublicPort>
  <EnableIPV4>true</EnableIPV4>
  <EnableIPV6>true</EnableIPV6>
  <UDPPortRange />
  <VirtualInterfaceNames>vEthernet*</VirtualInterfaceNames>
  <KnownProxies>
    <string>10.0.0.1</string>
    <string>10.0.0.2</string>
  </KnownProxies>
  <LocalNetworkSubnets />
</NetworkConfiguration>
"#;

    fn write(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("network.xml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url(""), "");
        assert_eq!(normalize_base_url("   "), "");
        assert_eq!(normalize_base_url("jellyfin"), "/jellyfin");
        assert_eq!(normalize_base_url("/jellyfin/"), "/jellyfin");
        assert_eq!(normalize_base_url("/"), "");
    }

    #[test]
    fn test_virtual_interface_names() {
        assert_eq!(migrate_virtual_interface_names("vEthernet*"), vec!["veth"]);
        assert_eq!(migrate_virtual_interface_names("VETHERNET*"), vec!["veth"]);
        assert_eq!(migrate_virtual_interface_names("tap*,tun*"), vec!["tap", "tun"]);
        assert_eq!(migrate_virtual_interface_names("docker*, br-*,"), vec!["docker", "br-"]);
    }

    #[test]
    fn test_migrates_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), LEGACY);

        assert_eq!(migrate_network_configuration(&path), MigrationOutcome::Migrated);

        let migrated = fs::read_to_string(&path).unwrap();
        assert!(migrated.starts_with("<?xml"));
        assert!(migrated.contains("<InternalHttpPort>8097</InternalHttpPort>"));
        assert!(!migrated.contains("HttpServerPortNumber"));

        let config = NetworkConfiguration::from_xml(&migrated).unwrap();
        assert_eq!(config.internal_http_port, 8097);
        assert_eq!(config.internal_https_port, 8921);
        assert_eq!(config.public_http_port, 18096);
        assert_eq!(config.public_https_port, DEFAULT_HTTPS_PORT);
        assert_eq!(config.base_url, "/jellyfin");
        assert!(config.enable_ipv6);
        assert!(config.auto_discovery);
        assert!(config.enable_remote_access);
        assert_eq!(config.virtual_interface_names, vec!["veth"]);
        assert_eq!(config.known_proxies, vec!["10.0.0.1", "10.0.0.2"]);
        assert!(config.local_network_subnets.is_empty());
        assert!(!dir.path().join("network.xml.tmp").exists());
    }

    #[test]
    fn test_second_run_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), LEGACY);

        assert_eq!(migrate_network_configuration(&path), MigrationOutcome::Migrated);
        let first = fs::read(&path).unwrap();

        assert_eq!(
            migrate_network_configuration(&path),
            MigrationOutcome::AlreadyMigrated
        );
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_wildcard_list_is_split() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "<NetworkConfiguration><EnableIPV4>true</EnableIPV4>\
             <VirtualInterfaceNames>tap*,tun*</VirtualInterfaceNames></NetworkConfiguration>",
        );

        assert_eq!(migrate_network_configuration(&path), MigrationOutcome::Migrated);
        let config = NetworkConfiguration::from_xml(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.virtual_interface_names, vec!["tap", "tun"]);
        assert_eq!(config.internal_http_port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_missing_and_broken_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("network.xml");
        assert!(matches!(
            migrate_network_configuration(&missing),
            MigrationOutcome::Skipped { .. }
        ));
        assert!(!missing.exists());

        let garbage = "<NetworkConfiguration><EnableIPV4>true</Oops>";
        let path = write(dir.path(), garbage);
        assert!(matches!(
            migrate_network_configuration(&path),
            MigrationOutcome::Skipped { .. }
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), garbage);
    }

    #[test]
    fn test_other_root_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "<ServerConfiguration><EnableIPV4>true</EnableIPV4></ServerConfiguration>");

        let MigrationOutcome::Skipped { reason } = migrate_network_configuration(&path) else {
            panic!("a foreign document must not be migrated");
        };
        assert!(reason.contains("ServerConfiguration"));
    }

    #[test]
    fn test_default_settings_round_trip() {
        let xml = NetworkConfiguration::default().to_xml().unwrap();
        assert!(xml.contains("<VirtualInterfaceNames>"));
        assert_eq!(
            NetworkConfiguration::from_xml(&xml).unwrap(),
            NetworkConfiguration::default()
        );
    }
}
