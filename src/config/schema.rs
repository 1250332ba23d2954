//! Configuration schema definitions.
//!
//! These are the *validated* shapes of the daemon configuration. Nothing in
//! this module parses raw input; values are only constructed by the
//! validators in `validation.rs`, `uberdogs.rs` and `roles.rs`, so holding a
//! `GlobalConfig` means every invariant has already been checked.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::config::uberdogs::UberdogRegistry;
use crate::config::validation::{validate_bind_address, AddressError, ConfigEnum};
use crate::routing::ChannelMap;

/// Root configuration for the daemon.
///
/// Built once per startup attempt and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalConfig {
    /// Message director listener settings.
    pub messagedirector: MessageDirectorConfig,

    /// Cluster-wide settings.
    pub general: GeneralConfig,

    /// Statically declared uberdogs, keyed by id.
    pub uberdogs: UberdogRegistry,

    /// Roles in declaration order.
    pub roles: Vec<RoleConfig>,

    /// Channel allocations owned by the roles above.
    pub channels: ChannelMap,
}

/// Message director configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageDirectorConfig {
    /// Address the message director listens on for participants.
    pub bind: BindAddress,
}

/// The `general` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeneralConfig {
    /// DC schema files, passed through to the DC loader untouched.
    pub dc_files: Vec<String>,

    /// Event logger endpoint.
    pub eventlogger: Option<BindAddress>,
}

/// A syntactically valid IPv4 `host:port` pair with a non-zero port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindAddress(SocketAddrV4);

impl BindAddress {
    pub(crate) fn from_parts(ip: Ipv4Addr, port: u16) -> Self {
        Self(SocketAddrV4::new(ip, port))
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.0)
    }

    /// Whether binding both addresses on one host would collide: same port,
    /// and the same IP or either one is the wildcard.
    pub fn conflicts_with(&self, other: &BindAddress) -> bool {
        self.port() == other.port()
            && (self.ip() == other.ip() || self.ip().is_unspecified() || other.ip().is_unspecified())
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BindAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_bind_address(s)
    }
}

impl Serialize for BindAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An inclusive range of bus channels owned by a role.
///
/// Only produced by `validate_channel_range` / `validate_channel`, so both
/// bounds are non-zero, outside the reserved space and ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelRange {
    min: u64,
    max: u64,
}

impl ChannelRange {
    pub(crate) fn from_validated(min: u64, max: u64) -> Self {
        debug_assert!(min <= max);
        Self { min, max }
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn contains(&self, channel: u64) -> bool {
        (self.min..=self.max).contains(&channel)
    }

    pub fn overlaps(&self, other: &ChannelRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    /// Number of channels in the range.
    pub fn channel_count(&self) -> u64 {
        self.max - self.min + 1
    }
}

impl fmt::Display for ChannelRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// A validated role, tagged by its `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RoleConfig {
    ClientAgent(ClientAgentConfig),
    StateServer(StateServerConfig),
    Database(DatabaseConfig),
}

impl RoleConfig {
    /// The `type` literal this role was declared with.
    pub fn role_type(&self) -> &'static str {
        match self {
            RoleConfig::ClientAgent(_) => "clientagent",
            RoleConfig::StateServer(_) => "stateserver",
            RoleConfig::Database(_) => "database",
        }
    }

    /// Listener address, for roles that accept connections themselves.
    pub fn bind_address(&self) -> Option<BindAddress> {
        match self {
            RoleConfig::ClientAgent(ca) => Some(ca.bind),
            RoleConfig::StateServer(_) | RoleConfig::Database(_) => None,
        }
    }

    /// Channels this role owns on the bus, with the key they were declared under.
    pub fn channel_allocations(&self) -> Vec<(&'static str, ChannelRange)> {
        match self {
            RoleConfig::ClientAgent(ca) => vec![("channels", ca.channels)],
            RoleConfig::StateServer(ss) => vec![("control", ChannelRange::from_validated(ss.control, ss.control))],
            RoleConfig::Database(db) => vec![("control", ChannelRange::from_validated(db.control, db.control))],
        }
    }
}

/// Client agent role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientAgentConfig {
    /// Address external clients connect to.
    pub bind: BindAddress,

    /// Version string clients must present in their hello.
    pub version: String,

    /// Channels handed out to client connections.
    pub channels: ChannelRange,

    /// Client behaviour; defaults when the section is absent.
    pub client: ClientPolicy,

    /// Overrides the DC hash advertised to clients.
    pub manual_dc_hash: Option<u32>,
}

/// The `client` block of a client agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientPolicy {
    #[serde(rename = "type")]
    pub client_type: ClientType,

    /// Whether clients may relocate objects they own.
    pub relocate: bool,

    pub add_interest: AddInterest,

    /// Heartbeat timeout in milliseconds; 0 disables it.
    pub heartbeat_timeout: u64,
}

/// Client wire-protocol variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    #[default]
    Default,
    LibAstron,
}

impl ConfigEnum for ClientType {
    const FIELD: &'static str = "client type";
    const VARIANTS: &'static [(&'static str, Self)] =
        &[("default", ClientType::Default), ("libastron", ClientType::LibAstron)];
}

/// Whether clients may add interest on their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddInterest {
    #[default]
    Enabled,
    Disabled,
    /// Only for zones that are visible to the client.
    Visible,
}

impl ConfigEnum for AddInterest {
    const FIELD: &'static str = "add_interest mode";
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("enabled", AddInterest::Enabled),
        ("disabled", AddInterest::Disabled),
        ("visible", AddInterest::Visible),
    ];
}

/// State server role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateServerConfig {
    /// Control channel the state server subscribes to.
    pub control: u64,
}

/// Database server role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseConfig {
    pub control: u64,

    /// Object ids this database may allocate.
    pub generate: IdRange,

    /// Broadcast object updates on the bus.
    pub broadcast: bool,

    /// Storage for the objects; a YAML folder when not configured.
    pub backend: DatabaseBackend,
}

/// Default folder of the YAML backend.
pub const DEFAULT_YAML_FOLDER: &str = "yaml_db";

/// Object storage used by a database role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// One YAML file per object in `foldername`.
    Yaml { foldername: String },
    MongoDb {
        /// Connection URI, e.g. `mongodb://127.0.0.1:27017`.
        server: String,
        database: Option<String>,
    },
}

impl Default for DatabaseBackend {
    fn default() -> Self {
        DatabaseBackend::Yaml {
            foldername: DEFAULT_YAML_FOLDER.to_string(),
        }
    }
}

/// The `type` literal of a `backend` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Yaml,
    MongoDb,
}

impl ConfigEnum for BackendType {
    const FIELD: &'static str = "database backend";
    const VARIANTS: &'static [(&'static str, Self)] = &[("yaml", BackendType::Yaml), ("mongodb", BackendType::MongoDb)];
}

/// Inclusive range of object ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdRange {
    pub min: u64,
    pub max: u64,
}

/// A statically declared uberdog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UberdogDecl {
    pub id: u64,

    /// DC class name, resolved later by the DC loader.
    pub class: String,

    pub anonymous: bool,
}
