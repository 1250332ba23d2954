//! Configuration loading from disk.
//!
//! # Responsibilities
//! - Read and parse the YAML document
//! - Drive the section validators and collect every error they report
//! - Allocate role channels and reject overlapping allocations
//!
//! A missing `messagedirector` section is reported on its own: nothing else
//! is looked at until the document names a message director.

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;

use crate::config::fields::{object, type_name, Diagnostics, KeySchema, Object};
use crate::config::roles::collect_role;
use crate::config::schema::{BindAddress, GeneralConfig, GlobalConfig, MessageDirectorConfig, RoleConfig};
use crate::config::uberdogs::collect_uberdogs;
use crate::config::validation::{ChannelPolicy, FieldPath, ValidationError};
use crate::routing::{ChannelMap, RoleId};

const TOP_LEVEL_KEYS: KeySchema = KeySchema {
    required: &["messagedirector"],
    optional: &["general", "uberdogs", "roles"],
};

const MESSAGE_DIRECTOR_KEYS: KeySchema = KeySchema {
    required: &["bind"],
    optional: &[],
};

const GENERAL_KEYS: KeySchema = KeySchema {
    required: &[],
    optional: &["dc_files", "eventlogger"],
};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}", display(.path))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration")]
    Parse(#[from] serde_yaml::Error),

    #[error("configuration rejected: {}", render(.0))]
    Validation(Vec<ValidationError>),
}

impl ConfigError {
    /// Individual validation errors, empty for I/O and parse failures.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            ConfigError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

fn display(path: &Path) -> std::path::Display<'_> {
    path.display()
}

fn render(errors: &[ValidationError]) -> String {
    let listed = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} error(s): {listed}", errors.len())
}

/// Load and validate configuration from a YAML file.
pub fn load_config(path: &Path, policy: &ChannelPolicy) -> Result<GlobalConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), bytes = content.len(), "Configuration file read");
    parse_config(&content, policy)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str, policy: &ChannelPolicy) -> Result<GlobalConfig, ConfigError> {
    let document: Value = serde_yaml::from_str(content)?;
    validate_document(&document, policy).map_err(ConfigError::Validation)
}

/// Validate an already parsed document.
///
/// Pure and repeatable: the same document always yields the same result.
pub fn validate_document(document: &Value, policy: &ChannelPolicy) -> Result<GlobalConfig, Vec<ValidationError>> {
    let root = FieldPath::root();

    let Value::Mapping(map) = document else {
        return Err(vec![ValidationError::InvalidType {
            path: root,
            expected: "mapping",
            found: type_name(document),
        }]);
    };

    if map.get("messagedirector").map_or(true, Value::is_null) {
        return Err(vec![ValidationError::MissingRequiredField {
            path: root.key("messagedirector"),
        }]);
    }

    let mut diags = Diagnostics::default();
    let Some(top) = object(document, &root, TOP_LEVEL_KEYS, &mut diags) else {
        return diags.finish(None);
    };

    let messagedirector = top
        .object("messagedirector", MESSAGE_DIRECTOR_KEYS, &mut diags)
        .and_then(|md| md.address("bind", &mut diags))
        .map(|bind| MessageDirectorConfig { bind });

    let general = top.or_default("general", GeneralConfig::default(), |t| {
        let general = t.object("general", GENERAL_KEYS, &mut diags)?;
        validate_general(&general, &mut diags)
    });

    let uberdogs = top.or_default("uberdogs", Default::default(), |t| {
        let value = t.get("uberdogs")?;
        collect_uberdogs(value, &t.child_path("uberdogs"), &mut diags)
    });

    let roles = top.or_default("roles", Vec::new(), |t| {
        let entries = t.sequence("roles", &mut diags)?;
        let roles_path = t.child_path("roles");
        let mut roles = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if let Some(role) = collect_role(entry, &roles_path.index(index), policy, &mut diags) {
                roles.push((index, role));
            }
        }
        let complete = roles.len() == entries.len();
        complete.then_some(roles)
    });

    if let Some(roles) = roles.as_deref() {
        check_bind_addresses(messagedirector.map(|md| md.bind), roles, &root, &mut diags);
    }

    let channels = roles
        .as_deref()
        .map(|roles| allocate_channels(roles, &root.key("roles"), &mut diags));

    let config = match (messagedirector, general, uberdogs, roles, channels) {
        (Some(messagedirector), Some(general), Some(uberdogs), Some(roles), Some(channels)) => Some(GlobalConfig {
            messagedirector,
            general,
            uberdogs,
            roles: roles.into_iter().map(|(_, role)| role).collect(),
            channels,
        }),
        _ => None,
    };

    diags.finish(config)
}

fn validate_general(general: &Object<'_>, diags: &mut Diagnostics) -> Option<GeneralConfig> {
    let dc_files = general.or_default("dc_files", Vec::new(), |g| {
        let entries = g.sequence("dc_files", diags)?;
        let path = g.child_path("dc_files");
        let mut files = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match entry.as_str() {
                Some(file) => files.push(file.to_string()),
                None => diags.push(ValidationError::InvalidType {
                    path: path.index(index),
                    expected: "string",
                    found: type_name(entry),
                }),
            }
        }
        (files.len() == entries.len()).then_some(files)
    });

    let eventlogger = general.or_default("eventlogger", None, |g| g.address("eventlogger", diags).map(Some));

    Some(GeneralConfig {
        dc_files: dc_files?,
        eventlogger: eventlogger?,
    })
}

/// Reject listeners that would collide on the same host, message director
/// included. The later declaration is reported.
fn check_bind_addresses(
    messagedirector: Option<BindAddress>,
    roles: &[(usize, RoleConfig)],
    root: &FieldPath,
    diags: &mut Diagnostics,
) {
    let mut bound: Vec<(BindAddress, FieldPath)> = Vec::new();
    if let Some(bind) = messagedirector {
        bound.push((bind, root.key("messagedirector")));
    }

    for (index, role) in roles {
        let Some(address) = role.bind_address() else {
            continue;
        };
        let role_path = root.key("roles").index(*index);
        match bound.iter().find(|(existing, _)| existing.conflicts_with(&address)) {
            Some((_, owner)) => diags.push(ValidationError::DuplicateBindAddress {
                path: role_path.key("bind"),
                address,
                owner: owner.clone(),
            }),
            None => bound.push((address, role_path)),
        }
    }
}

/// Insert every role's channels into a fresh map, in declaration order.
///
/// Roles are `(position in the roles sequence, role)` pairs; an overlap is
/// reported on the later role.
fn allocate_channels(roles: &[(usize, RoleConfig)], roles_path: &FieldPath, diags: &mut Diagnostics) -> ChannelMap {
    let mut map = ChannelMap::new();

    for (index, role) in roles {
        let owner = RoleId(*index);
        for (key, range) in role.channel_allocations() {
            if let Err(conflict) = map.allocate(range, owner) {
                diags.push(ValidationError::OverlappingChannels {
                    path: roles_path.index(*index).key(key),
                    range,
                    existing: conflict.existing.range,
                    owner: roles_path.index(conflict.existing.owner.0),
                });
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ClientType;

    fn parse(yaml: &str) -> Result<GlobalConfig, ConfigError> {
        parse_config(yaml, &ChannelPolicy::default())
    }

    const GOOD: &str = r#"
messagedirector:
    bind: 127.0.0.1:57123

general:
    dc_files:
        - test.dc

uberdogs:
    - id: 1234
      class: UberDog1
      anonymous: true

    - id: 1235
      class: UberDog2
      anonymous: false

roles:
    - type: clientagent
      bind: 127.0.0.1:57128
      version: "Sword Art Online v5.1"
      channels:
          min: 3100
          max: 3999
      client:
          relocate: true
          add_interest: enabled

    - type: clientagent
      bind: 127.0.0.1:57135
      version: "Sword Art Online v5.1"
      client:
          type: libastron
          add_interest: disabled
      channels:
          min: 110600
          max: 110699

    - type: clientagent
      bind: 127.0.0.1:57144
      version: "Sword Art Online v5.1"
      client:
          type: libastron
          add_interest: visible
      channels:
          min: 220600
          max: 220699
"#;

    #[test]
    fn test_good_config() {
        let config = parse(GOOD).unwrap();
        assert_eq!(config.messagedirector.bind.to_string(), "127.0.0.1:57123");
        assert_eq!(config.general.dc_files, vec!["test.dc".to_string()]);
        assert_eq!(config.uberdogs.len(), 2);
        assert_eq!(config.roles.len(), 3);
        assert_eq!(config.channels.len(), 3);
        assert_eq!(config.channels.owner_of(110_650), Some(RoleId(1)));

        let RoleConfig::ClientAgent(ca) = &config.roles[2] else {
            panic!("expected a client agent");
        };
        assert_eq!(ca.client.client_type, ClientType::LibAstron);
    }

    #[test]
    fn test_indented_document() {
        // Every line shares the same leading indentation.
        let indented: String = GOOD.lines().map(|l| format!("            {l}\n")).collect();
        assert_eq!(parse(&indented).unwrap(), parse(GOOD).unwrap());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let document: Value = serde_yaml::from_str(GOOD).unwrap();
        let policy = ChannelPolicy::default();
        assert_eq!(validate_document(&document, &policy), validate_document(&document, &policy));

        let bad = GOOD.replace("min: 3100", "min: 0");
        let document: Value = serde_yaml::from_str(&bad).unwrap();
        assert_eq!(validate_document(&document, &policy), validate_document(&document, &policy));
    }

    #[test]
    fn test_minimal_config() {
        let config = parse("messagedirector:\n    bind: 127.0.0.1:57123\n").unwrap();
        assert!(config.roles.is_empty());
        assert!(config.uberdogs.is_empty());
        assert!(config.channels.is_empty());
    }

    #[test]
    fn test_missing_message_director_is_reported_alone() {
        let err = parse("roles:\n    - type: bogus\nextra: 1\n").unwrap_err();
        assert_eq!(
            err.validation_errors(),
            &[ValidationError::MissingRequiredField {
                path: FieldPath::root().key("messagedirector")
            }]
        );
    }

    #[test]
    fn test_errors_aggregate_across_sections() {
        let err = parse(
            r#"
messagedirector:
    bind: localhost:57123
uberdogs:
    - id: 1
      class: A
    - id: 1
      class: B
roles:
    - type: clientagent
      bind: 127.0.0.1:57128
      version: v1
      channels: {min: 100, max: 3999}
    - type: bogus
surprise: true
"#,
        )
        .unwrap_err();

        let paths: Vec<&str> = err.validation_errors().iter().map(|e| e.path().as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "surprise",
                "messagedirector.bind",
                "uberdogs[1].id",
                "roles[0].channels",
                "roles[1].type",
            ]
        );
    }

    #[test]
    fn test_overlapping_channels_rejected() {
        let err = parse(
            r#"
messagedirector:
    bind: 127.0.0.1:57123
roles:
    - type: clientagent
      bind: 127.0.0.1:57128
      version: v1
      channels: {min: 3100, max: 3999}
    - type: stateserver
      control: 402000
    - type: clientagent
      bind: 127.0.0.1:57129
      version: v1
      channels: {min: 3900, max: 4999}
"#,
        )
        .unwrap_err();

        let [ValidationError::OverlappingChannels { path, owner, .. }] = err.validation_errors() else {
            panic!("unexpected errors: {err}");
        };
        assert_eq!(path.as_str(), "roles[2].channels");
        assert_eq!(owner.as_str(), "roles[0]");
    }

    #[test]
    fn test_control_channel_inside_client_range_rejected() {
        let err = parse(
            r#"
messagedirector:
    bind: 127.0.0.1:57123
roles:
    - type: clientagent
      bind: 127.0.0.1:57128
      version: v1
      channels: {min: 3100, max: 3999}
    - type: database
      control: 3500
      generate: {min: 100000000, max: 399999999}
"#,
        )
        .unwrap_err();
        assert_eq!(err.validation_errors()[0].path().as_str(), "roles[1].control");
    }

    #[test]
    fn test_shared_bind_address_rejected() {
        let err = parse(
            r#"
messagedirector:
    bind: 127.0.0.1:57123
roles:
    - type: clientagent
      bind: 0.0.0.0:57128
      version: v1
      channels: {min: 3100, max: 3999}
    - type: stateserver
      control: 402000
    - type: clientagent
      bind: 127.0.0.1:57128
      version: v1
      channels: {min: 4000, max: 4999}
    - type: clientagent
      bind: 127.0.0.1:57123
      version: v1
      channels: {min: 5000, max: 5999}
"#,
        )
        .unwrap_err();

        let clashes: Vec<(&str, &str)> = err
            .validation_errors()
            .iter()
            .map(|e| match e {
                ValidationError::DuplicateBindAddress { path, owner, .. } => (path.as_str(), owner.as_str()),
                other => panic!("unexpected error {other}"),
            })
            .collect();
        assert_eq!(
            clashes,
            vec![("roles[2].bind", "roles[0]"), ("roles[3].bind", "messagedirector")]
        );
    }

    #[test]
    fn test_general_section() {
        let md = "messagedirector:\n    bind: 127.0.0.1:57123\n";

        let config = parse(&format!("{md}general:\n    eventlogger: 127.0.0.1:9090\n")).unwrap();
        assert_eq!(config.general.eventlogger.unwrap().port(), 9090);

        let err = parse(&format!("{md}general:\n    dc_files: [a.dc, 5]\n")).unwrap_err();
        assert_eq!(err.validation_errors()[0].path().as_str(), "general.dc_files[1]");
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = parse("messagedirector: [unclosed\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_empty_document_rejected() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)) || matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_reserved_ceiling_is_configurable() {
        let policy = ChannelPolicy::new(200_000);
        let err = parse_config(GOOD, &policy).unwrap_err();
        let paths: Vec<&str> = err.validation_errors().iter().map(|e| e.path().as_str()).collect();
        assert_eq!(paths, vec!["roles[0].channels", "roles[1].channels"]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/astrond.yml"), &ChannelPolicy::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
