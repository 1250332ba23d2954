//! Role schemas.
//!
//! # Responsibilities
//! - Map each role `type` to its closed key schema and value validator
//! - Validate client agent, state server and database role entries
//!
//! # Design Decisions
//! - Roles are a tagged variant; adding a role type means adding a
//!   `RoleSchema` entry to `ROLE_SCHEMAS`, nothing else
//! - Shape before values: unknown/missing keys are reported by the shape
//!   pass, then the validator only reads keys the schema allows
//! - Nested blocks (`channels`, `client`, `generate`) are closed as well

use serde_yaml::Value;

use crate::config::fields::{object, type_name, Diagnostics, KeySchema, Object};
use crate::config::schema::{
    AddInterest, BackendType, ClientAgentConfig, ClientPolicy, ClientType, DatabaseBackend, DatabaseConfig, IdRange,
    RoleConfig, StateServerConfig, DEFAULT_YAML_FOLDER,
};
use crate::config::validation::{
    validate_channel, validate_channel_range, validate_enum, ChannelPolicy, FieldPath, ValidationError,
};

type RoleValidator = fn(&Object<'_>, &ChannelPolicy, &mut Diagnostics) -> Option<RoleConfig>;

/// Schema registered for one role type.
pub struct RoleSchema {
    pub role_type: &'static str,
    pub keys: KeySchema,
    validate: RoleValidator,
}

impl std::fmt::Debug for RoleSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleSchema")
            .field("role_type", &self.role_type)
            .field("keys", &self.keys)
            .finish()
    }
}

/// Every role type the daemon can host.
pub static ROLE_SCHEMAS: &[RoleSchema] = &[
    RoleSchema {
        role_type: "clientagent",
        keys: KeySchema {
            required: &["type", "bind", "version", "channels"],
            optional: &["client", "manual_dc_hash"],
        },
        validate: validate_client_agent,
    },
    RoleSchema {
        role_type: "stateserver",
        keys: KeySchema {
            required: &["type", "control"],
            optional: &[],
        },
        validate: validate_state_server,
    },
    RoleSchema {
        role_type: "database",
        keys: KeySchema {
            required: &["type", "control", "generate"],
            optional: &["broadcast", "backend"],
        },
        validate: validate_database,
    },
];

const RANGE_KEYS: KeySchema = KeySchema {
    required: &["min", "max"],
    optional: &[],
};

const YAML_BACKEND_KEYS: KeySchema = KeySchema {
    required: &[],
    optional: &["type", "foldername"],
};

const MONGODB_BACKEND_KEYS: KeySchema = KeySchema {
    required: &["type", "server"],
    optional: &["database"],
};

const CLIENT_KEYS: KeySchema = KeySchema {
    required: &[],
    optional: &["type", "relocate", "add_interest", "heartbeat_timeout"],
};

/// Look up the schema for a role `type`.
pub fn schema_for(role_type: &str) -> Option<&'static RoleSchema> {
    ROLE_SCHEMAS.iter().find(|s| s.role_type == role_type)
}

/// Validate one entry of the `roles` sequence.
pub fn validate_role(
    value: &Value,
    path: &FieldPath,
    policy: &ChannelPolicy,
) -> Result<RoleConfig, Vec<ValidationError>> {
    let mut diags = Diagnostics::default();
    let role = collect_role(value, path, policy, &mut diags);
    diags.finish(role)
}

pub(crate) fn collect_role(
    value: &Value,
    path: &FieldPath,
    policy: &ChannelPolicy,
    diags: &mut Diagnostics,
) -> Option<RoleConfig> {
    let Value::Mapping(map) = value else {
        diags.push(ValidationError::InvalidType {
            path: path.clone(),
            expected: "mapping",
            found: type_name(value),
        });
        return None;
    };

    let type_path = path.key("type");
    let role_type = match map.get("type") {
        None | Some(Value::Null) => {
            diags.push(ValidationError::MissingRequiredField { path: type_path });
            return None;
        }
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            diags.push(ValidationError::InvalidType {
                path: type_path,
                expected: "string",
                found: type_name(other),
            });
            return None;
        }
    };

    let Some(schema) = schema_for(role_type) else {
        diags.push(ValidationError::UnknownRoleType {
            path: type_path,
            role_type: role_type.to_string(),
        });
        return None;
    };

    let obj = object(value, path, schema.keys, diags)?;
    (schema.validate)(&obj, policy, diags)
}

fn validate_client_agent(obj: &Object<'_>, policy: &ChannelPolicy, diags: &mut Diagnostics) -> Option<RoleConfig> {
    let bind = obj.address("bind", diags);
    let version = obj.non_empty_string("version", diags);

    let channels = obj.object("channels", RANGE_KEYS, diags).and_then(|range| {
        let min = range.u64("min", diags);
        let max = range.u64("max", diags);
        match validate_channel_range(min?, max?, policy) {
            Ok(channels) => Some(channels),
            Err(source) => {
                diags.push(ValidationError::InvalidChannelRange {
                    path: range.path().clone(),
                    source,
                });
                None
            }
        }
    });

    let client = obj.or_default("client", ClientPolicy::default(), |o| {
        let client = o.object("client", CLIENT_KEYS, diags)?;
        client_policy(&client, diags)
    });

    let manual_dc_hash = obj.or_default("manual_dc_hash", None, |o| o.u32("manual_dc_hash", diags).map(Some));

    Some(RoleConfig::ClientAgent(ClientAgentConfig {
        bind: bind?,
        version: version?,
        channels: channels?,
        client: client?,
        manual_dc_hash: manual_dc_hash?,
    }))
}

fn client_policy(client: &Object<'_>, diags: &mut Diagnostics) -> Option<ClientPolicy> {
    let defaults = ClientPolicy::default();

    let client_type = client.or_default("type", defaults.client_type, |c| c.enumeration::<ClientType>("type", diags));
    let relocate = client.or_default("relocate", defaults.relocate, |c| c.bool("relocate", diags));
    let add_interest = client.or_default("add_interest", defaults.add_interest, |c| {
        c.enumeration::<AddInterest>("add_interest", diags)
    });
    let heartbeat_timeout = client.or_default("heartbeat_timeout", defaults.heartbeat_timeout, |c| {
        c.u64("heartbeat_timeout", diags)
    });

    Some(ClientPolicy {
        client_type: client_type?,
        relocate: relocate?,
        add_interest: add_interest?,
        heartbeat_timeout: heartbeat_timeout?,
    })
}

fn control_channel(obj: &Object<'_>, policy: &ChannelPolicy, diags: &mut Diagnostics) -> Option<u64> {
    let raw = obj.u64("control", diags)?;
    match validate_channel(raw, policy) {
        Ok(channel) => Some(channel),
        Err(source) => {
            diags.push(ValidationError::InvalidChannel {
                path: obj.child_path("control"),
                source,
            });
            None
        }
    }
}

fn validate_state_server(obj: &Object<'_>, policy: &ChannelPolicy, diags: &mut Diagnostics) -> Option<RoleConfig> {
    let control = control_channel(obj, policy, diags)?;
    Some(RoleConfig::StateServer(StateServerConfig { control }))
}

fn validate_database(obj: &Object<'_>, policy: &ChannelPolicy, diags: &mut Diagnostics) -> Option<RoleConfig> {
    let control = control_channel(obj, policy, diags);

    let generate = obj.object("generate", RANGE_KEYS, diags).and_then(|range| {
        let min = range.u64("min", diags);
        let max = range.u64("max", diags);
        let (min, max) = (min?, max?);
        if min == 0 || min > max {
            diags.push(ValidationError::InvalidValue {
                path: range.path().clone(),
                reason: format!("object id range {min}-{max} must satisfy 1 <= min <= max"),
            });
            return None;
        }
        Some(IdRange { min, max })
    });

    let broadcast = obj.or_default("broadcast", false, |o| o.bool("broadcast", diags));
    let backend = obj.or_default("backend", DatabaseBackend::default(), |o| database_backend(o, diags));

    Some(RoleConfig::Database(DatabaseConfig {
        control: control?,
        generate: generate?,
        broadcast: broadcast?,
        backend: backend?,
    }))
}

/// The `backend` block. Its allowed keys depend on its `type`, so the type is
/// resolved before the shape pass.
fn database_backend(obj: &Object<'_>, diags: &mut Diagnostics) -> Option<DatabaseBackend> {
    let value = obj.get("backend")?;
    let path = obj.child_path("backend");

    let Value::Mapping(map) = value else {
        diags.push(ValidationError::InvalidType {
            path,
            expected: "mapping",
            found: type_name(value),
        });
        return None;
    };

    let backend_type = match map.get("type") {
        None | Some(Value::Null) => BackendType::Yaml,
        Some(Value::String(raw)) => match validate_enum::<BackendType>(raw) {
            Ok(backend_type) => backend_type,
            Err(source) => {
                diags.push(ValidationError::InvalidEnumValue {
                    path: path.key("type"),
                    source,
                });
                return None;
            }
        },
        Some(other) => {
            diags.push(ValidationError::InvalidType {
                path: path.key("type"),
                expected: "string",
                found: type_name(other),
            });
            return None;
        }
    };

    match backend_type {
        BackendType::Yaml => {
            let backend = object(value, &path, YAML_BACKEND_KEYS, diags)?;
            let foldername = backend.or_default("foldername", DEFAULT_YAML_FOLDER.to_string(), |b| {
                b.non_empty_string("foldername", diags)
            });
            Some(DatabaseBackend::Yaml { foldername: foldername? })
        }
        BackendType::MongoDb => {
            let backend = object(value, &path, MONGODB_BACKEND_KEYS, diags)?;
            let server = backend.non_empty_string("server", diags);
            let database = backend.or_default("database", None, |b| b.non_empty_string("database", diags).map(Some));
            Some(DatabaseBackend::MongoDb {
                server: server?,
                database: database?,
            })
        }
    }
}
