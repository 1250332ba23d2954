//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML)
//!     → loader.rs (read & parse into a raw value tree)
//!     → fields.rs (shape pass: unknown / missing keys per mapping)
//!     → validation.rs, roles.rs, uberdogs.rs (value checks)
//!     → routing::ChannelMap (channel allocation, overlap check)
//!     → GlobalConfig (validated, immutable)
//!     → shared via Arc with the runtime
//! ```
//!
//! # Design Decisions
//! - Closed world: every mapping declares its allowed keys, anything else is
//!   an error
//! - Every defect in the document is collected before giving up
//! - Config is immutable once loaded; there is no reload
//! - No field silently falls back to a default when its value is malformed

pub mod loader;
pub(crate) mod fields;
pub mod roles;
pub mod schema;
pub mod uberdogs;
pub mod validation;

pub use fields::KeySchema;
pub use loader::{load_config, parse_config, validate_document, ConfigError};
pub use roles::{schema_for, validate_role, RoleSchema, ROLE_SCHEMAS};
pub use schema::{BindAddress, ChannelRange, GlobalConfig, RoleConfig};
pub use uberdogs::{validate_uberdogs, UberdogRegistry};
pub use validation::{ChannelPolicy, FieldPath, ValidationError, RESERVED_CEILING};
