//! Configuration validation.
//!
//! # Responsibilities
//! - Scalar validators shared by every section (addresses, channels, enums)
//! - The error taxonomy reported for rejected configurations
//! - Field paths so every diagnostic names the offending key
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validators are pure functions: nothing here touches a socket or a file
//! - Enum matching is exact and case-sensitive, a near miss is never mapped
//!   to a default

use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;
use thiserror::Error;

use crate::config::schema::{BindAddress, ChannelRange};

/// Channels below this value are reserved for the system.
pub const RESERVED_CEILING: u64 = 1000;

/// Dotted path to a configuration value, e.g. `roles[0].channels.min`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn key(&self, key: &str) -> Self {
        if self.0.is_empty() {
            Self(key.to_string())
        } else {
            Self(format!("{}.{}", self.0, key))
        }
    }

    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<document>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// A single configuration defect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{path}: unknown role type '{role_type}'")]
    UnknownRoleType { path: FieldPath, role_type: String },

    /// Key not part of the schema at this level.
    #[error("{path}: unknown field")]
    UnknownField { path: FieldPath },

    #[error("{path}: missing required field")]
    MissingRequiredField { path: FieldPath },

    #[error("{path}: expected {expected}, found {found}")]
    InvalidType {
        path: FieldPath,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{path}: {reason}")]
    InvalidValue { path: FieldPath, reason: String },

    #[error("{path}: invalid address '{value}': {source}")]
    InvalidAddress {
        path: FieldPath,
        value: String,
        source: AddressError,
    },

    #[error("{path}: invalid channel range: {source}")]
    InvalidChannelRange {
        path: FieldPath,
        source: ChannelRangeError,
    },

    #[error("{path}: invalid channel: {source}")]
    InvalidChannel { path: FieldPath, source: ChannelError },

    #[error("{path}: channels {range} overlap channels {existing} owned by {owner}")]
    OverlappingChannels {
        path: FieldPath,
        range: ChannelRange,
        existing: ChannelRange,
        owner: FieldPath,
    },

    #[error("{path}: {source}")]
    InvalidEnumValue { path: FieldPath, source: EnumError },

    #[error("{path}: duplicate uberdog id {id}")]
    DuplicateUberdogId { path: FieldPath, id: u64 },

    #[error("{path}: address {address} is already bound by {owner}")]
    DuplicateBindAddress {
        path: FieldPath,
        address: BindAddress,
        owner: FieldPath,
    },
}

impl ValidationError {
    /// Path of the offending key.
    pub fn path(&self) -> &FieldPath {
        match self {
            ValidationError::UnknownRoleType { path, .. }
            | ValidationError::UnknownField { path }
            | ValidationError::MissingRequiredField { path }
            | ValidationError::InvalidType { path, .. }
            | ValidationError::InvalidValue { path, .. }
            | ValidationError::InvalidAddress { path, .. }
            | ValidationError::InvalidChannelRange { path, .. }
            | ValidationError::InvalidChannel { path, .. }
            | ValidationError::OverlappingChannels { path, .. }
            | ValidationError::InvalidEnumValue { path, .. }
            | ValidationError::DuplicateUberdogId { path, .. }
            | ValidationError::DuplicateBindAddress { path, .. } => path,
        }
    }

    /// Stable snake_case name of the variant, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::UnknownRoleType { .. } => "unknown_role_type",
            ValidationError::UnknownField { .. } => "unknown_field",
            ValidationError::MissingRequiredField { .. } => "missing_required_field",
            ValidationError::InvalidType { .. } => "invalid_type",
            ValidationError::InvalidValue { .. } => "invalid_value",
            ValidationError::InvalidAddress { .. } => "invalid_address",
            ValidationError::InvalidChannelRange { .. } => "invalid_channel_range",
            ValidationError::InvalidChannel { .. } => "invalid_channel",
            ValidationError::OverlappingChannels { .. } => "overlapping_channels",
            ValidationError::InvalidEnumValue { .. } => "invalid_enum_value",
            ValidationError::DuplicateUberdogId { .. } => "duplicate_uberdog_id",
            ValidationError::DuplicateBindAddress { .. } => "duplicate_bind_address",
        }
    }

    /// Shape errors are about which keys exist; everything else is about values.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            ValidationError::UnknownField { .. }
                | ValidationError::MissingRequiredField { .. }
                | ValidationError::UnknownRoleType { .. }
        )
    }
}

// --- Bind addresses ---

/// Why a bind address was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("IPv6 addresses are not supported")]
    Ipv6Unsupported,
    #[error("missing ':port' suffix")]
    MissingPort,
    #[error("host '{0}' is not an IPv4 address")]
    InvalidHost(String),
    #[error("port '{0}' is not a number in 1-65535")]
    InvalidPort(String),
}

/// Parse an `ipv4:port` bind address.
///
/// Hostnames and IPv6 forms are rejected here so that nothing unsupported
/// ever reaches a socket call.
pub fn validate_bind_address(value: &str) -> Result<BindAddress, AddressError> {
    if value.is_empty() {
        return Err(AddressError::Empty);
    }
    if value.starts_with('[') || value.matches(':').count() > 1 {
        return Err(AddressError::Ipv6Unsupported);
    }

    let (host, port) = value.split_once(':').ok_or(AddressError::MissingPort)?;

    let ip: Ipv4Addr = host
        .parse()
        .map_err(|_| AddressError::InvalidHost(host.to_string()))?;

    let port = if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
        port.parse::<u16>().ok().filter(|p| *p != 0)
    } else {
        None
    };
    let port = port.ok_or_else(|| AddressError::InvalidPort(value[host.len() + 1..].to_string()))?;

    Ok(BindAddress::from_parts(ip, port))
}

// --- Channels ---

/// Reserved channel space settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPolicy {
    /// Channels in `[0, reserved_ceiling)` are never assignable to a role.
    pub reserved_ceiling: u64,
}

impl ChannelPolicy {
    pub fn new(reserved_ceiling: u64) -> Self {
        Self { reserved_ceiling }
    }

    pub fn is_reserved(&self, channel: u64) -> bool {
        channel < self.reserved_ceiling
    }
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self::new(RESERVED_CEILING)
    }
}

/// Which end of a range a violation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Min => f.write_str("min"),
            Bound::Max => f.write_str("max"),
        }
    }
}

/// One broken rule of a channel range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeViolation {
    #[error("{0} is 0, channel 0 is never assignable")]
    ZeroBound(Bound),
    #[error("{bound} {value} lies in the reserved channel space below {ceiling}")]
    Reserved { bound: Bound, value: u64, ceiling: u64 },
    #[error("min {min} is greater than max {max}")]
    Inverted { min: u64, max: u64 },
}

/// Every rule a channel range broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join(.violations))]
pub struct ChannelRangeError {
    pub violations: Vec<RangeViolation>,
}

/// Why a single channel was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel 0 is never assignable")]
    Zero,
    #[error("channel {value} lies in the reserved channel space below {ceiling}")]
    Reserved { value: u64, ceiling: u64 },
}

/// Check a role's channel range.
///
/// Both bounds are always examined so the error names every broken rule.
/// A zero bound is reported as such and not additionally as reserved.
pub fn validate_channel_range(
    min: u64,
    max: u64,
    policy: &ChannelPolicy,
) -> Result<ChannelRange, ChannelRangeError> {
    let mut violations = Vec::new();

    for (bound, value) in [(Bound::Min, min), (Bound::Max, max)] {
        if value == 0 {
            violations.push(RangeViolation::ZeroBound(bound));
        } else if policy.is_reserved(value) {
            violations.push(RangeViolation::Reserved {
                bound,
                value,
                ceiling: policy.reserved_ceiling,
            });
        }
    }

    if min > max {
        violations.push(RangeViolation::Inverted { min, max });
    }

    if violations.is_empty() {
        Ok(ChannelRange::from_validated(min, max))
    } else {
        Err(ChannelRangeError { violations })
    }
}

/// Check a single channel, such as a role's control channel.
pub fn validate_channel(value: u64, policy: &ChannelPolicy) -> Result<u64, ChannelError> {
    if value == 0 {
        Err(ChannelError::Zero)
    } else if policy.is_reserved(value) {
        Err(ChannelError::Reserved {
            value,
            ceiling: policy.reserved_ceiling,
        })
    } else {
        Ok(value)
    }
}

// --- Enumerations ---

/// A closed set of string literals accepted by a configuration field.
pub trait ConfigEnum: Sized + Copy + 'static {
    /// Human name of the field, used in diagnostics.
    const FIELD: &'static str;
    const VARIANTS: &'static [(&'static str, Self)];

    fn allowed() -> Vec<&'static str> {
        Self::VARIANTS.iter().map(|(literal, _)| *literal).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} '{value}', expected one of: {}", list(.allowed))]
pub struct EnumError {
    pub field: &'static str,
    pub value: String,
    pub allowed: Vec<&'static str>,
}

/// Exact, case-sensitive match of `value` against `T`'s literals.
pub fn validate_enum<T: ConfigEnum>(value: &str) -> Result<T, EnumError> {
    T::VARIANTS
        .iter()
        .find(|(literal, _)| *literal == value)
        .map(|(_, variant)| *variant)
        .ok_or_else(|| EnumError {
            field: T::FIELD,
            value: value.to_string(),
            allowed: T::allowed(),
        })
}

/// Boolean spellings accepted in string form.
pub fn parse_bool_literal(value: &str) -> Option<bool> {
    match value {
        "true" | "True" | "TRUE" | "yes" | "Yes" | "YES" | "on" | "On" | "ON" | "y" | "Y" => Some(true),
        "false" | "False" | "FALSE" | "no" | "No" | "NO" | "off" | "Off" | "OFF" | "n" | "N" => Some(false),
        _ => None,
    }
}

fn list(literals: &[&'static str]) -> String {
    literals.join(", ")
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{AddInterest, ClientType};

    #[test]
    fn test_bind_address_accepts_ipv4() {
        let addr = validate_bind_address("127.0.0.1:57128").unwrap();
        assert_eq!(addr.ip(), Ipv4Addr::LOCALHOST);
        assert_eq!(addr.port(), 57128);

        assert!(validate_bind_address("0.0.0.0:7199").is_ok());
    }

    #[test]
    fn test_bind_address_rejects_hostname() {
        assert_eq!(
            validate_bind_address("pizza:2314"),
            Err(AddressError::InvalidHost("pizza".into()))
        );
        assert!(validate_bind_address("localhost:2314").is_err());
    }

    #[test]
    fn test_bind_address_rejects_ipv6() {
        assert_eq!(validate_bind_address("::1:2314"), Err(AddressError::Ipv6Unsupported));
        assert_eq!(validate_bind_address("[::1]:2314"), Err(AddressError::Ipv6Unsupported));
    }

    #[test]
    fn test_bind_address_rejects_bad_ports() {
        assert_eq!(validate_bind_address("127.0.0.1"), Err(AddressError::MissingPort));
        assert_eq!(
            validate_bind_address("127.0.0.1:0"),
            Err(AddressError::InvalidPort("0".into()))
        );
        assert!(validate_bind_address("127.0.0.1:65536").is_err());
        assert!(validate_bind_address("127.0.0.1:+80").is_err());
        assert!(validate_bind_address("127.0.0.1:").is_err());
        assert_eq!(validate_bind_address(""), Err(AddressError::Empty));
    }

    #[test]
    fn test_channel_range_valid() {
        let policy = ChannelPolicy::default();
        let range = validate_channel_range(3100, 3999, &policy).unwrap();
        assert_eq!((range.min(), range.max()), (3100, 3999));

        // Single-channel range at the ceiling is allowed.
        assert!(validate_channel_range(1000, 1000, &policy).is_ok());
    }

    #[test]
    fn test_channel_range_zero_bounds() {
        let policy = ChannelPolicy::default();

        let err = validate_channel_range(0, 3999, &policy).unwrap_err();
        assert_eq!(err.violations, vec![RangeViolation::ZeroBound(Bound::Min)]);

        let err = validate_channel_range(3100, 0, &policy).unwrap_err();
        assert!(err.violations.contains(&RangeViolation::ZeroBound(Bound::Max)));
        assert!(err.violations.contains(&RangeViolation::Inverted { min: 3100, max: 0 }));
    }

    #[test]
    fn test_channel_range_reserved_bounds() {
        let policy = ChannelPolicy::default();

        let err = validate_channel_range(100, 3999, &policy).unwrap_err();
        assert_eq!(
            err.violations,
            vec![RangeViolation::Reserved { bound: Bound::Min, value: 100, ceiling: 1000 }]
        );

        let err = validate_channel_range(3100, 999, &policy).unwrap_err();
        assert!(err.violations.contains(&RangeViolation::Reserved {
            bound: Bound::Max,
            value: 999,
            ceiling: 1000
        }));
    }

    #[test]
    fn test_channel_range_reports_every_violation() {
        let err = validate_channel_range(0, 5, &ChannelPolicy::default()).unwrap_err();
        assert_eq!(err.violations.len(), 2);
        assert!(err.to_string().contains("min is 0"));
        assert!(err.to_string().contains("max 5"));
    }

    #[test]
    fn test_channel_range_custom_ceiling() {
        let policy = ChannelPolicy::new(100_000);
        assert!(validate_channel_range(3100, 3999, &policy).is_err());
        assert!(validate_channel_range(110_600, 110_699, &policy).is_ok());
    }

    #[test]
    fn test_single_channel() {
        let policy = ChannelPolicy::default();
        assert_eq!(validate_channel(402_000, &policy), Ok(402_000));
        assert_eq!(validate_channel(0, &policy), Err(ChannelError::Zero));
        assert!(matches!(validate_channel(999, &policy), Err(ChannelError::Reserved { .. })));
    }

    #[test]
    fn test_enum_exact_match_only() {
        assert_eq!(validate_enum::<ClientType>("libastron"), Ok(ClientType::LibAstron));
        assert_eq!(validate_enum::<AddInterest>("visible"), Ok(AddInterest::Visible));

        let err = validate_enum::<ClientType>("astron").unwrap_err();
        assert_eq!(err.value, "astron");
        assert_eq!(err.allowed, vec!["default", "libastron"]);

        assert!(validate_enum::<ClientType>("LibAstron").is_err());
        assert!(validate_enum::<AddInterest>("Enabled").is_err());
    }

    #[test]
    fn test_bool_literals() {
        assert_eq!(parse_bool_literal("yes"), Some(true));
        assert_eq!(parse_bool_literal("OFF"), Some(false));
        assert_eq!(parse_bool_literal("maybe"), None);
        assert_eq!(parse_bool_literal("yEs"), None);
    }

    #[test]
    fn test_field_path_rendering() {
        let path = FieldPath::root().key("roles").index(0).key("channels").key("min");
        assert_eq!(path.to_string(), "roles[0].channels.min");
        assert_eq!(FieldPath::root().to_string(), "<document>");
    }
}
