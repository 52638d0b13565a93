// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error taxonomy for inventory and allocation operations
//!
//! Three layers:
//!
//! - [`FieldError`]: one machine-readable problem with one request field
//!   (`MissingParameter`, `InvalidParameter`, `UnknownParameters`,
//!   `Duplicate`, `UsedBy`). Never returned alone, always aggregated.
//! - [`IpamError`]: the closed set of outcomes a public operation can fail
//!   with. Each kind maps to a status code through [`status_for`].
//! - [`StoreError`]: failures of the backing store, surfaced to callers only
//!   wrapped in [`IpamError::Internal`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the backing store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The store was configured incorrectly
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<async_nats::Error> for StoreError {
    fn from(err: async_nats::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Code of a single field-level error object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldErrorCode {
    MissingParameter,
    InvalidParameter,
    UnknownParameters,
    Duplicate,
    UsedBy,
}

/// One field-level error object, as listed in an error response's `errors`
///
/// Kind-specific attributes (the UUID of a conflicting network, the type and
/// id of a resource holding something) live in `extra` and are flattened
/// into the object on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub code: FieldErrorCode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    pub message: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FieldError {
    fn new(code: FieldErrorCode, field: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            field,
            message: message.into(),
            extra: BTreeMap::new(),
        }
    }

    /// A required parameter was not supplied
    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(
            FieldErrorCode::MissingParameter,
            Some(field.into()),
            "Missing parameter",
        )
    }

    /// A parameter was supplied but is not acceptable
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FieldErrorCode::InvalidParameter, Some(field.into()), message)
    }

    /// Every parameter name in `names` is unrecognized
    pub fn unknown<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        let message = format!("Unknown parameters: {}", names.join(", "));
        Self::new(FieldErrorCode::UnknownParameters, None, message).with(
            "field",
            Value::Array(names.into_iter().map(Value::String).collect()),
        )
    }

    /// A resource with this unique value already exists
    pub fn duplicate(field: impl Into<String>) -> Self {
        Self::new(FieldErrorCode::Duplicate, Some(field.into()), "Already exists")
    }

    /// The resource is referenced by another resource
    pub fn used_by(kind: impl fmt::Display, id: impl fmt::Display) -> Self {
        let kind = kind.to_string();
        let id = id.to_string();
        Self::new(
            FieldErrorCode::UsedBy,
            None,
            format!("In use by {} \"{}\"", kind, id),
        )
        .with("type", kind)
        .with("id", id)
    }

    /// Attach a kind-specific attribute
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Key used to order error lists: field name first, then the id of the
    /// resource the error refers to
    pub fn sort_key(&self) -> (String, String) {
        let field = match (&self.field, self.extra.get("field")) {
            (Some(field), _) => field.clone(),
            (None, Some(Value::Array(names))) => names
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(","),
            _ => String::new(),
        };
        let id = ["id", "network_uuid", "uuid"]
            .iter()
            .find_map(|key| self.extra.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();
        (field, id)
    }
}

/// Sort field errors so responses are stable across runs
pub fn sort_field_errors(errors: &mut [FieldError]) {
    errors.sort_by_key(FieldError::sort_key);
}

/// Kinds of resources this service manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    NicTag,
    NetworkPool,
    Ip,
    Nic,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Network => "network",
            ResourceKind::NicTag => "nic_tag",
            ResourceKind::NetworkPool => "network_pool",
            ResourceKind::Ip => "ip",
            ResourceKind::Nic => "nic",
        };
        f.write_str(name)
    }
}

/// Top-level error code, one per [`IpamError`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidParameters,
    InUse,
    ResourceNotFound,
    SubnetFull,
    SubnetsExhausted,
    PoolFull,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParameters => "InvalidParameters",
            ErrorCode::InUse => "InUse",
            ErrorCode::ResourceNotFound => "ResourceNotFound",
            ErrorCode::SubnetFull => "SubnetFull",
            ErrorCode::SubnetsExhausted => "SubnetsExhausted",
            ErrorCode::PoolFull => "PoolFull",
            ErrorCode::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status code for an error kind
pub fn status_for(code: ErrorCode) -> u16 {
    match code {
        ErrorCode::InvalidParameters | ErrorCode::InUse | ErrorCode::PoolFull => 422,
        ErrorCode::ResourceNotFound => 404,
        ErrorCode::SubnetFull | ErrorCode::SubnetsExhausted => 507,
        ErrorCode::InternalError => 500,
    }
}

/// Outcome of a failed inventory or allocation operation
#[derive(Debug, Error)]
pub enum IpamError {
    /// One or more request fields were missing, malformed, unknown or
    /// conflicting. `errors` is sorted.
    #[error("Invalid parameters")]
    InvalidParameters { errors: Vec<FieldError> },

    /// The resource cannot be removed or changed while others reference it
    #[error("{message}")]
    InUse {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("{resource} not found")]
    ResourceNotFound { resource: ResourceKind, id: String },

    /// The network's provisioning range has no free address
    #[error("No more free IPs available")]
    SubnetFull { network_uuid: Uuid },

    /// Every network available to the caller is full
    #[error("No free IPs available on any network")]
    SubnetsExhausted,

    /// Every member network of the pool was tried and found full. Terminal:
    /// retrying the same pool cannot succeed.
    #[error("All networks in pool are full")]
    PoolFull {
        pool_uuid: Uuid,
        networks_tried: Vec<Uuid>,
    },

    /// An unexpected lower-layer failure
    #[error("Internal error")]
    Internal(#[from] StoreError),
}

/// Result type for inventory and allocation operations
pub type IpamResult<T> = Result<T, IpamError>;

impl IpamError {
    /// Aggregate field errors into one `InvalidParameters` failure
    pub fn invalid_params(mut errors: Vec<FieldError>) -> Self {
        sort_field_errors(&mut errors);
        IpamError::InvalidParameters { errors }
    }

    /// `InvalidParameters` holding a single `InvalidParameter`
    pub fn invalid_param(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::invalid_params(vec![FieldError::invalid(field, message)])
    }

    /// `Ok(())` when `errors` is empty, `InvalidParameters` otherwise
    pub fn check(errors: Vec<FieldError>) -> IpamResult<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self::invalid_params(errors))
        }
    }

    pub fn in_use(message: impl Into<String>, mut errors: Vec<FieldError>) -> Self {
        sort_field_errors(&mut errors);
        IpamError::InUse {
            message: message.into(),
            errors,
        }
    }

    pub fn not_found(resource: ResourceKind, id: impl fmt::Display) -> Self {
        IpamError::ResourceNotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            IpamError::InvalidParameters { .. } => ErrorCode::InvalidParameters,
            IpamError::InUse { .. } => ErrorCode::InUse,
            IpamError::ResourceNotFound { .. } => ErrorCode::ResourceNotFound,
            IpamError::SubnetFull { .. } => ErrorCode::SubnetFull,
            IpamError::SubnetsExhausted => ErrorCode::SubnetsExhausted,
            IpamError::PoolFull { .. } => ErrorCode::PoolFull,
            IpamError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn status_code(&self) -> u16 {
        status_for(self.code())
    }

    /// True for the capacity outcomes callers are expected to handle
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            IpamError::SubnetFull { .. } | IpamError::SubnetsExhausted | IpamError::PoolFull { .. }
        )
    }

    /// Field errors carried by this error, if any
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            IpamError::InvalidParameters { errors } | IpamError::InUse { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Render the wire representation of this error
    pub fn to_body(&self) -> ErrorBody {
        let mut extra = BTreeMap::new();
        match self {
            IpamError::SubnetFull { network_uuid } => {
                extra.insert("network_uuid".to_string(), Value::from(network_uuid.to_string()));
            }
            IpamError::PoolFull { pool_uuid, .. } => {
                extra.insert("pool_uuid".to_string(), Value::from(pool_uuid.to_string()));
                extra.insert("stop".to_string(), Value::Bool(true));
            }
            _ => {}
        }

        ErrorBody {
            code: self.code().as_str().to_string(),
            message: self.to_string(),
            errors: self.field_errors().to_vec(),
            extra,
        }
    }
}

/// Wire representation of an error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub errors: Vec<FieldError>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_unknown_params_message_lists_sorted_names() {
        let err = FieldError::unknown(["zeta", "alpha"]);
        assert_eq!(err.message, "Unknown parameters: alpha, zeta");
        assert_eq!(err.code, FieldErrorCode::UnknownParameters);
        assert_eq!(err.extra["field"], serde_json::json!(["alpha", "zeta"]));
    }

    #[test]
    fn test_used_by_carries_type_and_id() {
        let err = FieldError::used_by(ResourceKind::Network, "abc");
        assert_eq!(err.message, "In use by network \"abc\"");
        assert_eq!(err.extra["type"], "network");
        assert_eq!(err.extra["id"], "abc");
        assert!(err.field.is_none());
    }

    #[test]
    fn test_invalid_params_are_sorted() {
        let err = IpamError::invalid_params(vec![
            FieldError::invalid("subnet", "overlap").with("network_uuid", "b"),
            FieldError::missing("name"),
            FieldError::invalid("subnet", "overlap").with("network_uuid", "a"),
        ]);

        let keys: Vec<_> = err.field_errors().iter().map(FieldError::sort_key).collect();
        assert_eq!(
            keys,
            vec![
                ("name".to_string(), String::new()),
                ("subnet".to_string(), "a".to_string()),
                ("subnet".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status_for(ErrorCode::InvalidParameters), 422);
        assert_eq!(status_for(ErrorCode::InUse), 422);
        assert_eq!(status_for(ErrorCode::PoolFull), 422);
        assert_eq!(status_for(ErrorCode::SubnetFull), 507);
        assert_eq!(status_for(ErrorCode::SubnetsExhausted), 507);
        assert_eq!(status_for(ErrorCode::InternalError), 500);
        assert_eq!(status_for(ErrorCode::ResourceNotFound), 404);
    }

    #[test]
    fn test_pool_full_body_signals_stop() {
        let pool_uuid = Uuid::nil();
        let body = IpamError::PoolFull {
            pool_uuid,
            networks_tried: vec![],
        }
        .to_body();

        assert_eq!(body.code, "PoolFull");
        assert_eq!(body.extra["stop"], Value::Bool(true));
        assert_eq!(body.extra["pool_uuid"], Value::from(pool_uuid.to_string()));
    }

    #[test]
    fn test_internal_error_hides_cause_but_keeps_source() {
        let err = IpamError::from(StoreError::Unavailable("connection reset".into()));
        assert_eq!(err.to_string(), "Internal error");
        assert_eq!(err.to_body().message, "Internal error");
        let source = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("connection reset"));
    }

    #[test]
    fn test_field_error_wire_shape() {
        let err = FieldError::invalid("mtu", "too large").with("network_uuid", "n1");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "code": "InvalidParameter",
                "field": "mtu",
                "message": "too large",
                "network_uuid": "n1",
            })
        );
    }
}
