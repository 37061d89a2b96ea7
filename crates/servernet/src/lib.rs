pub mod action;
pub mod config;
pub mod converge;
pub mod hetzner;
pub mod id;
pub mod merge;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod resolve;
pub mod resource;
pub mod retry;
pub mod subnet;
pub mod types;

use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;

pub use config::Settings;
pub use converge::ServerNetworks;
pub use id::ServerNetworkId;
use types::{Action, ActionFailure, AttachRequest, Network, Server};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid server network id {id:?}: {reason}")]
    InvalidId { id: String, reason: InvalidIdReason },

    #[error("server network {0} not found")]
    NotAttached(ServerNetworkId),

    #[error("either network_id or subnet_id must be set")]
    NetworkSelector,

    #[error("invalid subnet id: {0:?}")]
    InvalidSubnetId(String),

    #[error("{op}: {source}")]
    Api {
        op: Operation,
        #[source]
        source: CloudError,
    },

    #[error("{op}: action {action_id} failed: {failure}")]
    ActionFailed {
        op: Operation,
        action_id: i64,
        failure: ActionFailure,
    },

    #[error("{op}: timed out waiting for action {action_id}")]
    ActionTimeout { op: Operation, action_id: i64 },

    #[error("{op}: cancelled")]
    Cancelled { op: Operation },

    #[error("missing env var: {0}")]
    MissingEnv(String),

    #[error("invalid env var {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// How a caller should react to an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The identifier is unusable; drop the local record.
    InvalidIdentifier,
    /// The attachment no longer exists; drop the local record.
    ResourceGone,
    /// Concurrent mutations kept conflicting until the retry budget ran out.
    Conflict,
    Fatal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidId { .. } => ErrorKind::InvalidIdentifier,
            Self::NotAttached(_) => ErrorKind::ResourceGone,
            Self::Api { source, .. } if source.kind.is_retryable() => ErrorKind::Conflict,
            _ => ErrorKind::Fatal,
        }
    }

    /// Whether the caller should forget the record instead of failing.
    pub fn drops_record(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidIdentifier | ErrorKind::ResourceGone
        )
    }

    /// Whether this is a cloud API error of the given kind.
    pub fn is_api(&self, kind: ApiErrorKind) -> bool {
        matches!(self, Self::Api { source, .. } if source.kind == kind)
    }

    /// Whether the request was rejected before reaching the cloud API.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::NetworkSelector | Self::InvalidSubnetId(_))
    }
}

/// Why an identifier could not be turned into a live server and network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidIdReason {
    Malformed,
    ServerNotFound,
    NetworkNotFound,
    LookupFailed(String),
}

impl fmt::Display for InvalidIdReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => f.write_str("expected <server id>-<network id>"),
            Self::ServerNotFound => f.write_str("server not found"),
            Self::NetworkNotFound => f.write_str("network not found"),
            Self::LookupFailed(e) => write!(f, "lookup failed: {e}"),
        }
    }
}

/// The mutating call an error or log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Attach,
    ChangeAliasIps,
    Detach,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read server network",
            Self::Attach => "attach server to network",
            Self::ChangeAliasIps => "change alias ips",
            Self::Detach => "detach server from network",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error classes the convergence logic branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    Conflict,
    Locked,
    NotFound,
    ServerAlreadyAttached,
    Other,
}

impl ApiErrorKind {
    /// Map a Hetzner Cloud error code (`"conflict"`, `"locked"`, ...).
    pub fn from_code(code: &str) -> Self {
        match code {
            "conflict" => Self::Conflict,
            "locked" => Self::Locked,
            "not_found" => Self::NotFound,
            "server_already_attached" => Self::ServerAlreadyAttached,
            _ => Self::Other,
        }
    }

    /// Another operation is mutating the same network; trying again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict | Self::Locked)
    }
}

/// A failed cloud API call, classified once at the client boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct CloudError {
    pub kind: ApiErrorKind,
    pub code: String,
    pub message: String,
}

impl CloudError {
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            kind: ApiErrorKind::from_code(&code),
            code,
            message: message.into(),
        }
    }

    /// The request never produced an API response (I/O, TLS, decoding).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Other,
            code: "transport".into(),
            message: message.into(),
        }
    }
}

/// The cloud operations server network convergence needs.
///
/// Implementations hold no per-call mutable state and are shared across
/// concurrent operations. Lookups report a missing resource as `Ok(None)`.
#[async_trait]
pub trait CloudApi: Send + Sync + 'static {
    async fn get_server(&self, id: i64) -> std::result::Result<Option<Server>, CloudError>;

    async fn get_network(&self, id: i64) -> std::result::Result<Option<Network>, CloudError>;

    async fn attach_to_network(
        &self,
        req: &AttachRequest,
    ) -> std::result::Result<Action, CloudError>;

    /// Replace the alias IPs of an existing attachment.
    async fn change_alias_ips(
        &self,
        server_id: i64,
        network_id: i64,
        alias_ips: &[IpAddr],
    ) -> std::result::Result<Action, CloudError>;

    async fn detach_from_network(
        &self,
        server_id: i64,
        network_id: i64,
    ) -> std::result::Result<Action, CloudError>;

    async fn get_action(&self, id: i64) -> std::result::Result<Action, CloudError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        let invalid = Error::InvalidId {
            id: "abc".into(),
            reason: InvalidIdReason::Malformed,
        };
        assert_eq!(invalid.kind(), ErrorKind::InvalidIdentifier);
        assert!(invalid.drops_record());

        let gone = Error::NotAttached(ServerNetworkId::new(5, 100));
        assert_eq!(gone.kind(), ErrorKind::ResourceGone);
        assert!(gone.drops_record());

        let locked = Error::Api {
            op: Operation::Attach,
            source: CloudError::from_code("locked", "network is locked"),
        };
        assert_eq!(locked.kind(), ErrorKind::Conflict);
        assert!(!locked.drops_record());
        assert!(locked.is_api(ApiErrorKind::Locked));

        let other = Error::Api {
            op: Operation::Detach,
            source: CloudError::from_code("invalid_input", "bad request"),
        };
        assert_eq!(other.kind(), ErrorKind::Fatal);
        assert!(!other.is_api(ApiErrorKind::NotFound));
    }

    #[test]
    fn api_error_codes() {
        assert_eq!(ApiErrorKind::from_code("conflict"), ApiErrorKind::Conflict);
        assert_eq!(
            ApiErrorKind::from_code("server_already_attached"),
            ApiErrorKind::ServerAlreadyAttached
        );
        assert_eq!(ApiErrorKind::from_code("uniqueness_error"), ApiErrorKind::Other);
        assert!(!ApiErrorKind::NotFound.is_retryable());
    }

    #[test]
    fn error_messages_carry_operation() {
        let err = Error::Api {
            op: Operation::Attach,
            source: CloudError::from_code("forbidden", "insufficient permissions"),
        };
        assert_eq!(
            err.to_string(),
            "attach server to network: insufficient permissions (forbidden)"
        );
    }
}
