use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::subnet::SubnetId;
use crate::{Error, Result};

/// A server, reduced to its private network memberships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub id: i64,
    pub private_net: Vec<Membership>,
}

impl Server {
    /// The server's attachment to `network_id`, if any.
    pub fn membership(&self, network_id: i64) -> Option<&Membership> {
        self.private_net
            .iter()
            .find(|net| net.network_id == network_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Network {
    pub id: i64,
}

/// One server's attachment to one private network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub network_id: i64,
    pub ip: Option<IpAddr>,
    pub alias_ips: Vec<IpAddr>,
    pub mac_address: Option<String>,
}

/// A cloud-side asynchronous action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: i64,
    pub status: ActionStatus,
    pub error: Option<ActionFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub code: String,
    pub message: String,
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Parameters for attaching a server to a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    pub server_id: i64,
    pub network_id: i64,
    /// Left to the cloud to assign when unset.
    pub ip: Option<IpAddr>,
    pub alias_ips: Vec<IpAddr>,
}

/// Which network to attach to, as declared by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkSelector {
    Network(i64),
    Subnet(SubnetId),
}

impl NetworkSelector {
    pub fn network_id(&self) -> i64 {
        match self {
            Self::Network(id) => *id,
            Self::Subnet(subnet) => subnet.network_id,
        }
    }
}

/// Declared configuration of a server network attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerNetworkConfig {
    pub server_id: i64,
    #[serde(default)]
    pub network_id: Option<i64>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub alias_ips: Vec<IpAddr>,
}

impl ServerNetworkConfig {
    /// Exactly one of `network_id` and `subnet_id` must be set.
    pub fn network(&self) -> Result<NetworkSelector> {
        match (self.network_id, self.subnet_id.as_deref()) {
            (Some(id), None) => Ok(NetworkSelector::Network(id)),
            (None, Some(raw)) => Ok(NetworkSelector::Subnet(raw.parse()?)),
            _ => Err(Error::NetworkSelector),
        }
    }
}

/// Observed state of an attachment, handed back to the orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerNetworkState {
    pub id: String,
    pub server_id: i64,
    pub network_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub alias_ips: Vec<IpAddr>,
    #[serde(default)]
    pub mac_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_selector_requires_exactly_one() {
        let both = ServerNetworkConfig {
            server_id: 5,
            network_id: Some(100),
            subnet_id: Some("100-10.0.1.0/24".into()),
            ..Default::default()
        };
        assert!(matches!(both.network(), Err(Error::NetworkSelector)));

        let neither = ServerNetworkConfig {
            server_id: 5,
            ..Default::default()
        };
        assert!(matches!(neither.network(), Err(Error::NetworkSelector)));
    }

    #[test]
    fn network_selector_decodes_subnet() {
        let config = ServerNetworkConfig {
            server_id: 5,
            subnet_id: Some("100-10.0.1.0/24".into()),
            ..Default::default()
        };
        assert_eq!(config.network().unwrap().network_id(), 100);

        let bad = ServerNetworkConfig {
            server_id: 5,
            subnet_id: Some("10.0.1.0/24".into()),
            ..Default::default()
        };
        assert!(matches!(bad.network(), Err(Error::InvalidSubnetId(_))));
    }

    #[test]
    fn config_from_json() {
        let config: ServerNetworkConfig = serde_json::from_str(
            r#"{"server_id": 5, "network_id": 100, "alias_ips": ["10.0.0.5"]}"#,
        )
        .unwrap();
        assert_eq!(config.network_id, Some(100));
        assert_eq!(config.ip, None);
        assert_eq!(config.alias_ips, vec!["10.0.0.5".parse::<IpAddr>().unwrap()]);
    }
}
