use std::fmt;
use std::str::FromStr;

use crate::{Error, InvalidIdReason};

/// External handle of a server network attachment.
///
/// Format: `<server id>-<network id>`, e.g. `123-456`. Only the first dash
/// separates the parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerNetworkId {
    pub server_id: i64,
    pub network_id: i64,
}

impl ServerNetworkId {
    pub fn new(server_id: i64, network_id: i64) -> Self {
        Self {
            server_id,
            network_id,
        }
    }
}

impl fmt::Display for ServerNetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.server_id, self.network_id)
    }
}

impl FromStr for ServerNetworkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || Error::InvalidId {
            id: s.to_string(),
            reason: InvalidIdReason::Malformed,
        };

        let (server, network) = s.split_once('-').ok_or_else(malformed)?;
        let server_id = server.parse::<i64>().map_err(|_| malformed())?;
        let network_id = network.parse::<i64>().map_err(|_| malformed())?;

        Ok(Self::new(server_id, network_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn assert_invalid(raw: &str) {
        let err = raw.parse::<ServerNetworkId>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier, "{raw:?}");
    }

    #[test]
    fn encode() {
        assert_eq!(ServerNetworkId::new(5, 100).to_string(), "5-100");
    }

    #[test]
    fn decode_round_trips() {
        for (server_id, network_id) in [(0, 0), (5, 100), (123, 456), (i64::MAX, 1)] {
            let id = ServerNetworkId::new(server_id, network_id);
            assert_eq!(id.to_string().parse::<ServerNetworkId>().unwrap(), id);
        }
    }

    #[test]
    fn decode_rejects_malformed() {
        assert_invalid("");
        assert_invalid("abc");
        assert_invalid("12");
        assert_invalid("12-");
        assert_invalid("-34");
        assert_invalid("a-34");
        assert_invalid("12-b");
    }

    #[test]
    fn decode_splits_on_first_dash_only() {
        // "34-56" is not a network id.
        assert_invalid("12-34-56");
    }
}
