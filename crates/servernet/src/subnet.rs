use std::fmt;
use std::str::FromStr;

use ipnetwork::IpNetwork;

use crate::Error;

/// Subnet handle: `<network id>-<ip range>`, e.g. `123-10.0.1.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetId {
    pub network_id: i64,
    pub ip_range: IpNetwork,
}

impl fmt::Display for SubnetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.network_id, self.ip_range)
    }
}

impl FromStr for SubnetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidSubnetId(s.to_string());

        let (network, range) = s.split_once('-').ok_or_else(invalid)?;
        let network_id = network.parse::<i64>().map_err(|_| invalid())?;
        let ip_range = range.parse::<IpNetwork>().map_err(|_| invalid())?;

        Ok(Self {
            network_id,
            ip_range,
        })
    }
}
