use std::net::IpAddr;

use serde::Deserialize;
use servernet::types::ServerNetworkState;

// ── Requests ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpdateServerNetworkRequest {
    /// The record as last stored by the caller.
    pub prior: ServerNetworkState,
    pub alias_ips: Vec<IpAddr>,
}
