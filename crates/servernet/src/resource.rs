//! Create/read/update/delete of a server network record.
//!
//! Reads never fail for a record that stopped existing: they return `None`
//! and the orchestration layer forgets the record.

use std::net::IpAddr;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::merge::{merge_ordered, same_members};
use crate::types::{AttachRequest, ServerNetworkConfig, ServerNetworkState};
use crate::{Error, Result, ServerNetworks};

impl ServerNetworks {
    /// Attach as declared, then read back the observed state.
    pub async fn create(
        &self,
        config: &ServerNetworkConfig,
        cancel: &CancellationToken,
    ) -> Result<ServerNetworkState> {
        let network = config.network()?;
        let req = AttachRequest {
            server_id: config.server_id,
            network_id: network.network_id(),
            ip: config.ip,
            alias_ips: config.alias_ips.clone(),
        };

        let id = self.attach(&req, cancel).await?;

        self.observe(&id.to_string(), config.subnet_id.clone(), &config.alias_ips, cancel)
            .await?
            .ok_or(Error::NotAttached(id))
    }

    /// Refresh a known record. Alias IPs keep the order of `prior`.
    pub async fn read(
        &self,
        prior: &ServerNetworkState,
        cancel: &CancellationToken,
    ) -> Result<Option<ServerNetworkState>> {
        self.observe(&prior.id, prior.subnet_id.clone(), &prior.alias_ips, cancel)
            .await
    }

    /// Read a record by id alone, e.g. when adopting an existing attachment.
    pub async fn import(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ServerNetworkState>> {
        self.observe(id, None, &[], cancel).await
    }

    /// Converge alias IPs to `alias_ips`, then read back.
    ///
    /// No call is made when `alias_ips` holds the same addresses as `prior`.
    pub async fn update(
        &self,
        prior: &ServerNetworkState,
        alias_ips: &[IpAddr],
        cancel: &CancellationToken,
    ) -> Result<Option<ServerNetworkState>> {
        if !same_members(&prior.alias_ips, alias_ips) {
            match self.update_alias_ips(&prior.id, alias_ips, cancel).await {
                Ok(()) => {}
                Err(e) if e.drops_record() => {
                    warn!(id = %prior.id, error = %e, "server network: removing from state");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        self.observe(&prior.id, prior.subnet_id.clone(), alias_ips, cancel)
            .await
    }

    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        self.detach(id, cancel).await
    }

    async fn observe(
        &self,
        id: &str,
        subnet_id: Option<String>,
        declared_alias_ips: &[IpAddr],
        cancel: &CancellationToken,
    ) -> Result<Option<ServerNetworkState>> {
        let resolved = match self.resolve(id, cancel).await {
            Ok(resolved) => resolved,
            Err(e) if e.drops_record() => {
                warn!(id, error = %e, "server network: removing from state");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(membership) = resolved.membership else {
            warn!(id, "server network: attachment not found, removing from state");
            return Ok(None);
        };

        Ok(Some(ServerNetworkState {
            id: resolved.id.to_string(),
            server_id: resolved.server.id,
            network_id: resolved.network.id,
            subnet_id,
            ip: membership.ip,
            alias_ips: merge_ordered(declared_alias_ips, &membership.alias_ips),
            mac_address: membership.mac_address,
        }))
    }
}
