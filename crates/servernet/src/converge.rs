use std::net::IpAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::action::wait_for_action;
use crate::resolve::{Resolved, resolve};
use crate::retry::retry;
use crate::types::{Action, AttachRequest};
use crate::{ApiErrorKind, CloudApi, Error, Operation, Result, ServerNetworkId, Settings};

/// Converges server network attachments against the cloud.
///
/// Holds no per-attachment state; operations on different ids can run
/// concurrently on clones of the same handle.
#[derive(Clone)]
pub struct ServerNetworks {
    cloud: Arc<dyn CloudApi>,
    settings: Settings,
}

impl ServerNetworks {
    pub fn new(cloud: Arc<dyn CloudApi>, settings: Settings) -> Self {
        Self { cloud, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn resolve(&self, id: &str, cancel: &CancellationToken) -> Result<Resolved> {
        resolve(&*self.cloud, id, Operation::Read, cancel).await
    }

    /// Attach a server to a network and wait for the action to finish.
    ///
    /// A server that is already attached counts as success.
    pub async fn attach(
        &self,
        req: &AttachRequest,
        cancel: &CancellationToken,
    ) -> Result<ServerNetworkId> {
        let id = ServerNetworkId::new(req.server_id, req.network_id);

        let action = match retry(&self.settings.retry, Operation::Attach, cancel, || {
            self.cloud.attach_to_network(req)
        })
        .await
        {
            Ok(action) => action,
            Err(e) if e.is_api(ApiErrorKind::ServerAlreadyAttached) => {
                info!(
                    server_id = req.server_id,
                    network_id = req.network_id,
                    "server network: server already attached"
                );
                return Ok(id);
            }
            Err(e) => return Err(e),
        };

        self.wait(action, req.network_id, Operation::Attach, cancel)
            .await?;

        info!(%id, "server network: attached");
        Ok(id)
    }

    /// Replace the alias IPs of an existing attachment.
    ///
    /// Callers diff before calling; the change is always sent. An id that no
    /// longer resolves to an attachment yields an error with
    /// [`Error::drops_record`] set.
    pub async fn update_alias_ips(
        &self,
        id: &str,
        alias_ips: &[IpAddr],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let resolved = resolve(&*self.cloud, id, Operation::ChangeAliasIps, cancel).await?;
        if resolved.membership.is_none() {
            return Err(Error::NotAttached(resolved.id));
        }

        let (server_id, network_id) = (resolved.server.id, resolved.network.id);
        let action = retry(
            &self.settings.retry,
            Operation::ChangeAliasIps,
            cancel,
            || self.cloud.change_alias_ips(server_id, network_id, alias_ips),
        )
        .await?;

        self.wait(action, network_id, Operation::ChangeAliasIps, cancel)
            .await?;

        info!(id = %resolved.id, count = alias_ips.len(), "server network: alias ips changed");
        Ok(())
    }

    /// Detach a server from a network.
    ///
    /// Anything already gone (unusable id, missing server or network, no
    /// attachment, `not_found` from the API) counts as success.
    pub async fn detach(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let resolved = match resolve(&*self.cloud, id, Operation::Detach, cancel).await {
            Ok(resolved) => resolved,
            Err(e) if e.drops_record() => {
                warn!(id, error = %e, "server network: nothing to detach");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if resolved.membership.is_none() {
            info!(id = %resolved.id, "server network: already detached");
            return Ok(());
        }

        let (server_id, network_id) = (resolved.server.id, resolved.network.id);
        let action = match retry(&self.settings.retry, Operation::Detach, cancel, || {
            self.cloud.detach_from_network(server_id, network_id)
        })
        .await
        {
            Ok(action) => action,
            Err(e) if e.is_api(ApiErrorKind::NotFound) => {
                info!(id = %resolved.id, "server network: already detached");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.wait(action, network_id, Operation::Detach, cancel)
            .await?;

        info!(id = %resolved.id, "server network: detached");
        Ok(())
    }

    async fn wait(
        &self,
        action: Action,
        network_id: i64,
        op: Operation,
        cancel: &CancellationToken,
    ) -> Result<()> {
        wait_for_action(
            &*self.cloud,
            action,
            network_id,
            op,
            &self.settings.action_wait,
            cancel,
        )
        .await
    }
}
