use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use hcloud::apis::configuration::Configuration;
use hcloud::apis::{actions_api, networks_api, servers_api};
use hcloud::models;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::{Action, ActionFailure, ActionStatus, AttachRequest, Membership, Network, Server};
use crate::{ApiErrorKind, CloudApi, CloudError, Error, Result};

/// Base URL the generated `hcloud` client resolves requests against.
const DEFAULT_BASE_PATH: &str = "https://api.hetzner.cloud/v1";

/// Hetzner Cloud API client using the `hcloud` crate.
pub struct HetznerCloud {
    config: Configuration,
}

impl HetznerCloud {
    pub fn new(token: impl Into<String>) -> Self {
        let mut config = Configuration::new();
        config.bearer_access_token = Some(token.into());
        Self { config }
    }

    /// Create from env vars:
    ///
    /// - `HETZNER_API_TOKEN` (required)
    /// - `HETZNER_API_ENDPOINT` (optional, overrides the API base URL)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let token = std::env::var("HETZNER_API_TOKEN")
            .map_err(|_| Error::MissingEnv("HETZNER_API_TOKEN".into()))?;

        let cloud = Self::new(token);
        Ok(match std::env::var("HETZNER_API_ENDPOINT") {
            Ok(endpoint) => cloud.with_endpoint(&endpoint),
            Err(_) => cloud,
        })
    }

    /// Send requests to `endpoint` instead of the public API.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.config.base_path_mapping.insert(
            DEFAULT_BASE_PATH.to_string(),
            endpoint.trim_end_matches('/').to_string(),
        );
        self
    }

    fn server(server: &models::Server) -> Server {
        let private_net = server
            .private_net
            .iter()
            .filter_map(|net| {
                Some(Membership {
                    network_id: net.network?,
                    ip: net.ip.as_deref().and_then(parse_ip),
                    alias_ips: net
                        .alias_ips
                        .iter()
                        .flatten()
                        .filter_map(|ip| parse_ip(ip))
                        .collect(),
                    mac_address: net.mac_address.clone(),
                })
            })
            .collect();

        Server {
            id: server.id,
            private_net,
        }
    }

    fn action(action: &models::Action) -> Action {
        let status = match action.status {
            models::action::Status::Success => ActionStatus::Success,
            models::action::Status::Error => ActionStatus::Error,
            _ => ActionStatus::Running,
        };

        Action {
            id: action.id,
            status,
            error: action.error.as_ref().map(|e| ActionFailure {
                code: e.code.clone(),
                message: e.message.clone(),
            }),
        }
    }
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    match raw.parse() {
        Ok(ip) => Some(ip),
        Err(_) => {
            warn!(ip = raw, "hetzner: ignoring unparsable ip address");
            None
        }
    }
}

fn ip_strings(ips: &[IpAddr]) -> Vec<String> {
    ips.iter().map(IpAddr::to_string).collect()
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Classify an `hcloud` error by the code in the API's JSON error body.
fn api_error<T: fmt::Debug>(err: hcloud::apis::Error<T>) -> CloudError {
    match err {
        hcloud::apis::Error::ResponseError(resp) => {
            match serde_json::from_str::<ErrorBody>(&resp.content) {
                Ok(body) => CloudError::from_code(body.error.code, body.error.message),
                Err(_) if resp.status.as_u16() == 404 => {
                    CloudError::from_code("not_found", resp.content)
                }
                Err(_) => CloudError::from_code(resp.status.as_u16().to_string(), resp.content),
            }
        }
        other => CloudError::transport(other.to_string()),
    }
}

/// Treat `not_found` from a lookup as an absent resource.
fn found<T>(result: std::result::Result<T, CloudError>) -> std::result::Result<Option<T>, CloudError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind == ApiErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl CloudApi for HetznerCloud {
    async fn get_server(&self, id: i64) -> std::result::Result<Option<Server>, CloudError> {
        let resp = found(
            servers_api::get_server(&self.config, servers_api::GetServerParams { id })
                .await
                .map_err(api_error),
        )?;

        Ok(resp.and_then(|r| r.server).map(|s| Self::server(&s)))
    }

    async fn get_network(&self, id: i64) -> std::result::Result<Option<Network>, CloudError> {
        let resp = found(
            networks_api::get_network(&self.config, networks_api::GetNetworkParams { id })
                .await
                .map_err(api_error),
        )?;

        Ok(resp
            .and_then(|r| r.network)
            .map(|n| Network { id: n.id }))
    }

    async fn attach_to_network(
        &self,
        req: &AttachRequest,
    ) -> std::result::Result<Action, CloudError> {
        let alias_ips = (!req.alias_ips.is_empty()).then(|| ip_strings(&req.alias_ips));

        let resp = servers_api::attach_server_to_network(
            &self.config,
            servers_api::AttachServerToNetworkParams {
                id: req.server_id,
                attach_server_to_network_request: models::AttachServerToNetworkRequest {
                    network: req.network_id,
                    ip: req.ip.map(|ip| ip.to_string()),
                    ip_range: None,
                    alias_ips,
                },
            },
        )
        .await
        .map_err(api_error)?;

        debug!(
            server_id = req.server_id,
            network_id = req.network_id,
            action_id = resp.action.id,
            "hetzner: attach requested"
        );
        Ok(Self::action(&resp.action))
    }

    async fn change_alias_ips(
        &self,
        server_id: i64,
        network_id: i64,
        alias_ips: &[IpAddr],
    ) -> std::result::Result<Action, CloudError> {
        let resp = servers_api::change_alias_ips_of_network(
            &self.config,
            servers_api::ChangeAliasIpsOfNetworkParams {
                id: server_id,
                change_alias_ips_of_network_request: models::ChangeAliasIpsOfNetworkRequest {
                    network: network_id,
                    alias_ips: ip_strings(alias_ips),
                },
            },
        )
        .await
        .map_err(api_error)?;

        debug!(server_id, network_id, action_id = resp.action.id, "hetzner: alias ip change requested");
        Ok(Self::action(&resp.action))
    }

    async fn detach_from_network(
        &self,
        server_id: i64,
        network_id: i64,
    ) -> std::result::Result<Action, CloudError> {
        let resp = servers_api::detach_server_from_network(
            &self.config,
            servers_api::DetachServerFromNetworkParams {
                id: server_id,
                detach_server_from_network_request: models::DetachServerFromNetworkRequest {
                    network: network_id,
                },
            },
        )
        .await
        .map_err(api_error)?;

        debug!(server_id, network_id, action_id = resp.action.id, "hetzner: detach requested");
        Ok(Self::action(&resp.action))
    }

    async fn get_action(&self, id: i64) -> std::result::Result<Action, CloudError> {
        let resp = actions_api::get_action(&self.config, actions_api::GetActionParams { id })
            .await
            .map_err(api_error)?;

        Ok(Self::action(&resp.action))
    }
}
