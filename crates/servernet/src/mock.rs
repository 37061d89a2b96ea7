//! In-memory cloud for tests.
//!
//! Keeps servers, networks and memberships in a map, records every call,
//! and lets tests script failures and action outcomes.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::types::{Action, ActionFailure, ActionStatus, AttachRequest, Membership, Network, Server};
use crate::{CloudApi, CloudError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    GetServer,
    GetNetwork,
    Attach,
    ChangeAliasIps,
    Detach,
    GetAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetServer(i64),
    GetNetwork(i64),
    Attach(AttachRequest),
    ChangeAliasIps {
        server_id: i64,
        network_id: i64,
        alias_ips: Vec<IpAddr>,
    },
    Detach {
        server_id: i64,
        network_id: i64,
    },
    GetAction(i64),
}

impl Call {
    pub fn kind(&self) -> CallKind {
        match self {
            Self::GetServer(_) => CallKind::GetServer,
            Self::GetNetwork(_) => CallKind::GetNetwork,
            Self::Attach(_) => CallKind::Attach,
            Self::ChangeAliasIps { .. } => CallKind::ChangeAliasIps,
            Self::Detach { .. } => CallKind::Detach,
            Self::GetAction(_) => CallKind::GetAction,
        }
    }
}

struct MockAction {
    remaining_running: u32,
    outcome: Action,
}

#[derive(Default)]
struct MockState {
    servers: BTreeMap<i64, Vec<Membership>>,
    networks: BTreeSet<i64>,
    actions: HashMap<i64, MockAction>,
    next_action_id: i64,
    running_polls: u32,
    fail_actions: bool,
    failures: HashMap<CallKind, VecDeque<CloudError>>,
    calls: Vec<Call>,
}

impl MockState {
    fn record(&mut self, call: Call) -> Result<(), CloudError> {
        let kind = call.kind();
        self.calls.push(call);
        match self.failures.get_mut(&kind).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Start an action. The returned handle counts as the first `running`
    /// observation.
    fn start_action(&mut self, success: bool) -> Action {
        let outcome = self.new_action(success);
        match self.actions.get_mut(&outcome.id) {
            Some(action) if action.remaining_running > 0 => {
                action.remaining_running -= 1;
                Action {
                    id: outcome.id,
                    status: ActionStatus::Running,
                    error: None,
                }
            }
            _ => outcome,
        }
    }

    fn new_action(&mut self, success: bool) -> Action {
        self.next_action_id += 1;
        let outcome = Action {
            id: self.next_action_id,
            status: if success {
                ActionStatus::Success
            } else {
                ActionStatus::Error
            },
            error: (!success).then(|| ActionFailure {
                code: "action_failed".into(),
                message: "action failed".into(),
            }),
        };
        self.actions.insert(
            outcome.id,
            MockAction {
                remaining_running: self.running_polls,
                outcome: outcome.clone(),
            },
        );
        outcome
    }

    fn membership_mut(&mut self, server_id: i64, network_id: i64) -> Option<&mut Membership> {
        self.servers
            .get_mut(&server_id)?
            .iter_mut()
            .find(|m| m.network_id == network_id)
    }

    fn not_found(what: &str) -> CloudError {
        CloudError::from_code("not_found", format!("{what} not found"))
    }
}

/// Test double for [`CloudApi`].
#[derive(Default)]
pub struct MockCloud {
    state: Mutex<MockState>,
}

impl MockCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_server(&self, id: i64) {
        self.state().servers.entry(id).or_default();
    }

    pub fn remove_server(&self, id: i64) {
        self.state().servers.remove(&id);
    }

    pub fn add_network(&self, id: i64) {
        self.state().networks.insert(id);
    }

    pub fn remove_network(&self, id: i64) {
        self.state().networks.remove(&id);
    }

    /// Attach out of band, without recording a call.
    pub fn attach_existing(&self, server_id: i64, network_id: i64, ip: IpAddr) {
        let mut state = self.state();
        if let Some(nets) = state.servers.get_mut(&server_id) {
            nets.retain(|m| m.network_id != network_id);
            nets.push(Membership {
                network_id,
                ip: Some(ip),
                alias_ips: Vec::new(),
                mac_address: Some(mac_address(server_id, network_id)),
            });
        }
    }

    /// Detach out of band, without recording a call.
    pub fn detach_existing(&self, server_id: i64, network_id: i64) {
        if let Some(nets) = self.state().servers.get_mut(&server_id) {
            nets.retain(|m| m.network_id != network_id);
        }
    }

    /// Add an alias IP out of band, after any existing ones.
    pub fn add_alias_ip(&self, server_id: i64, network_id: i64, ip: IpAddr) {
        if let Some(membership) = self.state().membership_mut(server_id, network_id) {
            membership.alias_ips.push(ip);
        }
    }

    pub fn membership(&self, server_id: i64, network_id: i64) -> Option<Membership> {
        self.state()
            .membership_mut(server_id, network_id)
            .cloned()
    }

    /// Fail the next call of `kind` with `err`. Queued errors are used in order.
    pub fn fail_next(&self, kind: CallKind, err: CloudError) {
        self.state().failures.entry(kind).or_default().push_back(err);
    }

    /// Make new actions end in an error and skip their effect.
    pub fn fail_actions(&self, fail: bool) {
        self.state().fail_actions = fail;
    }

    /// How many times new actions report `running` before finishing.
    pub fn set_running_polls(&self, polls: u32) {
        self.state().running_polls = polls;
    }

    /// Register an action with no effect and return its final form.
    pub fn record_action(&self, success: bool) -> Action {
        self.state().new_action(success)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.kind() == kind)
            .count()
    }
}

fn mac_address(server_id: i64, network_id: i64) -> String {
    format!(
        "86:00:00:{:02x}:{:02x}:01",
        server_id & 0xff,
        network_id & 0xff
    )
}

#[async_trait]
impl CloudApi for MockCloud {
    async fn get_server(&self, id: i64) -> Result<Option<Server>, CloudError> {
        let mut state = self.state();
        state.record(Call::GetServer(id))?;
        Ok(state.servers.get(&id).map(|nets| Server {
            id,
            private_net: nets.clone(),
        }))
    }

    async fn get_network(&self, id: i64) -> Result<Option<Network>, CloudError> {
        let mut state = self.state();
        state.record(Call::GetNetwork(id))?;
        Ok(state.networks.contains(&id).then_some(Network { id }))
    }

    async fn attach_to_network(&self, req: &AttachRequest) -> Result<Action, CloudError> {
        let mut state = self.state();
        state.record(Call::Attach(req.clone()))?;

        if !state.networks.contains(&req.network_id) {
            return Err(MockState::not_found("network"));
        }
        let fail = state.fail_actions;
        let nets = state
            .servers
            .get_mut(&req.server_id)
            .ok_or_else(|| MockState::not_found("server"))?;
        if nets.iter().any(|m| m.network_id == req.network_id) {
            return Err(CloudError::from_code(
                "server_already_attached",
                "server is already attached to this network",
            ));
        }

        if !fail {
            let host = u8::try_from(nets.len() + 2).unwrap_or(u8::MAX);
            nets.push(Membership {
                network_id: req.network_id,
                ip: Some(
                    req.ip
                        .unwrap_or(IpAddr::V4(Ipv4Addr::new(10, 0, 0, host))),
                ),
                alias_ips: req.alias_ips.clone(),
                mac_address: Some(mac_address(req.server_id, req.network_id)),
            });
        }
        Ok(state.start_action(!fail))
    }

    async fn change_alias_ips(
        &self,
        server_id: i64,
        network_id: i64,
        alias_ips: &[IpAddr],
    ) -> Result<Action, CloudError> {
        let mut state = self.state();
        state.record(Call::ChangeAliasIps {
            server_id,
            network_id,
            alias_ips: alias_ips.to_vec(),
        })?;

        let fail = state.fail_actions;
        let membership = state
            .membership_mut(server_id, network_id)
            .ok_or_else(|| MockState::not_found("server network"))?;
        if !fail {
            membership.alias_ips = alias_ips.to_vec();
        }
        Ok(state.start_action(!fail))
    }

    async fn detach_from_network(
        &self,
        server_id: i64,
        network_id: i64,
    ) -> Result<Action, CloudError> {
        let mut state = self.state();
        state.record(Call::Detach {
            server_id,
            network_id,
        })?;

        if state.membership_mut(server_id, network_id).is_none() {
            return Err(MockState::not_found("server network"));
        }
        let fail = state.fail_actions;
        if !fail && let Some(nets) = state.servers.get_mut(&server_id) {
            nets.retain(|m| m.network_id != network_id);
        }
        Ok(state.start_action(!fail))
    }

    async fn get_action(&self, id: i64) -> Result<Action, CloudError> {
        let mut state = self.state();
        state.record(Call::GetAction(id))?;

        let action = state
            .actions
            .get_mut(&id)
            .ok_or_else(|| MockState::not_found("action"))?;
        if action.remaining_running > 0 {
            action.remaining_running -= 1;
            return Ok(Action {
                id,
                status: ActionStatus::Running,
                error: None,
            });
        }
        Ok(action.outcome.clone())
    }
}
