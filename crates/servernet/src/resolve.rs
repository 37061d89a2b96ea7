use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::types::{Membership, Network, Server};
use crate::{CloudApi, CloudError, Error, InvalidIdReason, Operation, Result, ServerNetworkId};

/// The live resources behind a server network id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub id: ServerNetworkId,
    pub server: Server,
    pub network: Network,
    /// `None` when both resources exist but the server is not attached.
    pub membership: Option<Membership>,
}

/// Look up the server, network and membership behind `raw_id`.
///
/// A malformed id, or one naming a server or network that cannot be
/// fetched, yields [`Error::InvalidId`]. Lookup failures are folded into the
/// same outcome, so callers drop the record rather than fail. Cancelling
/// `cancel` abandons the lookup with [`Error::Cancelled`] tagged with `op`.
pub async fn resolve(
    cloud: &dyn CloudApi,
    raw_id: &str,
    op: Operation,
    cancel: &CancellationToken,
) -> Result<Resolved> {
    let id: ServerNetworkId = raw_id.parse()?;
    let invalid = |reason| Error::InvalidId {
        id: raw_id.to_string(),
        reason,
    };

    let server = match lookup(cloud.get_server(id.server_id), op, cancel).await? {
        Ok(Some(server)) => server,
        Ok(None) => return Err(invalid(InvalidIdReason::ServerNotFound)),
        Err(e) => return Err(invalid(InvalidIdReason::LookupFailed(e.to_string()))),
    };

    let network = match lookup(cloud.get_network(id.network_id), op, cancel).await? {
        Ok(Some(network)) => network,
        Ok(None) => return Err(invalid(InvalidIdReason::NetworkNotFound)),
        Err(e) => return Err(invalid(InvalidIdReason::LookupFailed(e.to_string()))),
    };

    let membership = server.membership(network.id).cloned();

    Ok(Resolved {
        id: ServerNetworkId::new(server.id, network.id),
        server,
        network,
        membership,
    })
}

async fn lookup<T>(
    call: impl Future<Output = std::result::Result<T, CloudError>>,
    op: Operation,
    cancel: &CancellationToken,
) -> Result<std::result::Result<T, CloudError>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled { op }),
        result = call => Ok(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{CallKind, MockCloud};
    use crate::{CloudError, ErrorKind};

    async fn resolve_now(cloud: &MockCloud, id: &str) -> Result<Resolved> {
        resolve(cloud, id, Operation::Read, &CancellationToken::new()).await
    }

    fn reason(err: Error) -> InvalidIdReason {
        match err {
            Error::InvalidId { reason, .. } => reason,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_id_makes_no_calls() {
        let cloud = MockCloud::new();
        let err = resolve_now(&cloud, "abc").await.unwrap_err();
        assert_eq!(reason(err), InvalidIdReason::Malformed);
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_server() {
        let cloud = MockCloud::new();
        cloud.add_network(100);

        let err = resolve_now(&cloud, "5-100").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        assert_eq!(reason(err), InvalidIdReason::ServerNotFound);
        assert_eq!(cloud.count(CallKind::GetNetwork), 0);
    }

    #[tokio::test]
    async fn server_lookup_error() {
        let cloud = MockCloud::new();
        cloud.add_server(5);
        cloud.add_network(100);
        cloud.fail_next(
            CallKind::GetServer,
            CloudError::from_code("service_error", "try again later"),
        );

        let err = resolve_now(&cloud, "5-100").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        assert!(matches!(reason(err), InvalidIdReason::LookupFailed(_)));
    }

    #[tokio::test]
    async fn missing_network() {
        let cloud = MockCloud::new();
        cloud.add_server(5);

        let err = resolve_now(&cloud, "5-100").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        assert_eq!(reason(err), InvalidIdReason::NetworkNotFound);
    }

    #[tokio::test]
    async fn missing_membership_is_not_an_error() {
        let cloud = MockCloud::new();
        cloud.add_server(5);
        cloud.add_network(100);

        let resolved = resolve_now(&cloud, "5-100").await.unwrap();
        assert_eq!(resolved.server.id, 5);
        assert_eq!(resolved.network.id, 100);
        assert_eq!(resolved.membership, None);
    }

    #[tokio::test]
    async fn finds_membership() {
        let cloud = MockCloud::new();
        cloud.add_server(5);
        cloud.add_network(100);
        cloud.add_network(200);
        cloud.attach_existing(5, 200, "10.1.0.2".parse().unwrap());
        cloud.attach_existing(5, 100, "10.0.0.2".parse().unwrap());

        let resolved = resolve_now(&cloud, "5-100").await.unwrap();
        let membership = resolved.membership.unwrap();
        assert_eq!(membership.network_id, 100);
        assert_eq!(membership.ip, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(resolved.id.to_string(), "5-100");
    }

    #[tokio::test]
    async fn cancelled_lookup_makes_no_calls() {
        let cloud = MockCloud::new();
        cloud.add_server(5);
        cloud.add_network(100);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = resolve(&cloud, "5-100", Operation::Detach, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Cancelled {
                op: Operation::Detach
            }
        ));
        assert!(!err.drops_record());
        assert!(cloud.calls().is_empty());
    }
}
