use servernet::ServerNetworks;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub networks: ServerNetworks,
    /// Cancelled on shutdown; requests wait on child tokens.
    pub shutdown: CancellationToken,
}
