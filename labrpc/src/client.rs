use tokio::sync::mpsc::Sender;

use crate::network::NetworkPackage;

/// Client stub bound to one named server on a network.
pub trait Client {
    fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self;
}
