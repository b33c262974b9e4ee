use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use log::{debug, info, trace, warn};
use rand::Rng;
use tokio::{
    sync::{
        mpsc::{self, Receiver, Sender},
        oneshot,
    },
    time,
};

use crate::{client::Client, server::Server};

/// Replies that do not arrive within this window are lost.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(500);

/// Chance that an unreliable network loses a request, and again its reply.
const DROP_RATE: f64 = 0.1;
const MAX_DELAY_MS: u64 = 27;

#[derive(Debug)]
pub struct NetworkPackage {
    pub to: String,
    pub reply: oneshot::Sender<String>,
    pub data: String,
}

#[derive(Debug, Default)]
struct Routes {
    nodes: HashMap<String, Sender<NetworkPackage>>,
    disabled: HashSet<String>,
}

#[derive(Debug)]
struct Shared {
    routes: Mutex<Routes>,
    reliable: AtomicBool,
    rpc_count: AtomicUsize,
    timeout: Duration,
}

/// Cloneable control surface of a running [`Network`].
#[derive(Debug, Clone)]
pub struct NetHandle {
    shared: Arc<Shared>,
}

impl NetHandle {
    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.shared
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// An unreliable network delays every call and loses some requests and replies.
    pub fn set_reliable(&self, reliable: bool) {
        self.shared.reliable.store(reliable, Ordering::SeqCst);
    }

    /// Connect or disconnect a server. Requests to a disconnected server are dropped.
    pub fn enable(&self, id: &str, enabled: bool) {
        let mut routes = self.routes();
        if enabled {
            routes.disabled.remove(id);
        } else {
            routes.disabled.insert(id.to_string());
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.routes().nodes.contains_key(id)
    }

    /// Number of packages the network has seen, delivered or not.
    pub fn rpc_count(&self) -> usize {
        self.shared.rpc_count.load(Ordering::SeqCst)
    }

    fn register(&self, id: String, chan: Sender<NetworkPackage>) {
        self.routes().nodes.insert(id, chan);
    }

    fn route(&self, id: &str) -> Option<Sender<NetworkPackage>> {
        let routes = self.routes();
        if routes.disabled.contains(id) {
            return None;
        }
        routes.nodes.get(id).cloned()
    }
}

pub struct Network {
    pub tx: Sender<NetworkPackage>,
    rx: Receiver<NetworkPackage>,
    handle: NetHandle,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            tx,
            rx,
            handle: NetHandle {
                shared: Arc::new(Shared {
                    routes: Mutex::new(Routes::default()),
                    reliable: AtomicBool::new(true),
                    rpc_count: AtomicUsize::new(0),
                    timeout,
                }),
            },
        }
    }

    pub fn handle(&self) -> NetHandle {
        self.handle.clone()
    }

    /// Client stub for the server registered (now or later) under `id`.
    pub fn client<C: Client>(&self, id: impl Into<String>) -> C {
        C::from_server(id.into(), self.tx.clone())
    }

    /// Returns a client for `id` and the server routine to spawn. The server
    /// is rebuilt from `f` whenever its loop fails.
    pub fn register_service<S, C, F, V>(&self, id: String, f: F) -> (C, impl Future<Output = ()>)
    where
        F: Fn() -> V + Send + 'static,
        S: Server<Service = V> + Send + 'static,
        C: Client,
    {
        let client = self.client(id.clone());
        let handle = self.handle.clone();
        (client, async move {
            loop {
                let mut server = S::from_service(f());
                handle.register(id.clone(), server.client_chan());
                match server.run().await {
                    Ok(()) => break,
                    Err(e) => info!("server {} restart: {}", id, e),
                }
            }
        })
    }

    pub async fn run(&mut self) {
        while let Some(p) = self.rx.recv().await {
            self.handle.shared.rpc_count.fetch_add(1, Ordering::SeqCst);
            match self.handle.route(&p.to) {
                Some(node) => {
                    let reliable = self.handle.shared.reliable.load(Ordering::SeqCst);
                    tokio::spawn(deliver(node, p, reliable, self.handle.shared.timeout));
                }
                None => trace!("{} unreachable, dropped", p.to),
            }
        }
    }
}

fn coin(p: f64) -> bool {
    rand::thread_rng().gen_bool(p)
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..MAX_DELAY_MS))
}

async fn deliver(node: Sender<NetworkPackage>, p: NetworkPackage, reliable: bool, timeout: Duration) {
    let NetworkPackage { to, reply, data } = p;
    if !reliable {
        time::sleep(jitter()).await;
        if coin(DROP_RATE) {
            trace!("request to {} dropped", to);
            return;
        }
    }

    let (tx, rx) = oneshot::channel();
    let pkg = NetworkPackage {
        to: to.clone(),
        reply: tx,
        data,
    };
    if node.send(pkg).await.is_err() {
        warn!("send to {} failed, dropped", to);
        return;
    }

    match time::timeout(timeout, rx).await {
        Ok(Ok(resp)) => {
            if !reliable && coin(DROP_RATE) {
                trace!("reply from {} dropped", to);
                return;
            }
            // The caller may have given up already.
            let _ = reply.send(resp);
        }
        Ok(Err(_)) => debug!("{} produced no reply", to),
        Err(_) => debug!("rpc to {} timed out", to),
    }
}
