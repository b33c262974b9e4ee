/// Declare an RPC service.
///
/// Generates a module holding the `Service` trait to implement, a `Client`
/// stub with one async method per RPC, and a `Server` that runs every
/// incoming request on its own task. A handler error sends no reply.
#[macro_export]
macro_rules! service {
    () => {
        compile_error!("empty service is not allowed");
    };
    (
        $(#[$service_attr:meta])*
        service $svc_name:ident {
            $(
                $(#[$method_attr:meta])*
                fn $method_name:ident($($arg_id:ident: $arg_ty:ty),*) -> $output:ty;
            )*
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$service_attr])*
        pub mod $svc_name {
            use super::*;

            use std::sync::Arc;

            use $crate::network::NetworkPackage;
            use $crate::{server, client};

            use $crate::tokio::sync::{mpsc::{self, Sender, Receiver}, oneshot};
            use $crate::serde_json;
            use $crate::serde::{Serialize, Deserialize};
            use $crate::anyhow::{Result, anyhow};
            use $crate::async_trait;
            use $crate::log::{debug, trace};


            #[derive(Debug, Deserialize, Serialize)]
            pub enum Request {
                $(
                    #[allow(non_camel_case_types)]
                    $method_name {  $($arg_id : $arg_ty),* }
                ),*
            }

            mod response {
                use super::*;
                $(
                    #[derive(Deserialize, Serialize)]
                    #[allow(non_camel_case_types)]
                    pub struct $method_name {
                        pub data: $output
                    }
                )*
            }

            #[async_trait]
            pub trait Service: Send + Sync + 'static {
                $(
                    $(#[$method_attr])*
                    async fn $method_name(&self, $($arg_id : $arg_ty),* ) -> Result<$output>;
                )*
            }

            #[derive(Debug, Clone)]
            pub struct Client {
                server_id: String,
                tx: Sender<NetworkPackage>,
            }

            impl Client {
                pub fn server_id(&self) -> &str {
                    &self.server_id
                }

                $(
                    pub async fn $method_name(&self, $($arg_id : $arg_ty),* ) -> Result<$output> {
                        let req = Request::$method_name {
                            $($arg_id),*
                        };
                        let resp = self.call(serde_json::to_string(&req)?).await?;
                        let resp: response::$method_name = serde_json::from_str(&resp)?;
                        Ok(resp.data)
                    }
                )*

                pub async fn call(&self, req: String) -> Result<String> {
                    let (tx, rx) = oneshot::channel();
                    let pkg = NetworkPackage {
                        to: self.server_id.clone(),
                        reply: tx,
                        data: req.clone(),
                    };
                    self.tx
                        .send(pkg)
                        .await
                        .map_err(|_| anyhow!("network is down"))?;
                    let resp = rx
                        .await
                        .map_err(|_| anyhow!("rpc to {} lost", self.server_id))?;
                    trace!("req: {}, resp: {}", req, &resp);
                    Ok(resp)
                }
            }

            impl client::Client for Client {
                fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self {
                    Self {
                        server_id,
                        tx: net_tx,
                    }
                }
            }

            #[derive(Debug)]
            pub struct Server<T: Service> {
                svc: Arc<T>,
                tx: Sender<NetworkPackage>,
                rx: Receiver<NetworkPackage>,
            }

            #[async_trait]
            impl<T: Service> server::Server for Server<T> {
                type Service = Arc<T>;

                fn from_service(svc: Self::Service) -> Self {
                    let (tx, rx) = mpsc::channel(100);
                    Self {svc, tx, rx}
                }

                fn client_chan(&self) -> Sender<NetworkPackage> {
                    self.tx.clone()
                }

                async fn handle(&mut self) -> Result<()> {
                    let NetworkPackage { reply, data, .. } = self
                        .rx
                        .recv()
                        .await
                        .ok_or_else(|| anyhow!("expected sender"))?;
                    trace!("handle recv: {}", &data);
                    let req: Request = serde_json::from_str(&data)?;
                    let svc = self.svc.clone();
                    $crate::tokio::spawn(async move {
                        let resp: Result<String> = match req {
                            $(
                                Request::$method_name { $($arg_id),* } => {
                                    svc.$method_name($($arg_id),* )
                                        .await
                                        .and_then(|data| {
                                            serde_json::to_string(&response::$method_name { data })
                                                .map_err(Into::into)
                                        })
                                }
                            )*
                        };
                        match resp {
                            Ok(resp) => {
                                trace!("handle send: {}", &resp);
                                // The network may have stopped waiting.
                                let _ = reply.send(resp);
                            }
                            Err(e) => debug!("{} handler failed: {}", stringify!($svc_name), e),
                        }
                    });
                    Ok(())
                }
            }
        }
    };
}
