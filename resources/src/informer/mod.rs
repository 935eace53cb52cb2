use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::objects::Object;

mod reflector;

use reflector::{Reflector, ReflectorNotification};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// In-memory mirror of one resource collection, keyed by object URI.
pub type Store<T> = Arc<DashMap<String, T>>;

pub type CLS<ARG, RES> = Box<dyn Fn(ARG) -> BoxFuture<'static, Result<RES>> + Send + Sync>;

pub struct ListerWatcher<T> {
    pub lister: CLS<(), Vec<T>>,
    pub watcher: CLS<(), WsStream>,
}

/// Closures run on each reflector notification. All three receive owned
/// values so they can move them into a spawned task without borrowing the
/// informer.
pub struct EventHandler<T> {
    pub add_cls: CLS<T, ()>,
    pub update_cls: CLS<(T, T), ()>,
    pub delete_cls: CLS<T, ()>,
}

/// Called once per full resync period, independent of add/update/delete.
pub struct ResyncHandler(pub CLS<(), ()>);

pub struct Informer<T> {
    lw: ListerWatcher<T>,
    eh: EventHandler<T>,
    rh: ResyncHandler,
    store: Store<T>,
}

impl<T> Informer<T>
where
    T: Object + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(lw: ListerWatcher<T>, eh: EventHandler<T>, rh: ResyncHandler) -> Self {
        Self {
            lw,
            eh,
            rh,
            store: Arc::new(DashMap::new()),
        }
    }

    pub fn get_store(&self) -> Store<T> {
        self.store.clone()
    }

    pub async fn run(self) -> Result<()> {
        let Informer {
            lw,
            eh,
            rh,
            store,
        } = self;

        let reflector = Reflector::new(lw, store);
        let (tx, mut rx) = mpsc::channel::<ReflectorNotification<T>>(16);
        let reflector_handle = tokio::spawn(async move { reflector.run(tx).await });

        tracing::info!("Informer started");
        while let Some(notification) = rx.recv().await {
            match notification {
                ReflectorNotification::Add(new) => {
                    (eh.add_cls)(new).await.with_context(|| "add handler failed")?;
                },
                ReflectorNotification::Update(old, new) => {
                    (eh.update_cls)((old, new))
                        .await
                        .with_context(|| "update handler failed")?;
                },
                ReflectorNotification::Delete(old) => {
                    (eh.delete_cls)(old)
                        .await
                        .with_context(|| "delete handler failed")?;
                },
                ReflectorNotification::Resync => {
                    (rh.0)(()).await.with_context(|| "resync handler failed")?;
                },
            }
        }

        reflector_handle.await?
    }
}
