use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::{sync::mpsc, time::Duration};
use tokio_tungstenite::tungstenite::Message;

use super::{ListerWatcher, Store};
use crate::{models::WatchEvent, objects::Object};

const RESYNC_PERIOD: Duration = Duration::from_secs(30);

pub(super) enum ReflectorNotification<T> {
    Add(T),
    Update(T, T),
    Delete(T),
    Resync,
}

pub(super) struct Reflector<T> {
    lw: ListerWatcher<T>,
    store: Store<T>,
}

impl<T> Reflector<T>
where
    T: Object + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(super) fn new(lw: ListerWatcher<T>, store: Store<T>) -> Self {
        Self { lw, store }
    }

    pub(super) async fn run(&self, tx: mpsc::Sender<ReflectorNotification<T>>) -> Result<()> {
        self.list(&tx).await?;

        let resync_tx = tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RESYNC_PERIOD);
            loop {
                ticker.tick().await;
                if resync_tx.send(ReflectorNotification::Resync).await.is_err() {
                    break;
                }
            }
        });

        let (_, mut receiver) = (self.lw.watcher)(()).await?.split();
        loop {
            let msg: Message = receiver
                .next()
                .await
                .ok_or_else(|| anyhow!("watch stream closed by api server"))??;

            if msg.is_close() {
                return Err(anyhow!("api server watch disconnected"));
            }
            let Message::Text(text) = msg else {
                tracing::warn!("received non-text watch message");
                continue;
            };

            let event: WatchEvent = serde_json::from_str(&text)?;
            match event {
                WatchEvent::Put(put) => {
                    let object: T = serde_json::from_value(put.object)?;
                    if let Some(old) = self.store.get(&put.key) {
                        let old = old.clone();
                        self.store.insert(put.key, object.clone());
                        tx.send(ReflectorNotification::Update(old, object)).await?;
                    } else {
                        self.store.insert(put.key, object.clone());
                        tx.send(ReflectorNotification::Add(object)).await?;
                    }
                },
                WatchEvent::Delete(delete) => {
                    if let Some((_, old)) = self.store.remove(&delete.key) {
                        tx.send(ReflectorNotification::Delete(old)).await?;
                    } else {
                        tracing::warn!("watch inconsistent: key {} already gone", delete.key);
                    }
                },
            }
        }
    }

    async fn list(&self, tx: &mpsc::Sender<ReflectorNotification<T>>) -> Result<()> {
        let objects = (self.lw.lister)(()).await?;
        for object in objects {
            self.store.insert(object.uri(), object.clone());
            tx.send(ReflectorNotification::Add(object)).await?;
        }
        Ok(())
    }
}
