use anyhow::{anyhow, Result};
use reqwest::Url;
use serde::{de::DeserializeOwned, Serialize};
use tokio_tungstenite::connect_async;

use crate::{
    config::ControllerConfig,
    informer::{ListerWatcher, WsStream},
    models::Response,
    objects::Object,
};

/// List every object of a collection from the cluster API server.
pub async fn list<T>(config: &ControllerConfig, path: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let url = format!("{}/apis/zalando.org/v1/{}", config.api_server_url, path);
    let response = reqwest::get(url).await?.json::<Response<Vec<T>>>().await?;
    response.data.ok_or_else(|| anyhow!("lister returned no data for {path}"))
}

/// Fetch a single object by its full URI.
pub async fn get<T>(config: &ControllerConfig, uri: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let url = format!("{}{}", config.api_server_url, uri);
    let response = reqwest::get(url).await?.json::<Response<T>>().await?;
    response.data.ok_or_else(|| anyhow!("object at {uri} not found"))
}

/// Replace an object's spec/status in the cluster API server.
pub async fn put<T>(config: &ControllerConfig, object: &T) -> Result<()>
where
    T: Object + Serialize,
{
    let client = reqwest::Client::new();
    let url = format!("{}{}", config.api_server_url, object.uri());
    let response = client
        .put(url)
        .json(object)
        .send()
        .await?
        .json::<Response<()>>()
        .await?;
    if let Some(msg) = response.msg {
        tracing::debug!("{}", msg);
    }
    Ok(())
}

/// Delete an object by its full URI.
pub async fn delete(config: &ControllerConfig, uri: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{}{}", config.api_server_url, uri);
    let response = client.delete(url).send().await?.json::<Response<()>>().await?;
    if let Some(msg) = response.msg {
        tracing::debug!("{}", msg);
    }
    Ok(())
}

/// Build the lister/watcher pair an informer needs for one collection path,
/// e.g. `stacksets`, `stacks`, `horizontalpodautoscalers`.
pub fn create_lister_watcher<T>(config: &ControllerConfig, path: String) -> ListerWatcher<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let list_url = format!(
        "{}/apis/zalando.org/v1/{}",
        config.api_server_url, path
    );
    let watch_url = format!(
        "{}/apis/zalando.org/v1/watch/{}",
        config.api_server_watch_url, path
    );

    ListerWatcher {
        lister: Box::new(move |_| {
            let list_url = list_url.clone();
            Box::pin(async move {
                let res = reqwest::get(list_url).await?.json::<Response<Vec<T>>>().await?;
                res.data.ok_or_else(|| anyhow!("lister failed"))
            })
        }),
        watcher: Box::new(move |_| {
            let watch_url = watch_url.clone();
            Box::pin(async move {
                let url = Url::parse(&watch_url)?;
                let (stream, _) = connect_async(url).await?;
                Ok::<WsStream, anyhow::Error>(stream)
            })
        }),
    }
}
