use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{Layer, Service, ServiceExt};

use crate::propagate::{Propagate, PropagateLayer};

/// `reqwest::Client` as a tower service so it can sit under
/// [`PropagateLayer`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestService {
    client: reqwest::Client,
}

impl ReqwestService {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Service<reqwest::Request> for ReqwestService {
    type Response = reqwest::Response;
    type Error = reqwest::Error;
    type Future = BoxFuture<'static, Result<reqwest::Response, reqwest::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: reqwest::Request) -> Self::Future {
        let client = self.client.clone();
        Box::pin(async move { client.execute(req).await })
    }
}

/// reqwest client whose calls carry the local trace id and bring remote
/// traces back into it.
#[derive(Clone)]
pub struct TracedClient {
    client: reqwest::Client,
    svc: Propagate<ReqwestService>,
}

impl TracedClient {
    pub fn new(client: reqwest::Client, layer: &PropagateLayer) -> Self {
        Self {
            svc: layer.layer(ReqwestService::new(client.clone())),
            client,
        }
    }

    pub async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, reqwest::Error> {
        let req = req.build()?;
        self.svc.clone().oneshot(req).await
    }

    pub async fn get(&self, url: &str) -> Result<reqwest::Response, reqwest::Error> {
        self.send(self.client.get(url)).await
    }

    pub fn stats(&self) -> std::sync::Arc<crate::propagate::MergeStats> {
        self.svc.stats()
    }
}
