//! Node Session
//!
//! A thin per-node transport handle: the node descriptor, its precomputed
//! base URL and a clone of the shared HTTP client. Sessions are cheap to
//! clone so the router can copy them out of the topology index while holding
//! the read lock only for the map lookup itself.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cluster::types::Node;
use crate::error::ClientError;

/// Outcome of one HTTP exchange with a node.
///
/// `status` is the application-level answer; `body` is decoded only for
/// success statuses. Transport-level failures never produce an `Exchange`:
/// they surface as [`ClientError::Transport`], keeping "the node said no"
/// separate from "the node is unreachable".
#[derive(Debug)]
pub struct Exchange<T> {
    pub status: u16,
    pub body: Option<T>,
}

#[derive(Clone)]
pub struct Session {
    http: reqwest::Client,
    node: Node,
    base: String,
}

impl Session {
    pub fn new(http: reqwest::Client, node: Node) -> Self {
        let base = format!("http://{}:{}", node.host, node.port);
        Self { http, node, base }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Exchange<T>, ClientError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(ClientError::Transport)?;
        Self::finish(response).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &B,
    ) -> Result<Exchange<T>, ClientError> {
        let response = self
            .http
            .post(self.url(path))
            .json(payload)
            .send()
            .await
            .map_err(ClientError::Transport)?;
        Self::finish(response).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Exchange<T>, ClientError> {
        let response = self
            .http
            .delete(self.url(path))
            .send()
            .await
            .map_err(ClientError::Transport)?;
        Self::finish(response).await
    }

    async fn finish<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Exchange<T>, ClientError> {
        let status = response.status().as_u16();
        let body = if response.status().is_success() {
            match response.bytes().await {
                Ok(raw) => serde_json::from_slice(&raw).ok(),
                Err(e) => return Err(ClientError::Transport(e)),
            }
        } else {
            None
        };
        Ok(Exchange { status, body })
    }
}
