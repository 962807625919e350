//! Scripted transport for unit tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use skein_core::{OnionPath, Snode};
use skein_transport::{
    DestinationResponse, OnionRequest, OnionTransport, TransportError, TransportResult, V4Body,
};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::Duration;

type Handler = dyn Fn(&Snode, &Value) -> TransportResult<DestinationResponse> + Send + Sync;

/// Answers each storage RPC with a handler; records what was sent.
pub(crate) struct ScriptedTransport {
    handler: Box<Handler>,
    pub(crate) sent: Mutex<Vec<(Snode, Value)>>,
}

impl ScriptedTransport {
    pub(crate) fn new(
        handler: impl Fn(&Snode, &Value) -> TransportResult<DestinationResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Every sub-request answered with `200 {}` unless `answer` says otherwise.
    pub(crate) fn per_request(
        answer: impl Fn(&Value) -> (u16, Value) + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |_, rpc| {
            let results: Vec<Value> = rpc["params"]["requests"]
                .as_array()
                .map(|requests| {
                    requests
                        .iter()
                        .map(|request| {
                            let (code, body) = answer(request);
                            json!({ "code": code, "body": body })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(ok_json(json!({ "results": results })))
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

pub(crate) fn ok_json(body: Value) -> DestinationResponse {
    DestinationResponse {
        status: 200,
        headers: BTreeMap::new(),
        body: V4Body::Json(body),
    }
}

#[async_trait]
impl OnionTransport for ScriptedTransport {
    async fn send(
        &self,
        _path: &OnionPath,
        request: OnionRequest,
        _timeout: Duration,
    ) -> TransportResult<DestinationResponse> {
        match request {
            OnionRequest::Snode { target, rpc } => {
                self.sent.lock().unwrap().push((target.clone(), rpc.clone()));
                (self.handler)(&target, &rpc)
            }
            OnionRequest::Server { .. } => Err(TransportError::InvalidPath("server".into())),
        }
    }
}

pub(crate) fn node(n: u8) -> Snode {
    Snode::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)), 22021, [n; 32], [n; 32])
}

pub(crate) fn nodes(count: u8) -> Vec<Snode> {
    (1..=count).map(node).collect()
}
