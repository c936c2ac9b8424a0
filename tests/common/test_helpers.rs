use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use trialgate::{Gateway, GatewayConfig, RawResponse, Transport, TransportError};

/// One request as seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub params: Vec<(String, String)>,
    pub at: Instant,
}

impl Recorded {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

type Handler = dyn Fn(&str, &[(String, String)]) -> RawResponse + Send + Sync;

/// In-memory upstream: scripted replies first, then the fallback handler.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    fallback: Box<Handler>,
    requests: Mutex<Vec<Recorded>>,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport").field("requests", &self.requests.lock().unwrap().len()).finish()
    }
}

impl ScriptedTransport {
    /// Answers everything with an empty listing.
    pub fn new() -> Arc<Self> {
        Self::with_fallback(|_, _| RawResponse::new(200, json!({"studies": [], "totalCount": 0}).to_string()))
    }

    pub fn with_fallback<F>(fallback: F) -> Arc<Self>
    where
        F: Fn(&str, &[(String, String)]) -> RawResponse + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Box::new(fallback),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, response: RawResponse) {
        self.script.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, error: TransportError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(Recorded {
            path: path.to_string(),
            params: params.to_vec(),
            at: Instant::now(),
        });
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(reply) => reply,
            None => Ok((self.fallback)(path, params)),
        }
    }
}

/// Gateway on tokio time over `transport`, with jitter off so delays are exact.
pub fn gateway(transport: &Arc<ScriptedTransport>) -> Gateway {
    gateway_with(transport, GatewayConfig::builder())
}

pub fn gateway_with(transport: &Arc<ScriptedTransport>, config: trialgate::config::GatewayConfigBuilder) -> Gateway {
    let config = config.jitter(trialgate::Jitter::None).build().unwrap();
    Gateway::builder(config).shared_transport(transport.clone()).build().unwrap()
}

pub fn study(id: &str, enrollment: u64) -> Value {
    json!({
        "protocolSection": {
            "identificationModule": {"nctId": id, "briefTitle": format!("Study {}", id)},
            "statusModule": {"overallStatus": "COMPLETED"},
            "designModule": {"studyType": "INTERVENTIONAL", "phases": ["PHASE2"], "enrollmentInfo": {"count": enrollment}},
            "conditionsModule": {"conditions": ["Asthma"]}
        },
        "hasResults": true
    })
}

pub fn page(studies: Vec<Value>, total: u64, next: Option<&str>) -> RawResponse {
    let mut body = json!({"studies": studies, "totalCount": total});
    if let Some(token) = next {
        body["nextPageToken"] = json!(token);
    }
    RawResponse::new(200, body.to_string())
}

/// Fallback serving `total` studies, honouring `pageSize` and numeric page tokens.
pub fn registry_of(total: usize) -> impl Fn(&str, &[(String, String)]) -> RawResponse + Send + Sync + 'static {
    move |_, params| {
        let get = |name: &str| params.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());
        let offset: usize = get("pageToken").and_then(|t| t.parse().ok()).unwrap_or(0);
        let size: usize = get("pageSize").and_then(|s| s.parse().ok()).unwrap_or(10);
        let end = (offset + size).min(total);
        let studies = (offset..end).map(|i| study(&format!("NCT{:08}", i), (i as u64 % 7) * 100)).collect();
        let next = (end < total).then(|| end.to_string());
        page(studies, total as u64, next.as_deref())
    }
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}
