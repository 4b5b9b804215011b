use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tokio::time::sleep;
use tracing::{debug, info};

/// Umbral de BigGIM para quedarse con una arista
pub const BIGGIM_CUTOFF: f64 = 0.8;
pub const BIGGIM_TABLE: &str = "BigGIM_70_v1";
const BIGGIM_POLL_ATTEMPTS: u32 = 60;
const BIGGIM_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Cómo viene escrita la red que recibe el motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFormat {
    /// Pares de nodos separados por espacios, tabs o comas
    EdgeList,
    /// JSON CX de NDEx
    Cx,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("Unable to save network: {0}")]
    Io(#[from] std::io::Error),

    #[error("BigGIM query failed: {0}")]
    BigGim(String),
}

/// Descarga la red de una tarea y la deja en `dest`.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    async fn fetch_ndex(&self, network_id: &str, dest: &Path) -> Result<NetworkFormat, FetchError>;

    async fn fetch_column(&self, column: &str, dest: &Path) -> Result<NetworkFormat, FetchError>;
}

#[derive(Debug, Deserialize)]
struct BigGimQuery {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct BigGimStatus {
    status: String,
    #[serde(default)]
    request_uri: Vec<String>,
}

/// NDEx y BigGIM sobre HTTPS.
#[derive(Debug, Clone)]
pub struct HttpNetworkFetcher {
    client: Client,
    ndex_server: String,
    biggim_url: String,
}

impl HttpNetworkFetcher {
    pub fn new(ndex_server: &str, biggim_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("nbgwas-taskrunner/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            ndex_server: ndex_server.trim_end_matches('/').to_string(),
            biggim_url: biggim_url.trim_end_matches('/').to_string(),
        })
    }

    /// `public.ndexbio.org` -> `https://public.ndexbio.org/v2/network/<id>`
    pub fn ndex_url(&self, network_id: &str) -> String {
        if self.ndex_server.starts_with("http://") || self.ndex_server.starts_with("https://") {
            format!("{}/v2/network/{}", self.ndex_server, network_id)
        } else {
            format!("https://{}/v2/network/{}", self.ndex_server, network_id)
        }
    }

    fn biggim_query(&self, column: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/biggim/query", self.biggim_url))
            .query(&[
                ("table", BIGGIM_TABLE.to_string()),
                ("columns", column.to_string()),
                ("restriction_gt", format!("{column},{BIGGIM_CUTOFF}")),
                ("restriction_join", "intersect".to_string()),
                ("limit", "10000000".to_string()),
            ])
    }

    fn biggim_status(&self, request_id: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/biggim/status/{}", self.biggim_url, request_id))
    }

    async fn download(&self, request: RequestBuilder) -> Result<Vec<u8>, FetchError> {
        let resp = request.send().await?;
        let url = resp.url().to_string();
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn download_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, FetchError> {
        let bytes = self.download(request).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::BigGim(format!("unexpected response: {e}")))
    }
}

#[async_trait]
impl NetworkFetcher for HttpNetworkFetcher {
    async fn fetch_ndex(&self, network_id: &str, dest: &Path) -> Result<NetworkFormat, FetchError> {
        let url = self.ndex_url(network_id);
        info!("descargando red {} de NDEx", network_id);
        let body = self.download(self.client.get(&url)).await?;
        debug!("{} bytes de {}", body.len(), url);
        tokio::fs::write(dest, &body).await?;
        Ok(NetworkFormat::Cx)
    }

    // BigGIM resuelve la consulta en diferido: se pide, se sondea el estado y
    // se bajan los CSV resultantes
    async fn fetch_column(&self, column: &str, dest: &Path) -> Result<NetworkFormat, FetchError> {
        info!("consultando BigGIM por la columna {}", column);
        let query: BigGimQuery = self.download_json(self.biggim_query(column)).await?;

        let mut uris = Vec::new();
        for attempt in 1..=BIGGIM_POLL_ATTEMPTS {
            let status: BigGimStatus = self
                .download_json(self.biggim_status(&query.request_id))
                .await?;
            match status.status.as_str() {
                "complete" => {
                    uris = status.request_uri;
                    break;
                }
                "error" | "failed" => {
                    return Err(FetchError::BigGim(format!(
                        "request {} ended with status {}",
                        query.request_id, status.status
                    )))
                }
                other => debug!(
                    "BigGIM {} en estado {} (intento {}/{})",
                    query.request_id, other, attempt, BIGGIM_POLL_ATTEMPTS
                ),
            }
            sleep(BIGGIM_POLL_INTERVAL).await;
        }

        if uris.is_empty() {
            return Err(FetchError::BigGim(format!(
                "request {} returned no data",
                query.request_id
            )));
        }

        let mut edges = Vec::new();
        for uri in &uris {
            edges.extend(self.download(self.client.get(uri)).await?);
        }
        tokio::fs::write(dest, &edges).await?;
        Ok(NetworkFormat::EdgeList)
    }
}
