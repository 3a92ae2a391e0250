use anyhow::{bail, Context, Result};
use common::{ExecuteGraphRequest, GraphInfo, Host, OutputLines, PartitionInfo};
use reqwest::{Client, StatusCode};
use std::env;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
pub fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

/// Host que habla con el master por HTTP.
///
/// `Host` es síncrono, así que cada llamada se bloquea sobre un runtime
/// de tokio propio.
pub struct HttpHost {
    rt: Runtime,
    client: Client,
    base_url: String,
}

impl HttpHost {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("no se pudo crear el runtime de tokio")?;

        Ok(Self {
            rt,
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(master_base_url())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /* ---------------- consultas al master ---------------- */

    pub fn graphs(&self) -> Result<Vec<GraphInfo>> {
        self.rt.block_on(self.fetch_graphs())
    }

    /// `None` si el master no conoce el grafo.
    pub fn graph(&self, id: &str) -> Result<Option<GraphInfo>> {
        self.rt.block_on(self.fetch_graph(id))
    }

    pub fn output_lines(&self) -> Result<Vec<String>> {
        self.rt.block_on(self.fetch_output())
    }

    async fn fetch_graphs(&self) -> Result<Vec<GraphInfo>> {
        let url = self.url("/api/v1/graphs");
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            bail!("error consultando {} (status {})", url, resp.status());
        }
        Ok(resp.json().await?)
    }

    async fn fetch_graph(&self, id: &str) -> Result<Option<GraphInfo>> {
        let url = self.url(&format!("/api/v1/graphs/{}", id));
        let resp = self.client.get(&url).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(resp.json().await?)),
            s => bail!("error consultando {} (status {})", url, s),
        }
    }

    async fn fetch_output(&self) -> Result<Vec<String>> {
        let url = self.url("/api/v1/output");
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            bail!("error consultando {} (status {})", url, resp.status());
        }
        let out: OutputLines = resp.json().await?;
        Ok(out.lines)
    }

    /* ---------------- puntos de entrada del Host ---------------- */

    async fn post_text(&self, path: &str, text: &str) -> Result<()> {
        let url = self.url(path);
        self.client
            .post(&url)
            .body(text.to_string())
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("error enviando a {}", url))?;
        Ok(())
    }

    async fn post_graph(&self, jobs: &str, root_job_id: &str) -> Result<()> {
        let req = ExecuteGraphRequest {
            jobs: jobs.to_string(),
            root_job_id: root_job_id.to_string(),
        };
        let resp = self
            .client
            .post(self.url("/api/v1/graphs"))
            .json(&req)
            .send()
            .await?;
        let status = resp.status();

        if status.is_success() {
            let info: GraphInfo = resp.json().await?;
            debug!("grafo {} aceptado por el master como {}", root_job_id, info.id);
            return Ok(());
        }

        // 422 trae el GraphInfo con el motivo del rechazo
        let body = resp.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<GraphInfo>(&body)
            .ok()
            .and_then(|info| info.error)
            .unwrap_or(body);
        bail!(
            "el master rechazó el grafo {} (status {}): {}",
            root_job_id,
            status,
            reason
        )
    }

    async fn fetch_partitions(
        &self,
        table: &str,
        from: &str,
        until: &str,
    ) -> Result<Vec<PartitionInfo>> {
        let resp = self
            .client
            .get(self.url("/api/v1/partitions"))
            .query(&[("table", table), ("from", from), ("until", until)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "error listando particiones de {} (status {}): {}",
                table,
                status,
                body
            );
        }
        Ok(resp.json().await?)
    }
}

impl Host for HttpHost {
    fn log(&self, message: &str) {
        // el log es best-effort: si el master no responde solo se avisa
        if let Err(e) = self.rt.block_on(self.post_text("/api/v1/log", message)) {
            warn!("no se pudo enviar el log al master: {:#}", e);
        }
    }

    fn execute_graph(&self, jobs: &str, root_job_id: &str) -> Result<()> {
        self.rt.block_on(self.post_graph(jobs, root_job_id))
    }

    fn list_partitions(&self, table: &str, from: &str, until: &str) -> Result<Vec<PartitionInfo>> {
        self.rt.block_on(self.fetch_partitions(table, from, until))
    }

    fn write_output(&self, text: &str) -> Result<()> {
        self.rt.block_on(self.post_text("/api/v1/output", text))
    }
}
