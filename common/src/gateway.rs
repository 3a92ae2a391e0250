use tracing::info;

use crate::dag;
use crate::error::{GraphError, Result};
use crate::host::Host;
use crate::session::Session;

impl<H: Host> Session<H> {
    /// Resuelve el grafo de `root_id` y se lo pasa al ejecutor externo.
    ///
    /// El resultado del ejecutor es opaco: no se inspecciona ni se reintenta.
    pub fn submit(&self, root_id: &str) -> Result<()> {
        let root = self
            .jobs
            .get(root_id)
            .ok_or_else(|| GraphError::UnknownJobReference(root_id.to_string()))?;

        let graph = dag::resolve(root, &self.jobs)?;
        let payload = serde_json::to_string(&graph)?;

        info!(
            "enviando grafo de {} jobs con raíz {} ({})",
            graph.len(),
            root.id,
            root.op()
        );
        self.host.execute_graph(&payload, &root.id)?;
        Ok(())
    }
}
