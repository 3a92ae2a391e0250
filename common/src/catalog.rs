use anyhow::{Context, Result};

use crate::api::PartitionInfo;

const DEFAULT_PARTITION_WINDOW: u64 = 3600;

// tope de particiones por consulta, para rangos absurdos
const MAX_PARTITIONS_PER_QUERY: usize = 100_000;

/// Catálogo de particiones por ventanas fijas: cada tabla se parte en
/// ventanas alineadas de `window` unidades de tiempo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCatalog {
    window: u64,
}

impl WindowCatalog {
    pub fn new(window: u64) -> Self {
        Self {
            window: window.max(1),
        }
    }

    /// Ancho de ventana desde PARTITION_WINDOW, o el default.
    pub fn from_env() -> Self {
        let window = std::env::var("PARTITION_WINDOW")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_PARTITION_WINDOW);
        Self::new(window)
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Ventanas que se solapan con `[from, until)`, en orden de tiempo.
    pub fn list(&self, table: &str, from: u64, until: u64) -> Vec<PartitionInfo> {
        let mut out = Vec::new();
        let mut begin = from - from % self.window;

        while begin < until && out.len() < MAX_PARTITIONS_PER_QUERY {
            let limit = begin.saturating_add(self.window);
            out.push(PartitionInfo::new(format!("{table}/{begin}"), begin, limit));
            if limit == begin {
                break;
            }
            begin = limit;
        }

        out
    }

    /// Igual que `list`, con los límites como texto decimal.
    pub fn list_text(&self, table: &str, from: &str, until: &str) -> Result<Vec<PartitionInfo>> {
        let from: u64 = from
            .trim()
            .parse()
            .with_context(|| format!("from inválido: '{from}'"))?;
        let until: u64 = until
            .trim()
            .parse()
            .with_context(|| format!("until inválido: '{until}'"))?;

        Ok(self.list(table, from, until))
    }
}

impl Default for WindowCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITION_WINDOW)
    }
}
