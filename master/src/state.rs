// master/src/state.rs

use common::{GraphInfo, ScriptRuntime, WindowCatalog};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct AppState {
    // grafos recibidos, en orden de llegada (aceptados y rechazados)
    pub graphs: Arc<Mutex<Vec<GraphInfo>>>,
    // líneas escritas al canal de resultados
    pub outputs: Arc<Mutex<Vec<String>>>,
    pub catalog: WindowCatalog,
    // runtime acotado donde se validan las closures recibidas
    pub runtime: ScriptRuntime,
}

impl AppState {
    pub fn new(catalog: WindowCatalog, runtime: ScriptRuntime) -> Self {
        Self {
            graphs: Arc::new(Mutex::new(Vec::new())),
            outputs: Arc::new(Mutex::new(Vec::new())),
            catalog,
            runtime,
        }
    }
}

/// Toma el lock aunque otro handler haya entrado en pánico con él tomado.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
