use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{GraphError, Result};
use crate::session::Session;
use crate::value::Value;

/// Nombre reservado: del lado remoto se liga a los params del job.
pub const RESERVED_PARAMS: &str = "params";

/// Prefijo de bindings internos; `auto_broadcast` los ignora.
pub const INTERNAL_PREFIX: &str = "__";

/* --------- Globals del script --------- */

/// Bindings globales del entorno que arma los jobs.
///
/// Reemplaza la introspección del namespace global: lo que el script quiera
/// exponer a los jobs remotos tiene que registrarse acá.
#[derive(Debug, Default)]
pub struct Globals {
    bindings: BTreeMap<String, Value>,
}

impl Globals {
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/* --------- Registro de broadcast --------- */

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEntry {
    pub seq: u64,
    pub name: String,
    pub value: Value,
}

/// Log ordenado y sólo de agregado con todo lo transmitido en la sesión.
///
/// Un job ve la unión de todo lo transmitido antes de crearse: el snapshot
/// se arma plegando el log, y para un mismo nombre gana la última entrada.
#[derive(Debug, Default)]
pub struct BroadcastSet {
    log: Vec<BroadcastEntry>,
}

impl BroadcastSet {
    /// Agrega una entrada salvo que el valor vigente para `name` ya sea igual.
    pub fn record(&mut self, name: &str, value: Value) -> bool {
        if self.current(name) == Some(&value) {
            return false;
        }

        let seq = self.log.len() as u64 + 1;
        self.log.push(BroadcastEntry {
            seq,
            name: name.to_string(),
            value,
        });
        true
    }

    pub fn current(&self, name: &str) -> Option<&Value> {
        self.log
            .iter()
            .rev()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.snapshot_at(u64::MAX)
    }

    /// Snapshot con las entradas hasta `seq` inclusive.
    pub fn snapshot_at(&self, seq: u64) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for entry in self.log.iter().take_while(|e| e.seq <= seq) {
            out.insert(entry.name.clone(), entry.value.clone());
        }
        out
    }
}

/* --------- Operaciones de la sesión --------- */

impl<H> Session<H> {
    /// Copia el valor actual de cada global nombrado al registro de broadcast.
    ///
    /// Acepta cualquier `Into<Value>` para que un nombre que no es texto se
    /// pueda expresar (y rechazar con `InvalidArgument`).
    pub fn broadcast<I>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        for name in names {
            let name = match name.into() {
                Value::Text(s) => s,
                other => {
                    return Err(GraphError::InvalidArgument(format!(
                        "los argumentos de broadcast deben ser strings, llegó {}",
                        other.kind()
                    )))
                }
            };

            if name == RESERVED_PARAMS {
                return Err(GraphError::ReservedName(name));
            }

            let value = self
                .globals
                .get(&name)
                .cloned()
                .ok_or_else(|| GraphError::UndefinedBinding(name.clone()))?;

            if self.broadcasts.record(&name, value) {
                debug!("broadcast de '{}'", name);
            }
        }

        Ok(())
    }

    /// Transmite todas las funciones globales que no sean internas.
    /// Corre antes de crear cada job map/reduce.
    pub fn auto_broadcast(&mut self) -> Result<()> {
        let names: Vec<String> = self
            .globals
            .iter()
            .filter(|(name, value)| !name.starts_with(INTERNAL_PREFIX) && value.is_function())
            .map(|(name, _)| name.to_string())
            .collect();

        self.broadcast(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::value::ScriptFn;

    fn session() -> Session<MemoryHost> {
        Session::new(MemoryHost::new())
    }

    #[test]
    fn broadcast_de_params_es_nombre_reservado() {
        let mut s = session();
        s.define("params", 1_i64);

        assert!(matches!(
            s.broadcast(["params"]),
            Err(GraphError::ReservedName(n)) if n == "params"
        ));
    }

    #[test]
    fn broadcast_de_no_string_es_argumento_invalido() {
        let mut s = session();
        assert!(matches!(
            s.broadcast([42_i64]),
            Err(GraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn broadcast_de_variable_inexistente_falla() {
        let mut s = session();
        assert!(matches!(
            s.broadcast(["neverDefined"]),
            Err(GraphError::UndefinedBinding(n)) if n == "neverDefined"
        ));
    }

    #[test]
    fn broadcast_copia_el_valor_del_momento() {
        let mut s = session();
        s.define("limit", 10_i64);
        s.broadcast(["limit"]).unwrap();

        // cambiar el global después no toca lo ya transmitido
        s.define("limit", 20_i64);
        assert_eq!(s.broadcasts().current("limit"), Some(&Value::from(10_i64)));

        s.broadcast(["limit"]).unwrap();
        assert_eq!(s.broadcasts().current("limit"), Some(&Value::from(20_i64)));
        assert_eq!(s.broadcasts().len(), 2);
    }

    #[test]
    fn auto_broadcast_solo_funciones_no_internas() {
        let mut s = session();
        s.define("helper", ScriptFn::new("fn helper(x) { x }"));
        s.define("__internal", ScriptFn::new("|x| x"));
        s.define("data", "no es funcion");

        s.auto_broadcast().unwrap();

        let snap = s.broadcasts().snapshot();
        assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["helper"]);
    }

    #[test]
    fn auto_broadcast_repetido_no_duplica_entradas() {
        let mut s = session();
        s.define("helper", ScriptFn::new("fn helper(x) { x }"));

        s.auto_broadcast().unwrap();
        s.auto_broadcast().unwrap();

        assert_eq!(s.broadcasts().len(), 1);
    }

    #[test]
    fn snapshot_at_respeta_el_orden_del_log() {
        let mut set = BroadcastSet::default();
        set.record("a", Value::from(1_i64));
        set.record("b", Value::from(2_i64));
        set.record("a", Value::from(3_i64));

        let early = set.snapshot_at(2);
        assert_eq!(early["a"], Value::from(1_i64));
        assert_eq!(early["b"], Value::from(2_i64));

        let all = set.snapshot();
        assert_eq!(all["a"], Value::from(3_i64));
    }
}
