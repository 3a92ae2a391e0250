use std::sync::Arc;

use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Map, AST};
use thiserror::Error;
use tracing::{debug, info};

use crate::value::{ScriptFn, Value};

const DEFAULT_MAX_OPERATIONS: u64 = 1_000_000;

// prefijo que rhai le pone a las funciones anónimas (`|x| ...`)
const ANON_FN_PREFIX: &str = "anon$";

pub(crate) fn is_anonymous(fn_name: &str) -> bool {
    fn_name.starts_with(ANON_FN_PREFIX)
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("error de compilación: {0}")]
    Compile(String),

    #[error("error de ejecución: {0}")]
    Eval(String),

    #[error("el código no define ninguna función invocable")]
    NoCallable,

    #[error("el código define {0} funciones con nombre, se esperaba una sola")]
    AmbiguousCallable(usize),

    #[error("la función no está compilada: {0}")]
    NotCompiled(String),

    #[error("valor no soportado por el runtime: {0}")]
    UnsupportedValue(String),
}

fn eval_err(e: Box<EvalAltResult>) -> ScriptError {
    ScriptError::Eval(e.to_string())
}

/// Límites del sandbox. Cualquier closure que los exceda falla con `ScriptError::Eval`.
#[derive(Debug, Clone)]
pub struct RuntimeLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_function_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
            max_string_size: 1 << 20,
            max_array_size: 100_000,
            max_map_size: 100_000,
        }
    }
}

impl RuntimeLimits {
    /// Igual que `default()`, pero SCRIPT_MAX_OPERATIONS puede sobreescribir el presupuesto.
    pub fn from_env() -> Self {
        let max_operations = std::env::var("SCRIPT_MAX_OPERATIONS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MAX_OPERATIONS);

        Self {
            max_operations,
            ..Self::default()
        }
    }
}

/// Runtime de scripts acotado donde se reconstruyen las funciones recibidas.
#[derive(Clone)]
pub struct ScriptRuntime {
    engine: Arc<Engine>,
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new(RuntimeLimits::default())
    }
}

impl ScriptRuntime {
    pub fn new(limits: RuntimeLimits) -> Self {
        let mut engine = Engine::new();

        engine
            .set_max_operations(limits.max_operations)
            .set_max_call_levels(limits.max_call_levels)
            .set_max_expr_depths(limits.max_expr_depth, limits.max_function_expr_depth)
            .set_max_string_size(limits.max_string_size)
            .set_max_array_size(limits.max_array_size)
            .set_max_map_size(limits.max_map_size);

        // nada de evaluar texto arbitrario desde dentro de una closure
        engine.disable_symbol("eval");

        // print/debug de los scripts van a tracing, no a stdout
        engine.on_print(|text| info!(target: "script", "{}", text));
        engine.on_debug(|text, source, pos| {
            debug!(target: "script", "{} ({:?} @ {})", text, source, pos)
        });

        Self {
            engine: Arc::new(engine),
        }
    }

    pub(crate) fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub(crate) fn compile_ast(&self, source: &str) -> Result<AST, ScriptError> {
        self.engine
            .compile(source)
            .map_err(|e| ScriptError::Compile(e.to_string()))
    }

    /// Compila el fuente de una función y devuelve una `ScriptFn` invocable.
    ///
    /// El fuente puede ser una expresión que evalúa a un puntero de función
    /// (`|x| x * 2`) o un script con exactamente una función con nombre
    /// (`fn double(x) { x * 2 }`).
    pub fn compile(&self, source: &str) -> Result<ScriptFn, ScriptError> {
        let ast = self.compile_ast(source)?;
        let ptr = self.callable_in(&ast)?;

        Ok(ScriptFn::with_compiled(
            source.to_string(),
            CompiledFn {
                engine: self.engine.clone(),
                ast,
                ptr,
            },
        ))
    }

    pub(crate) fn callable_in(&self, ast: &AST) -> Result<FnPtr, ScriptError> {
        let result: Dynamic = self.engine.eval_ast(ast).map_err(eval_err)?;
        if let Some(ptr) = result.try_cast::<FnPtr>() {
            return Ok(ptr);
        }

        let names: Vec<String> = ast
            .iter_functions()
            .filter(|f| !is_anonymous(f.name))
            .map(|f| f.name.to_string())
            .collect();
        match names.as_slice() {
            [] => Err(ScriptError::NoCallable),
            [name] => FnPtr::new(name.as_str()).map_err(eval_err),
            many => Err(ScriptError::AmbiguousCallable(many.len())),
        }
    }
}

/// Función ya compilada: engine, programa y puntero a la función a llamar.
pub struct CompiledFn {
    engine: Arc<Engine>,
    ast: AST,
    ptr: FnPtr,
}

impl CompiledFn {
    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }

    pub(crate) fn ptr(&self) -> &FnPtr {
        &self.ptr
    }

    fn call(&self, args: Vec<Value>) -> Result<Value, ScriptError> {
        let args = args
            .into_iter()
            .map(to_dynamic)
            .collect::<Result<Vec<_>, _>>()?;

        let out: Dynamic = self
            .ptr
            .call(&self.engine, &self.ast, args)
            .map_err(eval_err)?;

        from_dynamic(out)
    }
}

impl ScriptFn {
    /// Invoca la función. Sólo funciona sobre funciones decodificadas/compiladas.
    pub fn call(&self, args: Vec<Value>) -> Result<Value, ScriptError> {
        match self.compiled() {
            Some(compiled) => compiled.call(args),
            None => Err(ScriptError::NotCompiled(self.source().to_string())),
        }
    }
}

/* --------- Conversión Value <-> Dynamic --------- */

pub(crate) fn to_dynamic(value: Value) -> Result<Dynamic, ScriptError> {
    Ok(match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from_bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from_int(i),
            None => Dynamic::from_float(n.as_f64().unwrap_or_default()),
        },
        Value::Text(s) => Dynamic::from(ImmutableString::from(s)),
        Value::List(items) => Dynamic::from_array(
            items
                .into_iter()
                .map(to_dynamic)
                .collect::<Result<Array, _>>()?,
        ),
        Value::Map(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                map.insert(k.into(), to_dynamic(v)?);
            }
            Dynamic::from_map(map)
        }
        // las funciones no se pasan como argumento; viajan como globals
        Value::Function(f) => {
            return Err(ScriptError::UnsupportedValue(format!(
                "función como argumento ({})",
                f.source()
            )))
        }
    })
}

pub(crate) fn from_dynamic(value: Dynamic) -> Result<Value, ScriptError> {
    let value = value.flatten();

    if value.is_unit() {
        return Ok(Value::Null);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Ok(i) = value.as_int() {
        return Ok(Value::from(i));
    }
    if let Ok(f) = value.as_float() {
        return Ok(Value::from(f));
    }
    if let Ok(c) = value.as_char() {
        return Ok(Value::Text(c.to_string()));
    }
    if value.is_string() {
        return value
            .into_string()
            .map(Value::Text)
            .map_err(|t| ScriptError::UnsupportedValue(t.to_string()));
    }
    if value.is_array() {
        let items = value
            .into_array()
            .map_err(|t| ScriptError::UnsupportedValue(t.to_string()))?;
        return items
            .into_iter()
            .map(from_dynamic)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List);
    }
    if value.is_map() {
        let type_name = value.type_name().to_string();
        let map = value
            .try_cast::<Map>()
            .ok_or(ScriptError::UnsupportedValue(type_name))?;

        let mut out = std::collections::BTreeMap::new();
        for (k, v) in map {
            out.insert(k.to_string(), from_dynamic(v)?);
        }
        return Ok(Value::Map(out));
    }

    Err(ScriptError::UnsupportedValue(value.type_name().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn closure_anonima_se_compila_y_ejecuta() {
        let rt = ScriptRuntime::default();
        let f = rt.compile("|a, b| a + b").unwrap();

        let out = f.call(vec![Value::from(2_i64), Value::from(40_i64)]).unwrap();
        assert_eq!(out, Value::from(42_i64));
    }

    #[test]
    fn funcion_con_nombre_se_compila_y_ejecuta() {
        let rt = ScriptRuntime::default();
        let f = rt.compile("fn shout(s) { s + \"!\" }").unwrap();

        let out = f.call(vec![Value::from("hola")]).unwrap();
        assert_eq!(out, Value::from("hola!"));
    }

    #[test]
    fn devuelve_mapas_y_listas() {
        let rt = ScriptRuntime::default();
        let f = rt.compile("|r| #{ key: r.word, counts: [1, 2] }").unwrap();

        let out = f
            .call(vec![Value::from(json!({"word": "hola"}))])
            .unwrap();
        assert_eq!(out, Value::from(json!({"key": "hola", "counts": [1, 2]})));
    }

    #[test]
    fn funcion_con_nombre_que_usa_una_closure_no_es_ambigua() {
        let rt = ScriptRuntime::default();
        let f = rt
            .compile("fn total(xs) { xs.reduce(|acc, x| acc + x, 0) }")
            .unwrap();

        let out = f.call(vec![Value::from(vec![1_i64, 2, 3])]).unwrap();
        assert_eq!(out, Value::from(6_i64));
    }

    #[test]
    fn script_sin_funciones_no_es_invocable() {
        let rt = ScriptRuntime::default();
        assert!(matches!(rt.compile("40 + 2"), Err(ScriptError::NoCallable)));
    }

    #[test]
    fn varias_funciones_con_nombre_son_ambiguas() {
        let rt = ScriptRuntime::default();
        let res = rt.compile("fn a() { 1 } fn b() { 2 }");
        assert!(matches!(res, Err(ScriptError::AmbiguousCallable(2))));
    }

    #[test]
    fn error_de_sintaxis_es_error_de_compilacion() {
        let rt = ScriptRuntime::default();
        assert!(matches!(rt.compile("|x| x +"), Err(ScriptError::Compile(_))));
    }

    #[test]
    fn presupuesto_de_operaciones_corta_bucles_infinitos() {
        let rt = ScriptRuntime::new(RuntimeLimits {
            max_operations: 1_000,
            ..RuntimeLimits::default()
        });
        let f = rt.compile("|| { loop { } }").unwrap();

        assert!(matches!(f.call(vec![]), Err(ScriptError::Eval(_))));
    }

    #[test]
    fn funcion_sin_compilar_no_se_puede_llamar() {
        let f = ScriptFn::new("|x| x");
        assert!(matches!(f.call(vec![]), Err(ScriptError::NotCompiled(_))));
    }
}
