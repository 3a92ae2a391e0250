use std::collections::BTreeMap;
use std::sync::Arc;

use rhai::{CallFnOptions, Dynamic, Engine, FnPtr, Map, Scope, AST};
use tracing::debug;

use crate::codec::{self, CodecError};
use crate::script::{from_dynamic, is_anonymous, to_dynamic, ScriptError, ScriptRuntime};
use crate::value::{ScriptFn, Value};

/// Entorno de ejecución de un job map/reduce reconstruido en el lado remoto:
/// la función del job, los globals transmitidos y los `params`.
///
/// Las funciones globales se pueden llamar por el nombre con que se
/// transmitieron (`helper(x)`), sea cual sea su forma. Los datos (globals no-función y `params`)
/// quedan ligados a `this`: `this.params.factor`, `this.stopwords`, ...
pub struct LoadedClosure {
    engine: Arc<Engine>,
    program: AST,
    entry: FnPtr,
    env: Dynamic,
    globals: BTreeMap<String, Value>,
    params: Value,
}

impl ScriptRuntime {
    pub fn load_closure(
        &self,
        fn_source: &str,
        globals_text: &str,
        params_text: &str,
    ) -> Result<LoadedClosure, CodecError> {
        let globals = match codec::decode(globals_text, self)? {
            Value::Map(m) => m,
            other => {
                return Err(CodecError::UnexpectedShape {
                    expected: "map",
                    found: other.kind(),
                })
            }
        };
        let params = codec::decode(params_text, self)?;

        let mut program = AST::empty();
        let mut env = Map::new();

        for (name, value) in &globals {
            match value {
                Value::Function(f) => {
                    let (bound, ptr) = self.bind_function(name, f)?;
                    program = program.merge(&bound);
                    env.insert(name.as_str().into(), Dynamic::from(ptr));
                }
                data => {
                    env.insert(name.as_str().into(), to_dynamic(data.clone())?);
                }
            }
        }
        env.insert("params".into(), to_dynamic(params.clone())?);

        let main = self.compile_ast(fn_source)?;
        let entry = self.callable_in(&main)?;
        // la función del job pisa cualquier global con el mismo nombre
        program = program.merge(&main);

        Ok(LoadedClosure {
            engine: self.engine().clone(),
            program,
            entry,
            env: Dynamic::from_map(env),
            globals,
            params,
        })
    }
}

impl ScriptRuntime {
    /// Programa donde la función global `f` se puede llamar como `name(..)`.
    ///
    /// Una función con nombre igual al binding se usa tal cual. En los demás
    /// casos (closure anónima, o `fn` con otro nombre) se agrega una función
    /// `name` del mismo arity que reenvía la llamada.
    fn bind_function(&self, name: &str, f: &ScriptFn) -> Result<(AST, FnPtr), CodecError> {
        let compiled = f
            .compiled()
            .ok_or_else(|| ScriptError::NotCompiled(f.source().to_string()))?;
        let ast = compiled.ast();
        let ptr = compiled.ptr();
        let target = ptr.fn_name();

        if target == name {
            return Ok((ast.clone(), ptr.clone()));
        }

        let arity = ast
            .iter_functions()
            .find(|m| m.name == target)
            .map(|m| m.params.len().saturating_sub(ptr.curry().len()))
            .or_else(|| lambda_arity(f.source()))
            .ok_or(ScriptError::NoCallable)?;
        let args = (0..arity)
            .map(|i| format!("a{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        let shim = if is_anonymous(target) {
            // la closure se vuelve a construir dentro del cuerpo
            format!(
                "fn {name}({args}) {{ let f = {{ {} }}; f.call({args}) }}",
                f.source()
            )
        } else {
            format!("fn {name}({args}) {{ {target}({args}) }}")
        };
        debug!("global '{}' ligada con: {}", name, shim);

        let shim = self.compile_ast(&shim)?;
        Ok((ast.merge(&shim), ptr.clone()))
    }
}

// Arity de una closure escrita como `|a, b| ...`
fn lambda_arity(source: &str) -> Option<usize> {
    let rest = source.trim_start().strip_prefix('|')?;
    let params = &rest[..rest.find('|')?];
    Some(params.split(',').filter(|p| !p.trim().is_empty()).count())
}

impl LoadedClosure {
    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn globals(&self) -> &BTreeMap<String, Value> {
        &self.globals
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Value, ScriptError> {
        let mut full_args: Vec<Dynamic> = self.entry.curry().to_vec();
        for arg in args {
            full_args.push(to_dynamic(arg)?);
        }

        let mut this = self.env.clone();
        let mut scope = Scope::new();
        let options = CallFnOptions::new()
            .eval_ast(false)
            .bind_this_ptr(&mut this);

        let out: Dynamic = self
            .engine
            .call_fn_with_options(
                options,
                &mut scope,
                &self.program,
                self.entry.fn_name(),
                full_args,
            )
            .map_err(|e| ScriptError::Eval(e.to_string()))?;

        from_dynamic(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoded_globals(entries: Vec<(&str, Value)>) -> String {
        codec::encode(&Value::map(entries)).unwrap()
    }

    #[test]
    fn funciones_globales_se_llaman_por_nombre() {
        let rt = ScriptRuntime::default();
        let globals = encoded_globals(vec![(
            "double",
            Value::from(ScriptFn::new("fn double(x) { x * 2 }")),
        )]);
        let params = codec::encode(&Value::empty_map()).unwrap();

        let closure = rt
            .load_closure("fn map_fn(x) { double(x) + 1 }", &globals, &params)
            .unwrap();

        let out = closure.call(vec![Value::from(20_i64)]).unwrap();
        assert_eq!(out, Value::from(41_i64));
    }

    #[test]
    fn params_y_datos_globales_quedan_en_this() {
        let rt = ScriptRuntime::default();
        let globals = encoded_globals(vec![("offset", Value::from(100_i64))]);
        let params = codec::encode(&Value::from(json!({"factor": 3}))).unwrap();

        let closure = rt
            .load_closure(
                "fn map_fn(x) { x * this.params.factor + this.offset }",
                &globals,
                &params,
            )
            .unwrap();

        assert_eq!(closure.params(), &Value::from(json!({"factor": 3})));
        assert_eq!(closure.globals()["offset"], Value::from(100_i64));

        let out = closure.call(vec![Value::from(2_i64)]).unwrap();
        assert_eq!(out, Value::from(106_i64));
    }

    #[test]
    fn globals_que_no_son_mapa_se_rechazan() {
        let rt = ScriptRuntime::default();
        let res = rt.load_closure("|x| x", "[1, 2]", "{}");

        assert!(matches!(
            res,
            Err(CodecError::UnexpectedShape { expected: "map", found: "list" })
        ));
    }

    #[test]
    fn closure_global_se_llama_por_su_nombre() {
        let rt = ScriptRuntime::default();
        let globals = encoded_globals(vec![("double", Value::from(ScriptFn::new("|x| x * 2")))]);

        let closure = rt.load_closure("|r| double(r) + 1", &globals, "{}").unwrap();

        let out = closure.call(vec![Value::from(20_i64)]).unwrap();
        assert_eq!(out, Value::from(41_i64));
    }

    #[test]
    fn funcion_con_otro_nombre_se_llama_por_el_binding() {
        let rt = ScriptRuntime::default();
        let globals = encoded_globals(vec![(
            "helper",
            Value::from(ScriptFn::new("fn double(x) { x * 2 }")),
        )]);

        let closure = rt.load_closure("|r| helper(r)", &globals, "{}").unwrap();

        let out = closure.call(vec![Value::from(21_i64)]).unwrap();
        assert_eq!(out, Value::from(42_i64));
    }

    #[test]
    fn closure_global_sin_argumentos() {
        let rt = ScriptRuntime::default();
        let globals = encoded_globals(vec![("base", Value::from(ScriptFn::new("|| 100")))]);

        let closure = rt.load_closure("|r| base() + r", &globals, "{}").unwrap();

        let out = closure.call(vec![Value::from(5_i64)]).unwrap();
        assert_eq!(out, Value::from(105_i64));
    }

    #[test]
    fn arity_de_closures_escritas() {
        assert_eq!(lambda_arity("|a, b| a + b"), Some(2));
        assert_eq!(lambda_arity("  |x| x"), Some(1));
        assert_eq!(lambda_arity("|| 1"), Some(0));
        assert_eq!(lambda_arity("fn f(x) { x }"), None);
    }
}
