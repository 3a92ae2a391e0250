use thiserror::Error;

use crate::script::{ScriptError, ScriptRuntime};
use crate::value::{ScriptFn, Value};

/// Prefijo que marca un string como código de función y no como dato.
pub const FN_SENTINEL: &str = "\u{8}\u{8}FN<1337Z12323<\u{8}\u{8}";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON inválido: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no se pudo reconstruir la función: {0}")]
    Script(#[from] ScriptError),

    #[error("se esperaba {expected} y llegó {found}")]
    UnexpectedShape {
        expected: &'static str,
        found: &'static str,
    },
}

/// Codifica un valor a texto.
///
/// - función en la raíz: `FN_SENTINEL` + fuente (sin JSON alrededor)
/// - cualquier otra cosa: JSON, donde cada función anidada pasa a ser
///   un string `FN_SENTINEL` + fuente
pub fn encode(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Function(f) => Ok(tag_function(f)),
        other => Ok(serde_json::to_string(&to_json(other))?),
    }
}

/// Inverso de `encode`. Cada función se compila en `runtime`; si el fuente no
/// compila el error sale como `CodecError::Script`.
pub fn decode(text: &str, runtime: &ScriptRuntime) -> Result<Value, CodecError> {
    if let Some(source) = text.strip_prefix(FN_SENTINEL) {
        return Ok(Value::Function(runtime.compile(source)?));
    }

    let json: serde_json::Value = serde_json::from_str(text)?;
    from_json(json, runtime)
}

fn tag_function(f: &ScriptFn) -> String {
    format!("{}{}", FN_SENTINEL, f.source())
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
        Value::Function(f) => serde_json::Value::String(tag_function(f)),
    }
}

fn from_json(json: serde_json::Value, runtime: &ScriptRuntime) -> Result<Value, CodecError> {
    Ok(match json {
        serde_json::Value::String(s) => match s.strip_prefix(FN_SENTINEL) {
            Some(source) => Value::Function(runtime.compile(source)?),
            None => Value::Text(s),
        },
        serde_json::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(|v| from_json(v, runtime))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        serde_json::Value::Object(obj) => {
            let mut out = std::collections::BTreeMap::new();
            for (k, v) in obj {
                out.insert(k, from_json(v, runtime)?);
            }
            Value::Map(out)
        }
        scalar => Value::from(scalar),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn datos_planos_ida_y_vuelta() {
        let rt = ScriptRuntime::default();
        let original = Value::from(json!({
            "name": "clicks",
            "threshold": 0.25,
            "limit": -3,
            "enabled": true,
            "tags": ["a", "b", {"nested": null}]
        }));

        let text = encode(&original).unwrap();
        assert_eq!(decode(&text, &rt).unwrap(), original);
    }

    #[test]
    fn escalares_sueltos_ida_y_vuelta() {
        let rt = ScriptRuntime::default();

        for v in [Value::from("texto"), Value::from(7_i64), Value::Bool(false), Value::Null] {
            let text = encode(&v).unwrap();
            assert_eq!(decode(&text, &rt).unwrap(), v);
        }
    }

    #[test]
    fn funcion_en_la_raiz_no_va_como_json() {
        let f = ScriptFn::new("|x| x * 2");
        let text = encode(&Value::from(f)).unwrap();

        assert_eq!(text, format!("{}|x| x * 2", FN_SENTINEL));
    }

    #[test]
    fn funcion_decodificada_se_comporta_igual() {
        let rt = ScriptRuntime::default();
        let text = encode(&Value::from(ScriptFn::new("|a, b| a * b + 1"))).unwrap();

        let decoded = decode(&text, &rt).unwrap();
        let f = decoded.as_function().unwrap();

        assert!(f.is_compiled());
        assert_eq!(
            f.call(vec![Value::from(6_i64), Value::from(7_i64)]).unwrap(),
            Value::from(43_i64)
        );
    }

    #[test]
    fn mapa_mezcla_datos_y_funciones() {
        let rt = ScriptRuntime::default();
        let original = Value::map([
            ("limit", Value::from(10_i64)),
            ("double", Value::from(ScriptFn::new("fn double(x) { x * 2 }"))),
        ]);

        let text = encode(&original).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw["limit"], json!(10));
        assert!(raw["double"].as_str().unwrap().starts_with(FN_SENTINEL));

        let decoded = decode(&text, &rt).unwrap();
        assert_eq!(decoded, original);

        let double = decoded.as_map().unwrap()["double"].as_function().unwrap();
        assert_eq!(
            double.call(vec![Value::from(21_i64)]).unwrap(),
            Value::from(42_i64)
        );
    }

    #[test]
    fn fuente_invalida_es_error_de_script() {
        let rt = ScriptRuntime::default();
        let text = format!("{}|x| x +", FN_SENTINEL);

        assert!(matches!(decode(&text, &rt), Err(CodecError::Script(_))));
    }

    #[test]
    fn json_invalido_es_error_json() {
        let rt = ScriptRuntime::default();
        assert!(matches!(decode("{no json", &rt), Err(CodecError::Json(_))));
    }
}
