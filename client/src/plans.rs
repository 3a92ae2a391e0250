use common::{
    GraphError, Host, JobId, MapTableOptions, ReduceOptions, ScriptFn, Session, StreamOptions,
    Value,
};
use tracing::info;

/* --------- funciones de script que usan los planes --------- */

// Parte una línea en palabras en minúscula, descartando las vacías
const TOKENIZE: &str = r#"
fn tokenize(line) {
    let words = [];
    for w in line.to_lower().split(" ") {
        // trim modifica el string en el lugar
        w.trim();
        if w != "" { words.push(w); }
    }
    words
}
"#;

// Una fila {line} -> lista de pares {key, value}; usa this.params.min_len
const WORDCOUNT_MAP: &str = r#"
|row| {
    let out = [];
    for w in tokenize(row.line) {
        if w.len() >= this.params.min_len { out.push(#{ key: w, value: 1 }); }
    }
    out
}
"#;

const SUM_REDUCE: &str = "|key, values| values.reduce(|acc, v| acc + v, 0)";

const SELECT_MAP: &str = r#"
|row| {
    let out = [];
    for c in this.params.columns { out.push(row[c]); }
    #{ key: row[this.params.key], value: out }
}
"#;

const FIRST_REDUCE: &str = "|key, values| values[0]";

const JSON_SERIALIZE: &str = "|record| record.to_json()";

/// Conteo de palabras sobre un stream: por cada partición de la tabla,
/// map (tokenizar) + reduce (sumar), guardado en esa partición.
#[derive(Debug, Clone)]
pub struct WordcountPlan {
    pub table: String,
    pub from: u64,
    pub until: u64,
    pub shards: u32,
    pub min_len: u64,
}

impl WordcountPlan {
    pub fn run<H: Host>(&self, s: &mut Session<H>) -> Result<Vec<JobId>, GraphError> {
        s.define("tokenize", ScriptFn::new(TOKENIZE));

        let plan = self.clone();
        let roots = s.process_stream(
            StreamOptions::new(self.table.clone(), self.from, self.until),
            move |s, begin, limit| {
                let words = s.map_table(
                    MapTableOptions::new(plan.table.clone(), begin, limit, ScriptFn::new(WORDCOUNT_MAP))
                        .params(Value::map([("min_len", plan.min_len)]))
                        .required_columns(["line"]),
                )?;
                let counts = s.reduce(
                    ReduceOptions::new(vec![words], ScriptFn::new(SUM_REDUCE)).shards(plan.shards),
                )?;
                Ok(Value::from(vec![counts]))
            },
        )?;

        info!("wordcount sobre {}: {} grafos enviados", self.table, roots.len());
        s.write_output(format!(
            "wordcount {} [{}, {}): {} particiones",
            self.table,
            self.from,
            self.until,
            roots.len()
        ))?;
        Ok(roots)
    }
}

/// Descarga: selecciona columnas de un rango, deja una fila por clave
/// y devuelve los resultados serializados como JSON.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub table: String,
    pub from: u64,
    pub until: u64,
    pub key: String,
    pub columns: Vec<String>,
}

impl DownloadPlan {
    pub fn run<H: Host>(&self, s: &mut Session<H>) -> Result<JobId, GraphError> {
        let mut required = vec![self.key.clone()];
        required.extend(self.columns.iter().cloned());

        let params = Value::map([
            ("key", Value::from(self.key.as_str())),
            ("columns", Value::from(self.columns.clone())),
        ]);

        let selected = s.map_table(
            MapTableOptions::new(self.table.clone(), self.from, self.until, ScriptFn::new(SELECT_MAP))
                .params(params)
                .required_columns(required),
        )?;
        let unique = s.reduce(ReduceOptions::new(vec![selected], ScriptFn::new(FIRST_REDUCE)))?;

        s.log([
            format!("download de {}", self.table),
            format!("clave {}", self.key),
        ]);
        s.download_results(vec![unique], Some(ScriptFn::new(JSON_SERIALIZE)))
    }
}
