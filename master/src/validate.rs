use std::collections::HashSet;

use anyhow::{anyhow, bail, Context, Result};
use common::{ExecuteGraphRequest, Job, JobKind, ScriptRuntime};

/// Valida un grafo recibido antes de aceptarlo:
/// 1. la lista de jobs parsea
/// 2. el primer job es la raíz anunciada y es terminal
/// 3. no hay ids repetidos y toda fuente está dentro del grafo
/// 4. cada closure (función + globals + params) se reconstruye en el sandbox
pub fn check_graph(runtime: &ScriptRuntime, req: &ExecuteGraphRequest) -> Result<Vec<Job>> {
    let jobs: Vec<Job> = serde_json::from_str(&req.jobs).context("lista de jobs inválida")?;

    let root = jobs.first().ok_or_else(|| anyhow!("grafo vacío"))?;
    if root.id != req.root_job_id {
        bail!(
            "el primer job ({}) no es la raíz anunciada ({})",
            root.id,
            req.root_job_id
        );
    }
    if !root.is_terminal() {
        bail!("la raíz {} no es un job terminal ({})", root.id, root.op());
    }

    let mut ids = HashSet::new();
    for job in &jobs {
        if !ids.insert(job.id.as_str()) {
            bail!("job repetido en el grafo: {}", job.id);
        }
    }

    for job in &jobs {
        for source in job.sources() {
            if !ids.contains(source.as_str()) {
                bail!("el job {} referencia a {}, que no está en el grafo", job.id, source);
            }
        }
        check_closures(runtime, job).with_context(|| format!("job {}", job.id))?;
    }

    Ok(jobs)
}

fn check_closures(runtime: &ScriptRuntime, job: &Job) -> Result<()> {
    match &job.kind {
        JobKind::MapTable {
            map_fn,
            globals,
            params,
            ..
        } => {
            runtime.load_closure(map_fn, globals, params)?;
        }
        JobKind::Reduce {
            reduce_fn,
            globals,
            params,
            ..
        } => {
            runtime.load_closure(reduce_fn, globals, params)?;
        }
        JobKind::ReturnResults { serialize_fn, .. } if !serialize_fn.is_empty() => {
            runtime.compile(serialize_fn)?;
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{
        MapTableOptions, MemoryHost, ReduceOptions, SaveToTableOptions, ScriptFn, Session,
    };

    fn submitted(build: impl FnOnce(&mut Session<MemoryHost>)) -> ExecuteGraphRequest {
        let host = MemoryHost::new();
        let mut s = Session::new(host.clone());
        build(&mut s);

        let sub = host.submissions().pop().unwrap();
        ExecuteGraphRequest {
            jobs: sub.jobs,
            root_job_id: sub.root_job_id,
        }
    }

    #[test]
    fn grafo_bien_formado_pasa() {
        let req = submitted(|s| {
            s.define("double", ScriptFn::new("fn double(x) { x * 2 }"));
            let m = s
                .map_table(MapTableOptions::new("clicks", 0, 10, ScriptFn::new("|r| double(r)")))
                .unwrap();
            let r = s
                .reduce(ReduceOptions::new(vec![m], ScriptFn::new("|k, vs| vs.len()")))
                .unwrap();
            s.save_to_table(SaveToTableOptions::new("out", vec![r])).unwrap();
        });

        let jobs = check_graph(&ScriptRuntime::default(), &req).unwrap();
        assert_eq!(jobs.len(), 3);
    }

    #[test]
    fn closure_que_no_compila_se_rechaza() {
        let req = submitted(|s| {
            let m = s
                .map_table(MapTableOptions::new("clicks", 0, 10, ScriptFn::new("|r| r +")))
                .unwrap();
            s.save_to_table(SaveToTableOptions::new("out", vec![m])).unwrap();
        });

        let err = check_graph(&ScriptRuntime::default(), &req).unwrap_err();
        assert!(format!("{:#}", err).contains("job-1"));
    }

    #[test]
    fn raiz_distinta_a_la_anunciada_se_rechaza() {
        let mut req = submitted(|s| {
            s.save_to_table(SaveToTableOptions::new("out", vec![])).unwrap();
        });
        req.root_job_id = "job-7".to_string();

        assert!(check_graph(&ScriptRuntime::default(), &req).is_err());
    }

    #[test]
    fn fuente_fuera_del_grafo_se_rechaza() {
        let req = ExecuteGraphRequest {
            jobs: r#"[{"id": "job-2", "op": "save_to_table", "table_name": "out", "sources": ["job-1"]}]"#
                .to_string(),
            root_job_id: "job-2".to_string(),
        };

        let err = check_graph(&ScriptRuntime::default(), &req).unwrap_err();
        assert!(err.to_string().contains("job-1"));
    }
}
