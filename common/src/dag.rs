use std::collections::HashSet;

use crate::error::{GraphError, Result};
use crate::job::{Job, JobId, JobTable};

/// Calcula la clausura de dependencias de `root`.
///
/// Recorre en profundidad siguiendo el orden de cada lista `sources`. El
/// resultado empieza por la raíz y contiene cada id una sola vez; no es un
/// orden topológico. Un id que no está en la tabla da `UnknownJobReference`
/// y un id que vuelve a aparecer en el camino actual da `DependencyCycle`.
pub fn resolve(root: &Job, table: &JobTable) -> Result<Vec<Job>> {
    let mut order = vec![root.clone()];
    let mut seen: HashSet<JobId> = HashSet::from([root.id.clone()]);
    // ids en el camino desde la raíz hasta el job que se está visitando
    let mut on_path: HashSet<&str> = HashSet::from([root.id.as_str()]);
    // pila explícita: (job, índice de la próxima fuente a mirar)
    let mut stack: Vec<(&Job, usize)> = vec![(root, 0)];

    while let Some(top) = stack.last_mut() {
        let job = top.0;
        let next = top.1;
        top.1 += 1;

        let Some(source_id) = job.sources().get(next) else {
            on_path.remove(job.id.as_str());
            stack.pop();
            continue;
        };

        if on_path.contains(source_id.as_str()) {
            return Err(GraphError::DependencyCycle(source_id.clone()));
        }
        if seen.contains(source_id) {
            continue;
        }

        let source = table
            .get(source_id)
            .ok_or_else(|| GraphError::UnknownJobReference(source_id.clone()))?;

        seen.insert(source_id.clone());
        order.push(source.clone());
        on_path.insert(source.id.as_str());
        stack.push((source, 0));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;

    fn reduce(id: &str, sources: &[&str]) -> Job {
        Job {
            id: id.to_string(),
            kind: JobKind::Reduce {
                sources: sources.iter().map(|s| s.to_string()).collect(),
                num_shards: None,
                reduce_fn: "|k, vs| vs".to_string(),
                globals: "{}".to_string(),
                params: "{}".to_string(),
            },
        }
    }

    fn map(id: &str) -> Job {
        Job {
            id: id.to_string(),
            kind: JobKind::MapTable {
                table_name: "clicks".to_string(),
                from: 0,
                until: 10,
                map_fn: "|r| r".to_string(),
                globals: "{}".to_string(),
                params: "{}".to_string(),
                required_columns: None,
            },
        }
    }

    fn save(id: &str, sources: &[&str]) -> Job {
        Job {
            id: id.to_string(),
            kind: JobKind::SaveToTable {
                table_name: "out".to_string(),
                sources: sources.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    fn table(jobs: Vec<Job>) -> JobTable {
        let mut t = JobTable::default();
        for j in jobs {
            t.insert(j);
        }
        t
    }

    fn ids(jobs: &[Job]) -> Vec<&str> {
        jobs.iter().map(|j| j.id.as_str()).collect()
    }

    #[test]
    fn raiz_sin_sources_es_singleton() {
        let root = save("job-1", &[]);
        let t = table(vec![root.clone()]);

        let out = resolve(&root, &t).unwrap();
        assert_eq!(ids(&out), vec!["job-1"]);
    }

    #[test]
    fn diamante_incluye_cada_job_una_vez() {
        //        job-1
        //       /     \
        //   job-2     job-3
        //       \     /
        //        job-4 (raíz)
        let root = save("job-4", &["job-2", "job-3"]);
        let t = table(vec![
            map("job-1"),
            reduce("job-2", &["job-1"]),
            reduce("job-3", &["job-1"]),
            root.clone(),
        ]);

        let out = resolve(&root, &t).unwrap();
        assert_eq!(ids(&out), vec!["job-4", "job-2", "job-1", "job-3"]);
    }

    #[test]
    fn orden_en_profundidad_segun_sources() {
        let root = save("job-5", &["job-4", "job-1"]);
        let t = table(vec![
            map("job-1"),
            map("job-2"),
            reduce("job-3", &["job-2"]),
            reduce("job-4", &["job-3", "job-1"]),
            root.clone(),
        ]);

        let out = resolve(&root, &t).unwrap();
        assert_eq!(ids(&out), vec!["job-5", "job-4", "job-3", "job-2", "job-1"]);
    }

    #[test]
    fn referencia_desconocida_falla() {
        let root = save("job-2", &["job-1", "job-99"]);
        let t = table(vec![map("job-1"), root.clone()]);

        match resolve(&root, &t) {
            Err(GraphError::UnknownJobReference(id)) => assert_eq!(id, "job-99"),
            other => panic!("se esperaba UnknownJobReference, llegó {:?}", other),
        }
    }

    #[test]
    fn ciclo_se_rechaza() {
        let root = save("job-3", &["job-1"]);
        let t = table(vec![
            reduce("job-1", &["job-2"]),
            reduce("job-2", &["job-1"]),
            root.clone(),
        ]);

        assert!(matches!(
            resolve(&root, &t),
            Err(GraphError::DependencyCycle(id)) if id == "job-1"
        ));
    }

    #[test]
    fn autorreferencia_se_rechaza() {
        let root = save("job-2", &["job-1"]);
        let t = table(vec![reduce("job-1", &["job-1"]), root.clone()]);

        assert!(matches!(
            resolve(&root, &t),
            Err(GraphError::DependencyCycle(_))
        ));
    }

    #[test]
    fn cadena_larga_no_desborda_la_pila() {
        let mut jobs = vec![map("job-0")];
        for i in 1..50_000 {
            let prev = format!("job-{}", i - 1);
            jobs.push(reduce(&format!("job-{i}"), &[prev.as_str()]));
        }
        let root = save("job-50000", &["job-49999"]);
        jobs.push(root.clone());
        let t = table(jobs);

        let out = resolve(&root, &t).unwrap();
        assert_eq!(out.len(), 50_001);
        assert_eq!(out[1].id, "job-49999");
        assert_eq!(out.last().map(|j| j.id.as_str()), Some("job-0"));
    }
}
