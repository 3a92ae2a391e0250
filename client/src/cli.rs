use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{GraphInfo, Host, MemoryHost, Session, WindowCatalog};

use crate::host::HttpHost;
use crate::plans::{DownloadPlan, WordcountPlan};

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Arma grafos de jobs y se los envía al master")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Conteo de palabras partición por partición (stream)
    Wordcount {
        #[arg(value_name = "TABLA")]
        table: String,
        #[arg(long)]
        from: u64,
        #[arg(long)]
        until: u64,
        #[arg(long, default_value_t = 4)]
        shards: u32,
        /// Largo mínimo de palabra a contar
        #[arg(long, default_value_t = 1)]
        min_len: u64,
        /// No contacta al master: imprime los grafos que se enviarían
        #[arg(long)]
        dry_run: bool,
    },
    /// Selecciona columnas de un rango y devuelve una fila por clave
    Download {
        #[arg(value_name = "TABLA")]
        table: String,
        #[arg(long)]
        from: u64,
        #[arg(long)]
        until: u64,
        #[arg(long)]
        key: String,
        /// Columnas a devolver, separadas por coma
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Lista las particiones de una tabla en [from, until)
    Partitions {
        #[arg(value_name = "TABLA")]
        table: String,
        #[arg(long)]
        from: u64,
        #[arg(long)]
        until: u64,
    },
    /// Lista los grafos recibidos por el master
    Graphs,
    /// Detalle de un grafo
    Graph {
        #[arg(value_name = "GRAPH_ID")]
        id: String,
    },
    /// Líneas escritas al canal de resultados
    Output,
    /// Escribe una línea en el canal de resultados
    Write {
        #[arg(value_name = "TEXTO")]
        text: String,
    },
}

/// Host en memoria para `--dry-run`: las particiones salen del catálogo local.
fn dry_run_host() -> MemoryHost {
    MemoryHost::with_catalog(WindowCatalog::from_env())
}

fn print_submissions(host: &MemoryHost) -> Result<()> {
    let subs = host.submissions();
    println!("{} grafos (dry-run):", subs.len());
    for sub in subs {
        println!("raíz {}:", sub.root_job_id);
        let jobs = sub.decode_jobs()?;
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    }
    for line in host.outputs() {
        println!("salida: {}", line);
    }
    Ok(())
}

fn print_graph(g: &GraphInfo) {
    println!("Grafo {}", g.id);
    println!("  raíz         : {}", g.root_job_id);
    println!("  op raíz      : {}", g.root_op.as_deref().unwrap_or("-"));
    println!("  estado       : {:?}", g.status);
    println!("  jobs         : {}", g.jobs.len());
    println!("  submitted_at : {}", g.submitted_at);
    if let Some(ref err) = g.error {
        println!("  error        : {}", err);
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Wordcount {
            table,
            from,
            until,
            shards,
            min_len,
            dry_run,
        } => {
            let plan = WordcountPlan {
                table,
                from,
                until,
                shards,
                min_len,
            };

            if dry_run {
                let host = dry_run_host();
                plan.run(&mut Session::new(host.clone()))?;
                print_submissions(&host)?;
            } else {
                let roots = plan.run(&mut Session::new(HttpHost::from_env()?))?;
                println!("Grafos enviados: {}", roots.len());
                for root in roots {
                    println!("  - {}", root);
                }
            }
        }

        Commands::Download {
            table,
            from,
            until,
            key,
            columns,
            dry_run,
        } => {
            let plan = DownloadPlan {
                table,
                from,
                until,
                key,
                columns,
            };

            if dry_run {
                let host = dry_run_host();
                plan.run(&mut Session::new(host.clone()))?;
                print_submissions(&host)?;
            } else {
                let root = plan.run(&mut Session::new(HttpHost::from_env()?))?;
                println!("Grafo enviado, raíz {}", root);
            }
        }

        Commands::Partitions { table, from, until } => {
            let host = HttpHost::from_env()?;
            let parts = host.list_partitions(&table, &from.to_string(), &until.to_string())?;
            if parts.is_empty() {
                println!("No hay particiones de {} en [{}, {}).", table, from, until);
            }
            for p in parts {
                println!("{}  [{}, {})", p.partition_key, p.time_begin, p.time_limit);
            }
        }

        Commands::Graphs => {
            let graphs = HttpHost::from_env()?.graphs()?;
            if graphs.is_empty() {
                println!("El master no recibió grafos.");
            }
            for g in graphs {
                print_graph(&g);
                println!();
            }
        }

        Commands::Graph { id } => match HttpHost::from_env()?.graph(&id)? {
            Some(g) => {
                print_graph(&g);
                for job in &g.jobs {
                    println!("    - {} ({}) <- {:?}", job.id, job.op(), job.sources());
                }
            }
            None => println!("No se encontró el grafo con id {id}"),
        },

        Commands::Output => {
            for line in HttpHost::from_env()?.output_lines()? {
                println!("{}", line);
            }
        }

        Commands::Write { text } => {
            HttpHost::from_env()?.write_output(&text)?;
            println!("Escrito.");
        }
    }

    Ok(())
}
