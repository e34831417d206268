// Módulos de la aplicación
mod api;
mod app_state;
mod awards;
mod chunk_id;
mod chunker;
mod config;
mod context;
mod error;
mod extract;
mod ingest;
mod llm;
mod models;
mod neo4j_client;
mod prompt;
mod rag;
mod vector_store;

#[cfg(test)]
mod testing;

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    app_state::{AppState, Services, Status},
    config::AppConfig,
};

#[derive(Parser)]
#[command(name = "cv-award-matcher")]
#[command(about = "Empareja convocatorias de premios con CVs de profesorado mediante RAG", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Arranca el servidor HTTP (por defecto)
    Serve,
    /// Indexa los CVs de un directorio
    Ingest {
        /// Directorio de CVs (por defecto CV_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Evalúa qué profesores encajan con una convocatoria
    Match {
        /// Nombre del fichero de la convocatoria dentro de AWARDS_DIR
        #[arg(long, conflicts_with = "award_text", required_unless_present = "award_text")]
        award_file: Option<String>,

        /// Texto de la convocatoria
        #[arg(long)]
        award_text: Option<String>,

        /// Número de fragmentos a recuperar (por defecto TOP_K_CHUNKS)
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Muestra las estadísticas del índice
    Stats,
    /// Lista las convocatorias disponibles
    Awards,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 2. Cargar y validar configuración antes de cualquier trabajo
    let mut cfg = AppConfig::from_env()?;
    let command = cli.command.unwrap_or(Commands::Serve);

    if let Commands::Awards = command {
        for award in awards::list_awards(&cfg.awards_dir)? {
            println!("{}", award.name);
        }
        return Ok(());
    }

    match &command {
        Commands::Ingest { dir: Some(dir) } => {
            cfg.cv_dir = dir.clone();
            cfg.validate_for_ingest()?;
        }
        Commands::Ingest { dir: None } => cfg.validate_for_ingest()?,
        _ => cfg.validate()?,
    }

    // 3. Conectar con el índice, embeddings y LLM
    let services = Services::from_config(&cfg).await?;

    match command {
        Commands::Ingest { .. } => {
            let summary =
                ingest::ingest_directory(&services, &cfg.pipeline, &cfg.cv_dir, Status::shared())
                    .await?;
            println!("{summary}");
            for report in &summary.per_source {
                println!("  - {}: {:?}", report.source_id, report.outcome);
            }
        }
        Commands::Match {
            award_file,
            award_text,
            top_k,
        } => {
            let award_text = match (award_text, award_file) {
                (Some(text), _) => text,
                (None, Some(name)) => awards::load_award(&cfg.awards_dir, &name)?,
                (None, None) => return Err(anyhow!("Indique --award-file o --award-text")),
            };
            let template = prompt::load_template(&cfg.prompt_template)?;
            let outcome = rag::match_award(
                &services,
                &cfg.pipeline.namespace,
                &template,
                &award_text,
                top_k.unwrap_or(cfg.pipeline.top_k),
            )
            .await?;
            info!("Candidatos evaluados: {:?}", outcome.candidates);
            println!("{}", outcome.evaluation);
        }
        Commands::Stats => {
            let stats = services.index.stats(&cfg.pipeline.namespace).await?;
            println!(
                "Vectores totales: {}\nEspacio de nombres '{}': {}",
                stats.total_records, cfg.pipeline.namespace, stats.namespace_records
            );
        }
        Commands::Serve => serve(cfg, services).await?,
        // Resuelto antes de conectar.
        Commands::Awards => {}
    }

    Ok(())
}

async fn serve(cfg: AppConfig, services: Services) -> Result<()> {
    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let app_state = AppState {
        config: cfg,
        services,
        status: Status::shared(),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr).await?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
