use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use clap::{Parser, Subcommand};
use liverseg::api::handlers::WsBroker;
use liverseg::api::{configure_routes, AppState};
use liverseg::banner;
use liverseg::classifier::ResponseClassifier;
use liverseg::client::{HttpSegmentationClient, SegmentationApi};
use liverseg::codec::DirectorySink;
use liverseg::config::AppConfig;
use liverseg::models::Modality;
use liverseg::runner::{self, SegmentJob};
use liverseg::session::SessionState;
use rust_embed::RustEmbed;
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(RustEmbed)]
#[folder = "static/"]
struct StaticAssets;

#[derive(Parser)]
#[command(name = "liverseg", version, about = "Client for the liver segmentation service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the local segmentation page (default)
    Serve,
    /// Segment NIfTI volumes from the command line, one session per file
    Segment {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// MRI modality of the volumes (T1 or T2)
        #[arg(long, default_value = "T1")]
        modality: Modality,
        /// Slice to render the overlay for; the service picks one when omitted
        #[arg(long)]
        slice: Option<u32>,
        /// Print the full medical report
        #[arg(long)]
        report: bool,
        /// Save the segmentation mask
        #[arg(long)]
        download: bool,
        /// Directory for saved masks, defaults to the configured download directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Probe the segmentation service
    Health,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let dotenv = dotenvy::dotenv();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    if let Err(e) = dotenv {
        log::debug!("No .env file loaded: {}", e);
    }

    let config = AppConfig::from_env().map_err(std::io::Error::other)?;
    let classifier = ResponseClassifier::new(config.diagnostic_rules().map_err(std::io::Error::other)?);
    let api: Arc<dyn SegmentationApi> = Arc::new(HttpSegmentationClient::with_classifier(
        reqwest::Client::new(),
        config.service.clone(),
        classifier,
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, api).await,
        Command::Segment { files, modality, slice, report, download, out_dir } => {
            let sink = DirectorySink::new(out_dir.unwrap_or_else(|| config.download_dir()));
            let jobs: Vec<SegmentJob> = files
                .into_iter()
                .map(|path| SegmentJob {
                    path,
                    modality,
                    slice_index: slice,
                    reveal_report: report,
                    download,
                })
                .collect();
            segment(api, jobs, sink).await
        }
        Command::Health => health(api).await,
    }
}

async fn serve(config: AppConfig, api: Arc<dyn SegmentationApi>) -> std::io::Result<()> {
    banner::print_banner();

    let host = config.server.host.clone();
    let port = config.server.port;
    let upload_limit = config.server.max_upload_bytes();
    let state = AppState::new(config, api);
    let broker = WsBroker::new();

    println!("🚀 Starting server...");
    println!("📊 Frontend available at http://{}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(broker.clone()))
            .app_data(web::PayloadConfig::new(upload_limit))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
            .route("/{_:.*}", web::get().to(static_file_handler))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

async fn segment(api: Arc<dyn SegmentationApi>, jobs: Vec<SegmentJob>, sink: DirectorySink) -> std::io::Result<()> {
    let results = runner::run_batch(api, &jobs, &sink).await;

    let mut failed = 0;
    for (job, result) in jobs.iter().zip(results) {
        match result {
            Ok(report) => {
                if report.view.state != SessionState::Succeeded {
                    failed += 1;
                }
                runner::print_report(&report);
            }
            Err(e) => {
                failed += 1;
                eprintln!("❌ {}: {}", job.path.display(), e);
            }
        }
    }

    if failed > 0 {
        return Err(std::io::Error::other(format!(
            "{} of {} volumes failed",
            failed,
            jobs.len()
        )));
    }
    Ok(())
}

async fn health(api: Arc<dyn SegmentationApi>) -> std::io::Result<()> {
    let health = api.health().await.map_err(std::io::Error::other)?;
    println!("✅ Segmentation service {} on {}", health.status, health.device);
    for modality in [Modality::T1, Modality::T2] {
        let loaded = if health.model_loaded(modality) { "loaded" } else { "not loaded" };
        println!("   {} model: {}", modality, loaded);
    }
    Ok(())
}

async fn static_file_handler(req: HttpRequest) -> impl Responder {
    let path = if req.path() == "/" {
        "index.html"
    } else {
        // trim leading '/'
        &req.path()[1..]
    };

    match StaticAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            HttpResponse::Ok().content_type(mime.as_ref()).body(Cow::into_owned(content.data))
        }
        None => HttpResponse::NotFound().body("404 Not Found"),
    }
}
