//! Mosaic Store - multi-resolution storage for tiled microscopy acquisitions.
//!
//! This binary opens an acquisition written by the library and serves,
//! describes or exports it.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mosaic_store::{
    config::{Cli, Command, DatasetArgs, ExportConfig, InfoConfig, ServeConfig},
    pyramid::PyramidStorage,
    raster::RegionEncoder,
    server::{create_router, RouterConfig},
    store::DirectoryStoreSource,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Info(config) => run_info(config).await,
        Command::Export(config) => run_export(config).await,
    }
}

/// Open the acquisition read-only, logging the reason on failure.
async fn open_pyramid(args: &DatasetArgs) -> Option<PyramidStorage<DirectoryStoreSource>> {
    let source = DirectoryStoreSource::open(args.dataset.clone());
    match PyramidStorage::open(source, args.pyramid_options()).await {
        Ok(pyramid) => Some(pyramid),
        Err(e) => {
            error!(dataset = %args.dataset.display(), error = %e, "Failed to open acquisition");
            None
        }
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.dataset.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(pyramid) = open_pyramid(&config.dataset).await else {
        return ExitCode::FAILURE;
    };

    info!("Configuration:");
    info!("  Dataset: {}", config.dataset.dataset.display());
    info!(
        "  Levels: {} ({}x{} tiles)",
        pyramid.num_res_levels(),
        pyramid.geometry().tile_width,
        pyramid.geometry().tile_height
    );
    info!(
        "  Cache: {}MB regions, max region {}px",
        config.cache_regions / (1024 * 1024),
        config.max_region_size
    );

    let router = create_router(Arc::new(pyramid), build_router_config(&config));
    let addr = config.bind_address();

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/info", addr);
    info!("  curl -o region.jpg http://{}/region/0/0/0/512/512.jpg", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Build RouterConfig from the ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_cache_capacity(config.cache_regions)
        .with_max_region_size(config.max_region_size)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> ExitCode {
    if config.dataset.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(pyramid) = open_pyramid(&config.dataset).await else {
        eprintln!("Error: cannot open {}", config.dataset.dataset.display());
        return ExitCode::FAILURE;
    };

    let extent = pyramid.grid_extent().await;
    let json = serde_json::json!({
        "summary": pyramid.summary(),
        "levels": pyramid.num_res_levels(),
        "tiles": pyramid.tile_keys().await.map(|keys| keys.len()).unwrap_or(0),
        "grid": extent.map(|e| serde_json::json!({
            "min_row": e.min_row,
            "max_row": e.max_row,
            "min_col": e.min_col,
            "max_col": e.max_col,
        })),
        "dataset_size": pyramid.dataset_size().await,
    });

    match serde_json::to_string_pretty(&json) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Export Command
// =============================================================================

async fn run_export(config: ExportConfig) -> ExitCode {
    init_logging(config.dataset.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(pyramid) = open_pyramid(&config.dataset).await else {
        return ExitCode::FAILURE;
    };

    if config.level >= pyramid.num_res_levels() {
        error!(
            "Level {} does not exist (acquisition has {} levels)",
            config.level,
            pyramid.num_res_levels()
        );
        return ExitCode::FAILURE;
    }

    let region = match pyramid
        .read_region(
            config.channel,
            config.slice,
            config.frame,
            config.level,
            config.x,
            config.y,
            config.width,
            config.height,
        )
        .await
    {
        Ok(region) => region,
        Err(e) => {
            error!("Failed to read region: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let jpeg = match RegionEncoder::new().encode(&region, config.quality) {
        Ok(jpeg) => jpeg,
        Err(e) => {
            error!("Failed to encode region: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::write(&config.output, &jpeg).await {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        output = %config.output.display(),
        bytes = jpeg.len(),
        "Exported {}x{} region at level {}",
        config.width,
        config.height,
        config.level
    );
    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mosaic_store=debug,tower_http=debug"
    } else {
        "mosaic_store=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
