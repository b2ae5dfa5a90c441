use anyhow::Context;
use clap::{Parser, ValueEnum};
use sar_ship_etl::config::toml_config::TomlConfig;
use sar_ship_etl::core::{DatasetConfigProvider, MaskConfigProvider};
use sar_ship_etl::utils::{logger, validation::Validate};
use sar_ship_etl::{CocoPipeline, EtlEngine, EtlError, LocalStorage, MaskPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PipelineKind {
    Coco,
    Mask,
}

#[derive(Parser)]
#[command(name = "toml-etl")]
#[command(about = "Run the dataset or mask pipeline from a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "etl-config.toml")]
    config: String,

    /// Which configured section to run; inferred when only one is present
    #[arg(long, value_enum)]
    pipeline: Option<PipelineKind>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = TomlConfig::from_file(&args.config)
        .with_context(|| format!("failed to load config file '{}'", args.config))?;

    logger::init_logger(config.log_format(), args.verbose);
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.severity().exit_code());
    }

    let kind = match (args.pipeline, &config.dataset, &config.mask) {
        (Some(kind), _, _) => kind,
        (None, Some(_), None) => PipelineKind::Coco,
        (None, None, Some(_)) => PipelineKind::Mask,
        _ => anyhow::bail!("both [dataset] and [mask] are configured; pass --pipeline coco|mask"),
    };

    display_config_summary(&config, kind)?;

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let outcome = match kind {
        PipelineKind::Coco => run_dataset(&config, args.dry_run, monitor_enabled).await,
        PipelineKind::Mask => run_mask(&config, args.dry_run, monitor_enabled).await,
    };

    match outcome {
        Ok(Some(output_path)) => {
            tracing::info!("✅ ETL process completed successfully!");
            println!("✅ ETL process completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(
                "❌ ETL process failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
            std::process::exit(e.severity().exit_code());
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, kind: PipelineKind) -> anyhow::Result<()> {
    println!("📋 Pipeline: {} v{}", config.pipeline.name, config.pipeline.version);
    println!("   {}", config.pipeline.description);

    match kind {
        PipelineKind::Coco => {
            let dataset = config.dataset()?;
            println!("   Source: {}", dataset.source_dir());
            println!("   Export: {}", dataset.export_dir());
            println!("   Classes: {}", dataset.classes().join(", "));
            println!(
                "   Split: seed {}, holdout {}, test share {}",
                dataset.seed(),
                dataset.holdout_fraction(),
                dataset.test_fraction()
            );
        }
        PipelineKind::Mask => {
            let mask = config.mask()?;
            println!("   Image: {}", mask.image_path());
            println!("   AOI: {}", mask.aoi_path());
            println!("   Output: {}", mask.export_path());
            println!("   Target: {}", mask.mask_target());
            match mask.coastline_file() {
                Some(path) => println!("   Coastline: {}", path),
                None => println!("   Coastline: {}", mask.overpass_url()),
            }
        }
    }
    Ok(())
}

async fn run_dataset(
    config: &TomlConfig,
    dry_run: bool,
    monitor: bool,
) -> Result<Option<String>, EtlError> {
    let dataset = config.dataset()?.clone();
    let source = LocalStorage::new(dataset.source_dir.clone());
    let export = LocalStorage::new(dataset.export_dir.clone());
    let pipeline = CocoPipeline::new(source, export, dataset);

    if dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be written");
        let preview = pipeline.preview().await?;
        print!("{}", preview);
        return Ok(None);
    }

    EtlEngine::new_with_monitoring(pipeline, monitor)
        .run()
        .await
        .map(Some)
}

async fn run_mask(
    config: &TomlConfig,
    dry_run: bool,
    monitor: bool,
) -> Result<Option<String>, EtlError> {
    let mask = config.mask()?.clone();

    if dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be written");
        for path in [mask.image_path(), mask.aoi_path()] {
            let found = std::path::Path::new(path).exists();
            println!("   {} {}", if found { "✓" } else { "✗" }, path);
        }
        return Ok(None);
    }

    let pipeline = MaskPipeline::new(LocalStorage::new(String::new()), mask)?;
    EtlEngine::new_with_monitoring(pipeline, monitor)
        .run()
        .await
        .map(Some)
}
