use clap::Parser;
use sar_ship_etl::config::{CocoArgs, Command, MaskArgs};
use sar_ship_etl::core::Pipeline;
use sar_ship_etl::utils::{logger, validation::Validate};
use sar_ship_etl::{CliConfig, CocoPipeline, EtlEngine, EtlError, LocalStorage, MaskPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    logger::init_logger(config.log_format.as_str(), config.verbose);

    tracing::info!("Starting sar-ship-etl");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.severity().exit_code());
    }

    if config.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let outcome = match &config.command {
        Command::Coco(args) => run_coco(args.clone(), config.monitor).await,
        Command::Mask(args) => run_mask(args.clone(), config.monitor).await,
    };

    match outcome {
        Ok(Some(output_path)) => {
            tracing::info!("✅ ETL process completed successfully!");
            println!("✅ ETL process completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Ok(None) => {}
        Err(e) => exit_with(e),
    }

    Ok(())
}

async fn run_coco(args: CocoArgs, monitor: bool) -> Result<Option<String>, EtlError> {
    let source = LocalStorage::new(args.source_dir.clone());
    let export = LocalStorage::new(args.export_dir.clone());
    let dry_run = args.dry_run;
    let pipeline = CocoPipeline::new(source, export, args);

    if dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be written");
        let preview = pipeline.preview().await?;
        println!("Dataset preview for {}:", pipeline.name());
        print!("{}", preview);
        return Ok(None);
    }

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor);
    engine.run().await.map(Some)
}

async fn run_mask(args: MaskArgs, monitor: bool) -> Result<Option<String>, EtlError> {
    // paths on the command line are relative to the working directory
    let storage = LocalStorage::new(String::new());
    let pipeline = MaskPipeline::new(storage, args)?;
    let engine = EtlEngine::new_with_monitoring(pipeline, monitor);
    engine.run().await.map(Some)
}

fn exit_with(e: EtlError) -> ! {
    tracing::error!(
        "❌ ETL process failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    std::process::exit(e.severity().exit_code())
}
