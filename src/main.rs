use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cache;
mod card;
mod classify;
mod cli;
mod config;
mod embed;
mod misskey;
mod preview;
mod sanitize;
mod web;

use cache::ResponseCache;
use card::CardRenderer;
use classify::Target;
use config::Config;
use misskey::MisskeyClient;
use preview::{PreviewService, SiteSettings};

fn build_service(config: &Config) -> anyhow::Result<PreviewService> {
    let cache = ResponseCache::new(config.cache_max_size, config.cache_ttl());
    let client = MisskeyClient::new(cache.clone(), config.request_timeout())?;
    let renderer = CardRenderer::new(
        config.og_image_enabled,
        cache,
        card::default_engine(&config.chromium_path),
    );

    Ok(PreviewService::new(
        client,
        renderer,
        SiteSettings {
            base_url: config.base_url(),
            site_name: config.site_name.clone(),
        },
    ))
}

async fn run(args: cli::Args) -> anyhow::Result<()> {
    let preview = build_service(&args.config)?;

    match args.command {
        cli::Command::Serve {} => web::serve(&args.config, preview).await,

        cli::Command::Inspect { url } => {
            let target = classify::classify(&url)?;
            let result = preview.inspect(&target).await;
            preview.shutdown();

            println!("{}", serde_json::to_string_pretty(&result?)?);
            Ok(())
        }

        cli::Command::Card { url, output } => {
            let Target::Note { domain, id } = classify::classify(&url)? else {
                bail!("{url} is not a note url");
            };

            let png = preview.card(&domain, &id).await;
            preview.shutdown();

            let png = png?.context("failed to render card")?;
            std::fs::write(&output, &png)
                .with_context(|| format!("failed to write {}", output.display()))?;
            log::info!("wrote {} ({} bytes)", output.display(), png.len());
            Ok(())
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    args.config.validate()?;
    args.config.log_summary();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(args))
}
