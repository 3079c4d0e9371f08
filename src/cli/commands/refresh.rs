//! Refresh and watch commands - the post index cache

use super::git_transport;
use crate::cache::{CacheKey, CacheManager, CacheStatus, LoopSettings, RepoProducer};
use crate::cli::args::RepoArgs;
use crate::config::Config;
use crate::content::{PostIndex, PostIndexBuilder};
use crate::error::{QuillError, QuillResult};
use crate::ui::{self, TaskSpinner, UiContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How often `watch` reports cache status
const WATCH_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Execute the refresh command
pub async fn execute(args: RepoArgs, config: &Config) -> QuillResult<()> {
    let ctx = UiContext::detect();
    let key = cache_key(&args, config)?;
    let manager = post_cache(config);

    let result = refresh_once(&ctx, &manager, &key).await;
    if let Ok(ref index) = result {
        print_index(&ctx, config, index);
    }
    print_status(&ctx, &manager.status(&key).await);

    manager.shutdown().await;
    result.map(|_| ())
}

/// Execute the watch command
pub async fn watch(args: RepoArgs, config: &Config) -> QuillResult<()> {
    let ctx = UiContext::detect();
    let key = cache_key(&args, config)?;
    let manager = post_cache(config);

    let index = load_once(&ctx, &manager, &key).await?;
    print_index(&ctx, config, &index);
    ui::step_info(
        &ctx,
        &format!(
            "Refreshing every {}s, Ctrl-C to stop",
            config.cache.refresh_interval_secs
        ),
    );

    let mut report = tokio::time::interval(WATCH_REPORT_INTERVAL);
    report.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
            _ = report.tick() => {
                let posts = manager.read(&key).map(|index| index.len()).unwrap_or_default();
                info!("{} posts cached for {}", posts, key);
                print_status(&ctx, &manager.status(&key).await);
            }
        }
    }

    manager.shutdown().await;
    ui::outro_success(&ctx, "Background refresh stopped");
    Ok(())
}

fn cache_key(args: &RepoArgs, config: &Config) -> QuillResult<CacheKey> {
    let url = args
        .url
        .clone()
        .or_else(|| config.repo.url.clone())
        .filter(|url| !url.trim().is_empty())
        .ok_or(QuillError::RepoNotConfigured)?;
    let branch = args
        .branch
        .clone()
        .unwrap_or_else(|| config.repo.branch.clone());
    Ok(CacheKey::new(url, branch))
}

fn post_cache(config: &Config) -> CacheManager<PostIndex> {
    let builder = PostIndexBuilder::with_posts_dir(config.repo.posts_dir.clone());
    let producer = RepoProducer::new(git_transport(config), builder);
    CacheManager::new(Arc::new(producer), LoopSettings::from(&config.cache))
}

/// Force a fresh sync and rebuild of the index
async fn refresh_once(
    ctx: &UiContext,
    manager: &CacheManager<PostIndex>,
    key: &CacheKey,
) -> QuillResult<Arc<PostIndex>> {
    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!("Refreshing {}", key));
    let result = manager.refresh(key).await;
    finish_spinner(spinner, result)
}

/// Serve the cached index, producing it only on a miss
async fn load_once(
    ctx: &UiContext,
    manager: &CacheManager<PostIndex>,
    key: &CacheKey,
) -> QuillResult<Arc<PostIndex>> {
    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!("Loading {}", key));
    let result = manager.get_or_refresh(key).await;
    finish_spinner(spinner, result)
}

fn finish_spinner(
    mut spinner: TaskSpinner,
    result: QuillResult<Arc<PostIndex>>,
) -> QuillResult<Arc<PostIndex>> {
    match result {
        Ok(index) => {
            spinner.stop(&format!("{} posts indexed", index.len()));
            Ok(index)
        }
        Err(e) => {
            spinner.stop_error("Refresh failed");
            Err(e)
        }
    }
}

fn print_index(ctx: &UiContext, config: &Config, index: &PostIndex) {
    if index.is_empty() {
        ui::step_warn(
            ctx,
            &format!("No posts found under {}", config.repo.posts_dir.display()),
        );
        return;
    }

    ui::section(ctx, "Posts");
    for post in &index.posts {
        let modified = post
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        ui::key_value(ctx, &post.path, &format!("{} bytes, {}", post.size, modified));
    }
}

fn print_status(ctx: &UiContext, status: &CacheStatus) {
    ui::section(ctx, "Cache");
    ui::key_value(ctx, "Source", &status.source);
    ui::key_value(ctx, "Ref", &status.reference);
    ui::key_value_status(
        ctx,
        "Data",
        if status.has_data { "cached" } else { "empty" },
        status.has_data,
    );
    ui::key_value(
        ctx,
        "Last refreshed",
        &status
            .last_refreshed
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string()),
    );
    ui::key_value_status(
        ctx,
        "Background loop",
        if status.loop_alive { "running" } else { "stopped" },
        status.loop_alive,
    );
}
