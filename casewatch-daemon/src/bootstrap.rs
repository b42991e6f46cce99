//! Wiring of configuration, store, HTTP adapters and sinks into a
//! [`CycleRunner`].

use casewatch_core::{StorageError, WatchConfig, WatchResult};
use casewatch_notify::{FanoutNotifier, SlackNotifier, WebhookNotifier};
use casewatch_providers::{CloudHierarchy, CloudSupportClient, ResourceManagerClient};
use casewatch_reconcile::{AutoSubscriber, CycleRunner};
use casewatch_storage::{AssetRegistry, CaseChannels, LmdbStore};
use std::sync::Arc;

/// Upsert the tracked assets and case channels listed in the config.
/// Returns the number of entries written.
pub async fn seed_registry(
    config: &WatchConfig,
    registry: &dyn AssetRegistry,
    channels: &dyn CaseChannels,
) -> WatchResult<usize> {
    for asset in &config.tracked_assets {
        registry.upsert_asset(asset).await?;
    }
    for binding in &config.case_channels {
        channels
            .track_case(&binding.channel_id, &binding.case_number)
            .await?;
    }
    let seeded = config.tracked_assets.len() + config.case_channels.len();
    if seeded > 0 {
        tracing::info!(
            tracked_assets = config.tracked_assets.len(),
            case_channels = config.case_channels.len(),
            "Seeded registry from config"
        );
    }
    Ok(seeded)
}

/// Configured notification sinks, plus the Slack sink on its own so the
/// support client can announce comments through it.
pub fn build_sinks(
    config: &WatchConfig,
    channels: Arc<dyn CaseChannels>,
) -> WatchResult<(FanoutNotifier, Option<Arc<SlackNotifier>>)> {
    let mut fanout = FanoutNotifier::new();
    let mut slack_sink = None;

    if let Some(slack) = &config.slack {
        let notifier = Arc::new(SlackNotifier::new(
            slack,
            channels,
            config.request_timeout(),
        )?);
        fanout = fanout.with_sink("slack", notifier.clone());
        slack_sink = Some(notifier);
    }
    if let Some(webhook) = &config.webhook {
        let notifier = WebhookNotifier::new(webhook, config.request_timeout())?;
        fanout = fanout.with_sink("webhook", Arc::new(notifier));
    }

    if fanout.is_empty() {
        tracing::warn!("No notification sinks configured; changes will only be logged");
    }
    Ok((fanout, slack_sink))
}

/// Open the store and build a runner over the live APIs.
pub async fn build_runner(config: &WatchConfig) -> WatchResult<CycleRunner> {
    let store = Arc::new(
        LmdbStore::open(&config.store_path, &config.project_id, config.store_size_mb)
            .map_err(StorageError::from)?,
    );
    tracing::info!(
        path = %config.store_path.display(),
        namespace = %config.project_id,
        "Snapshot store opened"
    );

    seed_registry(config, store.as_ref(), store.as_ref()).await?;

    let (fanout, slack) = build_sinks(config, store.clone())?;

    let mut support = CloudSupportClient::from_config(config)?;
    if let Some(slack) = slack {
        support = support.with_channel_poster(slack);
    }
    let support = Arc::new(support);

    let hierarchy = CloudHierarchy::new(
        support.clone(),
        ResourceManagerClient::from_config(config)?,
    );
    let subscriber = AutoSubscriber::new(Arc::new(hierarchy), store.clone(), support.clone());

    Ok(
        CycleRunner::new(config.org_id.clone(), support, store, Arc::new(fanout))
            .with_auto_subscriber(subscriber),
    )
}
