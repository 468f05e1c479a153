use std::path::Path;

use anyhow::anyhow;
use tracing::debug;

use campus_core::Domain;
use campus_sync::{CollectionKey, QueryResult, QueryStatus, ResourceService};

use super::{Context, Output, parse_filters};

pub async fn list(
    config_path: &Path,
    resource: &str,
    filters: &[String],
    output: Output,
) -> anyhow::Result<()> {
    let domain: Domain = resource.parse()?;
    let key = CollectionKey::list(domain).with_filters(parse_filters(filters)?);
    let ctx = Context::open(config_path)?;
    debug!(%key, base_url = %ctx.config.api.base_url, "listing");

    let service = ResourceService::new(ctx.api.clone(), ctx.sync.clone());
    let result = service.list(&key).await;
    ctx.sync.shutdown();
    print_result(result, output)
}

pub async fn show(
    config_path: &Path,
    resource: &str,
    id: &str,
    output: Output,
) -> anyhow::Result<()> {
    let domain: Domain = resource.parse()?;
    let ctx = Context::open(config_path)?;

    let service = ResourceService::new(ctx.api.clone(), ctx.sync.clone());
    let result = service.get(domain, id).await;
    ctx.sync.shutdown();
    if result.status == QueryStatus::Idle {
        return Err(anyhow!("an id is required"));
    }
    print_result(result, output)
}

fn print_result(result: QueryResult, output: Output) -> anyhow::Result<()> {
    match (result.status, result.error) {
        (QueryStatus::Error, Some(e)) => Err(anyhow!(e.user_message())),
        (_, _) => output.print(&result.data.unwrap_or_default()),
    }
}
