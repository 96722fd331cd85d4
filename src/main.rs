// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result};
use plctag_core::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    client::Client,
    error::LayerSignal,
    layer::families::demo::demo_family,
    request::Request,
};
use tokio::time::timeout;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logger("config/logger.yaml")?;

    let cfg = resolve_config_path("config/demo.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let client = Client::new();
    let plc = client
        .get_or_create_plc("demo", "127.0.0.1:9999", "1,0", 9999, &cfg, demo_family)
        .context("failed to get or create plc")?;

    let payload = b"ping".to_vec();
    let request = Request::new(
        move |window| {
            let n = payload.len();
            window.live_mut()[..n].copy_from_slice(&payload);
            window.end = window.start + n;
            Ok(LayerSignal::Ok)
        },
        |window| {
            info!(bytes = window.live().len(), "response received");
            Ok(())
        },
    );

    let handle = client.start_request(&plc, request).await?;
    info!(?handle, "request submitted");

    timeout(Duration::from_secs(5), async {
        while plc.is_connected().await {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .ok();

    client.stop_request(&plc, handle).await.ok();

    Ok(())
}
