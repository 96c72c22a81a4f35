// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Host plugin load/unload hooks.

use crate::state::ControlResult;
use crate::supervisor::Supervisor;
use log::{error, info};

/// Called once when the host loads the plugin. Failures are logged, never
/// raised: a broken database must not keep the plugin from loading.
pub async fn on_load(supervisor: &Supervisor) {
    info!("[filebrowser] plugin loaded, reconciling state");
    if let Err(e) = supervisor.reconcile().await {
        error!("[filebrowser] reconcile failed: {e}");
    }
}

/// Called when the host unloads the plugin; stops the server.
pub async fn on_unload(supervisor: &Supervisor) -> ControlResult {
    info!("[filebrowser] plugin unloading, stopping the server");
    supervisor.stop().await
}
