// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end controller scenarios.
//!
//! Builds the full component graph over scriptable mock backends and drives
//! it through the real HTTP router, so discovery, reservations, the driver
//! supervisor, and the hub all run unmodified.

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use axum_test::TestServer;

use corral::config::Config;
use corral::run;
use corral::state::App;
use corral::test_support::MockBackends;
use corral::transport::build_router;

/// A running in-process controller with scriptable device backends.
pub struct Lab {
    pub app: Arc<App>,
    pub backends: MockBackends,
    pub server: TestServer,
    // Holds the stub driver script alive for the fixture's lifetime.
    _driver_dir: Option<tempfile::TempDir>,
}

/// Write an executable stub standing in for the Appium binary: prints the
/// ready banner and idles until terminated.
fn stub_driver() -> anyhow::Result<(tempfile::TempDir, String)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stub-appium");
    std::fs::write(
        &path,
        "#!/bin/sh\necho '[Appium] Appium REST http interface listener started on 0.0.0.0'\nsleep 600\n",
    )?;
    let mut perms = std::fs::metadata(&path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms)?;
    Ok((dir, path.to_string_lossy().into_owned()))
}

/// Start a lab over mock backends. `with_driver` installs the stub driver
/// binary so `appium/*` routes can really spawn and supervise a child.
pub async fn lab(base_port: u16, with_driver: bool) -> anyhow::Result<Lab> {
    let mut config = Config::default();
    config.base_port = base_port;
    config.port_range = 8;

    let driver_dir = if with_driver {
        let (dir, binary) = stub_driver()?;
        config.driver_binary = binary;
        Some(dir)
    } else {
        None
    };

    let backends = MockBackends::new();
    backends.android.connect("emulator-5554");

    let app = run::prepare_with_adapters(config, backends.adapters()).await?;
    let server = TestServer::new(build_router(Arc::clone(&app)))
        .map_err(|e| anyhow::anyhow!("test server: {e}"))?;

    Ok(Lab { app, backends, server, _driver_dir: driver_dir })
}

/// The synthetic id of the only seeded Android device.
pub async fn sole_device_id(lab: &Lab) -> String {
    lab.app.registry.snapshot().await[0].id.clone()
}
