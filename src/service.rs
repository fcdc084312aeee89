// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Init-system coupling (spec §4.2 stage 8, §9 "Init-system coupling").
//! Abstracted as a `ServiceController` with `reload()` and
//! `restart(unit_name)`; the reference uses systemd via D-Bus, so the
//! concrete adapter here talks to `org.freedesktop.systemd1` over the
//! system bus with `zbus`.

use zbus::proxy;
use zbus::Connection;

use crate::error::{Error, Result};

#[async_trait::async_trait]
pub trait ServiceController: Send + Sync {
    /// Tells systemd to reread unit files (`daemon-reload`).
    async fn reload(&self) -> Result<()>;

    /// Queues a restart of `unit_name` with replace-on-conflict semantics,
    /// returning the queued job id for logging.
    async fn restart(&self, unit_name: &str) -> Result<String>;
}

#[proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
trait SystemdManager {
    async fn reload(&self) -> zbus::Result<()>;

    #[zbus(name = "RestartUnit")]
    async fn restart_unit(&self, name: &str, mode: &str) -> zbus::Result<zbus::zvariant::OwnedObjectPath>;
}

pub struct SystemdServiceController {
    connection: Connection,
}

impl SystemdServiceController {
    pub async fn connect() -> Result<Self> {
        let connection = Connection::system()
            .await
            .map_err(|e| Error::RestartFailed(format!("could not connect to system bus: {e}")))?;
        Ok(Self { connection })
    }
}

#[async_trait::async_trait]
impl ServiceController for SystemdServiceController {
    async fn reload(&self) -> Result<()> {
        let proxy = SystemdManagerProxy::new(&self.connection)
            .await
            .map_err(|e| Error::RestartFailed(format!("manager proxy: {e}")))?;
        proxy
            .reload()
            .await
            .map_err(|e| Error::RestartFailed(format!("daemon-reload: {e}")))
    }

    async fn restart(&self, unit_name: &str) -> Result<String> {
        let proxy = SystemdManagerProxy::new(&self.connection)
            .await
            .map_err(|e| Error::RestartFailed(format!("manager proxy: {e}")))?;
        let job = proxy
            .restart_unit(unit_name, "replace")
            .await
            .map_err(|e| Error::RestartFailed(format!("restart {unit_name}: {e}")))?;
        Ok(job.to_string())
    }
}

/// Records reload/restart calls without touching D-Bus, for tests that
/// exercise the apply pipeline end to end.
#[derive(Default)]
pub struct RecordingServiceController {
    pub reloads: std::sync::atomic::AtomicUsize,
    pub restarts: std::sync::Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ServiceController for RecordingServiceController {
    async fn reload(&self) -> Result<()> {
        self.reloads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn restart(&self, unit_name: &str) -> Result<String> {
        self.restarts.lock().unwrap().push(unit_name.to_string());
        Ok(format!("job-{}", self.restarts.lock().unwrap().len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_controller_tracks_restart_requests() {
        let controller = RecordingServiceController::default();
        controller.reload().await.unwrap();
        let job = controller.restart("acme.service").await.unwrap();
        assert_eq!(job, "job-1");
        assert_eq!(controller.restarts.lock().unwrap().as_slice(), ["acme.service"]);
    }
}
