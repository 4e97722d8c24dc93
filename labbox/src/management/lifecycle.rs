//! Background halves of the instance lifecycle: boot, teardown and expiry.

use std::sync::Arc;
use std::time::Duration;

use labbox_shared::errors::{LabboxError, LabboxResult};

use super::manager::InstanceManager;
use crate::gateway::App;
use crate::instance::{Instance, InstanceId, InstanceStatus};

impl InstanceManager {
    pub(super) fn spawn_boot(&self, id: InstanceId) {
        let Some(manager) = self.arc() else {
            return;
        };
        tokio::spawn(async move {
            manager.boot(id).await;
        });
    }

    pub(super) fn spawn_teardown(&self, instance: Instance) {
        let Some(manager) = self.arc() else {
            return;
        };
        tokio::spawn(async move {
            manager.teardown(instance).await;
        });
    }

    // ========================================================================
    // BOOT
    // ========================================================================

    /// Start the workload, wait for its port, publish it and arm the lease.
    ///
    /// A failure moves the instance to `create-failure`; its lease is still
    /// armed so the record is collected at expiry.
    async fn boot(self: Arc<Self>, id: InstanceId) {
        match self.boot_workload(&id).await {
            Ok(Some(instance)) => {
                tracing::info!(
                    instance_id = %id,
                    access_url = %instance.access_url,
                    "Instance running"
                );
                self.schedule_expiry(&instance).await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(instance_id = %id, error = %e, "Instance boot failed");
                match self
                    .db
                    .transition_status(&id, InstanceStatus::CreateFailure, &e.to_string())
                {
                    Ok(true) => {
                        if let Ok(Some(instance)) = self.db.find_instance(&id) {
                            self.schedule_expiry(&instance).await;
                        }
                    }
                    Ok(false) => {}
                    Err(err) => {
                        tracing::error!(instance_id = %id, error = %err, "Failed to record boot failure");
                    }
                }
            }
        }
    }

    /// Returns the running instance, or `None` if it was destroyed meanwhile.
    async fn boot_workload(&self, id: &InstanceId) -> LabboxResult<Option<Instance>> {
        self.runtime.start(id.as_str()).await?;
        let port = self.wait_for_port(id.as_str()).await?;

        let Some(mut instance) = self.db.find_instance(id)? else {
            return Ok(None);
        };

        if instance.has_subdomain() {
            self.router.add_app(
                &instance.subdomain,
                App::http(format!("{}:{}", self.options.bind_host, port)),
            );
        } else {
            instance.access_url = port.to_string();
            self.db.update_access_url(id, &instance.access_url)?;
        }

        if !self.db.transition_status(id, InstanceStatus::Running, "")? {
            // Destroy won the race; do not leave a route to a dying workload.
            if instance.has_subdomain() {
                self.router.del_app(&instance.subdomain);
            }
            tracing::debug!(instance_id = %id, "Instance left creating state during boot");
            return Ok(None);
        }
        instance.status = InstanceStatus::Running;
        Ok(Some(instance))
    }

    /// Wait for the workload to publish a host port, up to `start_timeout`.
    async fn wait_for_port(&self, name: &str) -> LabboxResult<u16> {
        tokio::time::timeout(self.options.start_timeout, self.poll_for_port(name))
            .await
            .map_err(|_| {
                LabboxError::Timeout(format!(
                    "workload {name} published no port within {:?}",
                    self.options.start_timeout
                ))
            })?
    }

    async fn poll_for_port(&self, name: &str) -> LabboxResult<u16> {
        loop {
            let inspect = self.runtime.inspect(name).await?;
            if !inspect.running {
                return Err(LabboxError::Runtime(format!(
                    "workload {name} stopped before publishing a port"
                )));
            }
            if let Some(port) = inspect.first_host_port() {
                return Ok(port);
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    // ========================================================================
    // TEARDOWN
    // ========================================================================

    /// Remove the workload, route and record of `instance`.
    ///
    /// Runs under the per-instance lock and only while the persisted record
    /// is still this instance in `deleting`. Ids are reused across runs of
    /// the same pair, so a teardown that outlived its instance must not
    /// touch a newer one.
    async fn teardown(self: Arc<Self>, instance: Instance) {
        let id = &instance.id;
        let _guard = self.locks.lock(id.as_str()).await;

        match self.db.find_instance(id) {
            Ok(Some(current))
                if current.created_at == instance.created_at
                    && current.status == InstanceStatus::Deleting => {}
            Ok(_) => {
                tracing::debug!(instance_id = %id, "Teardown superseded");
                return;
            }
            Err(e) => {
                tracing::error!(instance_id = %id, error = %e, "Teardown lookup failed");
                return;
            }
        }

        match self.runtime.remove(id.as_str(), true).await {
            Ok(()) => {}
            Err(e) if e.is_workload_not_found() => {
                tracing::debug!(instance_id = %id, "Workload already gone");
            }
            Err(e) => {
                tracing::error!(instance_id = %id, error = %e, "Workload removal failed");
                if let Err(err) =
                    self.db
                        .transition_status(id, InstanceStatus::DeleteFailure, &e.to_string())
                {
                    tracing::error!(instance_id = %id, error = %err, "Failed to record removal failure");
                }
                return;
            }
        }

        if instance.has_subdomain() {
            self.router.del_app(&instance.subdomain);
        }

        match self.db.delete_instance(id) {
            Ok(_) => tracing::info!(instance_id = %id, "Instance destroyed"),
            Err(e) => {
                tracing::error!(instance_id = %id, error = %e, "Failed to delete instance record");
                let _ = self
                    .db
                    .transition_status(id, InstanceStatus::DeleteFailure, &e.to_string());
            }
        }
    }

    // ========================================================================
    // EXPIRY
    // ========================================================================

    /// Arm the lease for the time left, or destroy now if already expired.
    pub(super) async fn schedule_expiry(&self, instance: &Instance) {
        let now = self.clock.now_millis();
        match instance.remaining_millis(now) {
            Some(remaining) => {
                tracing::debug!(
                    instance_id = %instance.id,
                    remaining_ms = remaining,
                    "Lease armed"
                );
                self.expiry
                    .set(instance.id.clone(), Duration::from_millis(remaining));
            }
            None => {
                tracing::debug!(instance_id = %instance.id, "Instance already expired");
                if let Err(e) = self.destroy(&instance.id).await {
                    tracing::error!(instance_id = %instance.id, error = %e, "Destroy of expired instance failed");
                }
            }
        }
    }

    /// Lease callback.
    ///
    /// The id may have been reused by a newer instance of the same pair since
    /// the lease was armed, and the timer clock may run slightly ahead of the
    /// wall clock. Only an instance past its `expires_at` is destroyed; any
    /// other is re-armed for its remaining time.
    pub(super) async fn on_lease_expired(&self, id: InstanceId) {
        let _guard = self.locks.lock(id.as_str()).await;

        let instance = match self.db.find_instance(&id) {
            Ok(Some(instance)) => instance,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(instance_id = %id, error = %e, "Lease expiry lookup failed");
                return;
            }
        };
        if let Some(remaining) = instance.remaining_millis(self.clock.now_millis()) {
            tracing::debug!(instance_id = %id, remaining_ms = remaining, "Lease fired early, re-arming");
            self.expiry.set(id, Duration::from_millis(remaining));
            return;
        }

        tracing::info!(instance_id = %id, "Lease expired");
        if let Err(e) = self.destroy_locked(&id) {
            tracing::error!(instance_id = %id, error = %e, "Destroy on expiry failed");
        }
    }
}
