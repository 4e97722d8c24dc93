//! Instance manager: run, destroy, flag submission and recovery.

use std::sync::{Arc, Weak};
use std::time::Duration;

use labbox_shared::constants::lifecycle::{
    DEFAULT_FLAG_PREFIX, FLAG_ENV_VAR, PORT_POLL_INTERVAL_MS, START_TIMEOUT_SECS,
    SUBDOMAIN_ALLOCATION_TIMEOUT_MS, SUBDOMAIN_LENGTH,
};
use labbox_shared::errors::{LabboxError, LabboxResult};
use uuid::Uuid;

use super::admission::Admission;
use super::locks::KeyedLocks;
use crate::db::Database;
use crate::expiry::ExpiryScheduler;
use crate::gateway::SubdomainRouter;
use crate::instance::{Instance, InstanceId, InstanceStatus};
use crate::models::{ChallengeRecord, Solve};
use crate::runtime::{WorkloadRuntime, WorkloadSpec, parse_exposed};
use crate::util::clock::Clock;
use crate::util::format_duration;

/// Public addressing used when instances are exposed through the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayMode {
    /// Parent domain; instances live at `<label>.<domain>`.
    pub domain: String,
    /// Advertise `https://` access URLs.
    pub https: bool,
}

impl GatewayMode {
    pub fn access_url(&self, subdomain: &str) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{scheme}://{subdomain}.{}", self.domain)
    }
}

/// Tunables for [`InstanceManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Maximum number of live instances; `0` means unlimited.
    pub max_instances: usize,
    /// Prefix of generated flags, rendered as `<prefix>{<uuid>}`.
    pub flag_prefix: String,
    /// Expose instances through subdomains; `None` publishes raw host ports.
    pub gateway: Option<GatewayMode>,
    /// Host the gateway dials to reach published ports.
    pub bind_host: String,
    pub poll_interval: Duration,
    /// Deadline for a workload to start and publish a port.
    pub start_timeout: Duration,
    pub allocation_timeout: Duration,
    /// Characters in a generated subdomain label.
    pub subdomain_length: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            max_instances: 0,
            flag_prefix: DEFAULT_FLAG_PREFIX.to_string(),
            gateway: None,
            bind_host: "127.0.0.1".to_string(),
            poll_interval: Duration::from_millis(PORT_POLL_INTERVAL_MS),
            start_timeout: Duration::from_secs(START_TIMEOUT_SECS),
            allocation_timeout: Duration::from_millis(SUBDOMAIN_ALLOCATION_TIMEOUT_MS),
            subdomain_length: SUBDOMAIN_LENGTH,
        }
    }
}

/// Owns the lifecycle of every instance.
///
/// Shared as `Arc<InstanceManager>`; background tasks (boot, teardown, lease
/// expiry) hold their own references.
///
/// # Locking
///
/// - `run`, `destroy`, `submit_flag` and teardown for the same instance
///   serialize on a per-instance lock; different instances proceed
///   concurrently
/// - `run` holds the lock only for its existence check; the id stays claimed
///   through [`Admission`] while the workload is created
/// - quota and subdomain uniqueness go through [`Admission`]
/// - no lock is held while polling a booting workload
pub struct InstanceManager {
    pub(super) db: Database,
    pub(super) runtime: Arc<dyn WorkloadRuntime>,
    pub(super) router: SubdomainRouter,
    pub(super) expiry: ExpiryScheduler<InstanceId>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) options: ManagerOptions,
    pub(super) locks: KeyedLocks,
    admission: Admission,
    me: Weak<InstanceManager>,
}

impl InstanceManager {
    /// Build a manager. Must be called inside a tokio runtime.
    pub fn new(
        db: Database,
        runtime: Arc<dyn WorkloadRuntime>,
        router: SubdomainRouter,
        clock: Arc<dyn Clock>,
        options: ManagerOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let on_expired = me.clone();
            let expiry = ExpiryScheduler::new(move |id: InstanceId| {
                let manager = on_expired.clone();
                async move {
                    if let Some(manager) = manager.upgrade() {
                        manager.on_lease_expired(id).await;
                    }
                }
            });

            tracing::debug!(
                backend = runtime.backend_name(),
                max_instances = options.max_instances,
                gateway = options.gateway.is_some(),
                "Instance manager created"
            );

            Self {
                db,
                runtime,
                router,
                expiry,
                clock,
                options,
                locks: KeyedLocks::new(),
                admission: Admission::new(),
                me: me.clone(),
            }
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn router(&self) -> &SubdomainRouter {
        &self.router
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Time left on the lease of `id`, if one is pending.
    pub fn lease_remaining(&self, id: &InstanceId) -> Option<Duration> {
        self.expiry.get(id)
    }

    pub(super) fn arc(&self) -> Option<Arc<Self>> {
        self.me.upgrade()
    }

    // ========================================================================
    // RUN
    // ========================================================================

    /// Create an instance of `challenge_id` for `user_id` and start booting it.
    ///
    /// Returns once the workload is created and the instance is persisted in
    /// `creating`; boot continues in the background.
    ///
    /// # Errors
    ///
    /// In check order: `AlreadyExists`, `SystemBusy`, `ChallengeNotFound`,
    /// `ImageNotFound`, `UserNotFound`, `Timeout` (subdomain allocation), then
    /// any runtime error from creating the workload. Nothing is persisted on
    /// error.
    pub async fn run(&self, user_id: &str, challenge_id: &str) -> LabboxResult<InstanceId> {
        let id = InstanceId::derive(user_id, challenge_id);

        let _claim = {
            let _guard = self.locks.lock(id.as_str()).await;
            if self.db.instance_exists(&id)? {
                return Err(LabboxError::AlreadyExists(id.to_string()));
            }
            self.admission
                .reserve_instance(id.as_str())
                .ok_or_else(|| LabboxError::AlreadyExists(id.to_string()))?
        };

        let _slot = self
            .admission
            .reserve_slot(self.options.max_instances, || self.db.count_instances())?;

        let challenge = self
            .db
            .find_challenge(challenge_id)?
            .filter(|c| c.enabled)
            .ok_or_else(|| LabboxError::ChallengeNotFound(challenge_id.to_string()))?;
        let image = self
            .db
            .find_image(&challenge.image_id)?
            .ok_or_else(|| LabboxError::ImageNotFound(challenge.image_id.clone()))?;
        let user = self
            .db
            .find_user(user_id)?
            .ok_or_else(|| LabboxError::UserNotFound(user_id.to_string()))?;

        let flag = if challenge.dynamic_flag {
            format!("{}{{{}}}", self.options.flag_prefix, Uuid::new_v4())
        } else {
            challenge.flag.clone()
        };

        let (subdomain, access_url) = match &self.options.gateway {
            Some(gateway) => {
                let reservation = self
                    .admission
                    .allocate_subdomain(
                        &self.db,
                        self.options.subdomain_length,
                        self.options.allocation_timeout,
                    )
                    .await?;
                let url = gateway.access_url(reservation.label());
                (Some(reservation), url)
            }
            None => (None, String::new()),
        };

        let spec = WorkloadSpec {
            name: id.to_string(),
            image: image.registry.clone(),
            env: vec![(FLAG_ENV_VAR.to_string(), flag.clone())],
            memory_bytes: WorkloadSpec::bytes_from_mib(image.memory_limit_mib),
            nano_cpus: WorkloadSpec::nano_cpus_from_cores(image.cpu_limit),
            ports: parse_exposed(&image.exposed),
            auto_remove: true,
        };
        self.runtime.create(&spec).await?;

        let now = self.clock.now_millis();
        let instance = Instance {
            id: id.clone(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            challenge_id: challenge.id.clone(),
            challenge_name: challenge.name.clone(),
            flag,
            exposed: image.exposed.clone(),
            duration_minutes: challenge.duration_minutes,
            cpu_limit: image.cpu_limit,
            memory_limit_mib: image.memory_limit_mib,
            status: InstanceStatus::Creating,
            subdomain: subdomain
                .as_ref()
                .map(|r| r.label().to_string())
                .unwrap_or_default(),
            access_url,
            message: String::new(),
            created_at: now,
            expires_at: now + i64::from(challenge.duration_minutes) * 60_000,
        };

        if let Err(e) = self.db.insert_instance(&instance) {
            // Nothing references the workload yet; drop it so it does not leak.
            let runtime = Arc::clone(&self.runtime);
            let name = id.to_string();
            tokio::spawn(async move {
                if let Err(err) = runtime.remove(&name, true).await {
                    tracing::warn!(workload = %name, error = %err, "Failed to remove orphaned workload");
                }
            });
            return Err(e);
        }
        drop(subdomain);

        let record = ChallengeRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user.id,
            user_name: user.name,
            challenge_id: challenge.id,
            challenge_name: challenge.name,
            instance_id: id.to_string(),
            created_at: now,
        };
        if let Err(e) = self.db.insert_challenge_record(&record) {
            tracing::warn!(instance_id = %id, error = %e, "Failed to write challenge record");
        }

        tracing::info!(
            instance_id = %id,
            user_id = %user_id,
            challenge_id = %challenge_id,
            subdomain = %instance.subdomain,
            expires_at = instance.expires_at,
            "Instance created"
        );

        self.spawn_boot(id.clone());
        Ok(id)
    }

    // ========================================================================
    // DESTROY
    // ========================================================================

    /// Tear an instance down. Idempotent: a missing instance is success.
    ///
    /// Marks the instance `deleting`, drops its lease and returns; workload
    /// removal, route removal and record deletion happen in the background.
    /// A failed removal leaves the instance in `delete-failure`.
    pub async fn destroy(&self, id: &InstanceId) -> LabboxResult<()> {
        let _guard = self.locks.lock(id.as_str()).await;
        self.destroy_locked(id)
    }

    /// [`destroy`](Self::destroy) with the per-instance lock already held.
    pub(super) fn destroy_locked(&self, id: &InstanceId) -> LabboxResult<()> {
        let Some(instance) = self.db.find_instance(id)? else {
            tracing::debug!(instance_id = %id, "Destroy of absent instance");
            return Ok(());
        };
        if !instance.status.can_destroy() {
            tracing::debug!(instance_id = %id, "Teardown already in progress");
            return Ok(());
        }

        if !self
            .db
            .transition_status(id, InstanceStatus::Deleting, "")?
        {
            // Deleted between the lookup and the update.
            return Ok(());
        }
        self.expiry.cancel(id);

        tracing::info!(
            instance_id = %id,
            from = %instance.status,
            "Destroying instance"
        );
        self.spawn_teardown(instance);
        Ok(())
    }

    // ========================================================================
    // FLAG SUBMISSION
    // ========================================================================

    /// Check `candidate` against the instance's flag.
    ///
    /// Returns `Ok(false)` without touching anything when the instance is
    /// absent or the flag does not match (case-insensitive). On a match the
    /// solve is recorded and the instance destroyed.
    ///
    /// A repeat solve keeps its original `solved_at`; its elapsed time is only
    /// replaced when the new run was faster.
    pub async fn submit_flag(&self, id: &InstanceId, candidate: &str) -> LabboxResult<bool> {
        let _guard = self.locks.lock(id.as_str()).await;

        let Some(instance) = self.db.find_instance(id)? else {
            return Ok(false);
        };
        if candidate.to_lowercase() != instance.flag.to_lowercase() {
            tracing::debug!(instance_id = %id, "Flag mismatch");
            return Ok(false);
        }

        let now = self.clock.now_millis();
        let used_time = (now - instance.created_at).max(0);
        let used_time_str = format_duration(used_time);

        match self
            .db
            .find_solve(&instance.user_id, &instance.challenge_id)?
        {
            Some(solve) => {
                if used_time < solve.used_time {
                    self.db
                        .update_solve_time(&solve.id, used_time, &used_time_str)?;
                }
            }
            None => {
                let points = self
                    .db
                    .find_challenge(&instance.challenge_id)?
                    .map(|c| c.points)
                    .unwrap_or_default();
                self.db.insert_solve(&Solve {
                    id: Uuid::new_v4().to_string(),
                    user_id: instance.user_id.clone(),
                    challenge_id: instance.challenge_id.clone(),
                    points,
                    start_at: instance.created_at,
                    solved_at: now,
                    used_time,
                    used_time_str: used_time_str.clone(),
                })?;
            }
        }

        tracing::info!(
            instance_id = %id,
            user_id = %instance.user_id,
            challenge_id = %instance.challenge_id,
            used_time = %used_time_str,
            "Flag accepted"
        );

        if let Err(e) = self.destroy_locked(id) {
            tracing::warn!(instance_id = %id, error = %e, "Destroy after solve failed");
        }
        Ok(true)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// The instance `user_id` holds for `challenge_id`, if any.
    pub fn get_instance(&self, user_id: &str, challenge_id: &str) -> LabboxResult<Option<Instance>> {
        self.db
            .find_instance(&InstanceId::derive(user_id, challenge_id))
    }

    pub fn find_instance(&self, id: &InstanceId) -> LabboxResult<Option<Instance>> {
        self.db.find_instance(id)
    }

    /// All instances, newest first.
    pub fn list_instances(&self) -> LabboxResult<Vec<Instance>> {
        self.db.list_instances()
    }

    // ========================================================================
    // RECOVERY
    // ========================================================================

    /// Resume every persisted instance after a process restart.
    ///
    /// - `creating`/`running`: boot again, which rebuilds routes and leases
    /// - `deleting`: re-issue the teardown
    /// - failure states: re-arm the lease so they are collected at expiry
    ///
    /// Per-instance problems are logged and recorded on the instance; they
    /// never abort recovery. Returns the number of instances visited.
    pub async fn restart_containers(&self) -> LabboxResult<usize> {
        let instances = self.db.list_instances()?;
        let count = instances.len();

        for instance in instances {
            tracing::debug!(
                instance_id = %instance.id,
                status = %instance.status,
                "Recovering instance"
            );
            if instance.status.needs_boot() {
                self.spawn_boot(instance.id.clone());
            } else if instance.status.is_failure() {
                self.schedule_expiry(&instance).await;
            } else {
                self.spawn_teardown(instance);
            }
        }

        tracing::info!(count, "Recovered instances");
        Ok(count)
    }

    /// Stop lease timers. Pending leases are dropped; records are kept for
    /// the next recovery.
    pub fn shutdown(&self) {
        self.expiry.shutdown();
    }
}

impl std::fmt::Debug for InstanceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceManager")
            .field("options", &self.options)
            .field("routes", &self.router.len())
            .field("leases", &self.expiry.len())
            .finish_non_exhaustive()
    }
}
