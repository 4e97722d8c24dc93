//! Admission control for new instances.
//!
//! Runs for different instances proceed concurrently, so the quota check and
//! subdomain uniqueness cannot rely on the per-instance lock. Both use short
//! global sections plus RAII reservations that cover the window between the
//! check and the instance record becoming visible in the store. The same goes
//! for the instance id itself: the per-instance lock is released while the
//! workload is created, and the id reservation stands in for the record.

use std::collections::HashSet;
use std::time::Duration;

use labbox_shared::errors::{LabboxError, LabboxResult};
use parking_lot::Mutex;

use crate::db::Database;
use crate::util::random_label;

/// Pause between subdomain candidates after a collision.
const COLLISION_BACKOFF: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
pub(crate) struct Admission {
    /// Runs past the quota check that have not persisted their instance yet.
    pending: Mutex<usize>,
    /// Subdomains handed out to runs that have not persisted yet.
    subdomains: Mutex<HashSet<String>>,
    /// Instance ids whose workload is being created.
    creating: Mutex<HashSet<String>>,
}

impl Admission {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserve one instance slot.
    ///
    /// `max == 0` disables the quota. Live instances are the persisted ones
    /// plus pending reservations.
    ///
    /// # Errors
    ///
    /// `SystemBusy` when the quota is reached.
    pub(crate) fn reserve_slot<F>(&self, max: usize, persisted: F) -> LabboxResult<SlotReservation<'_>>
    where
        F: FnOnce() -> LabboxResult<usize>,
    {
        let mut pending = self.pending.lock();
        if max > 0 {
            let live = persisted()? + *pending;
            if live >= max {
                return Err(LabboxError::SystemBusy { live, max });
            }
        }
        *pending += 1;
        Ok(SlotReservation { admission: self })
    }

    /// Claim `id` for a run in progress. `None` if another run holds it.
    pub(crate) fn reserve_instance(&self, id: &str) -> Option<InstanceReservation<'_>> {
        if !self.creating.lock().insert(id.to_string()) {
            return None;
        }
        Some(InstanceReservation {
            admission: self,
            id: id.to_string(),
        })
    }

    /// Pick a random `length`-character subdomain no live or pending
    /// instance holds.
    ///
    /// # Errors
    ///
    /// `Timeout` if no free label is found within `deadline`.
    pub(crate) async fn allocate_subdomain(
        &self,
        db: &Database,
        length: usize,
        deadline: Duration,
    ) -> LabboxResult<SubdomainReservation<'_>> {
        let search = async {
            loop {
                let candidate = random_label(length);
                {
                    let mut reserved = self.subdomains.lock();
                    if !reserved.contains(&candidate) && !db.subdomain_in_use(&candidate)? {
                        reserved.insert(candidate.clone());
                        return Ok::<_, LabboxError>(SubdomainReservation {
                            admission: self,
                            label: candidate,
                        });
                    }
                }
                tracing::debug!(candidate = %candidate, "Subdomain taken, retrying");
                tokio::time::sleep(COLLISION_BACKOFF).await;
            }
        };

        tokio::time::timeout(deadline, search)
            .await
            .map_err(|_| LabboxError::Timeout("subdomain allocation".to_string()))?
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        *self.pending.lock()
    }
}

/// Holds a quota slot until dropped.
#[derive(Debug)]
pub(crate) struct SlotReservation<'a> {
    admission: &'a Admission,
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        let mut pending = self.admission.pending.lock();
        *pending = pending.saturating_sub(1);
    }
}

/// Holds an instance id until dropped.
#[derive(Debug)]
pub(crate) struct InstanceReservation<'a> {
    admission: &'a Admission,
    id: String,
}

impl Drop for InstanceReservation<'_> {
    fn drop(&mut self) {
        self.admission.creating.lock().remove(&self.id);
    }
}

/// Holds a subdomain label until dropped.
#[derive(Debug)]
pub(crate) struct SubdomainReservation<'a> {
    admission: &'a Admission,
    label: String,
}

impl SubdomainReservation<'_> {
    pub(crate) fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for SubdomainReservation<'_> {
    fn drop(&mut self) {
        self.admission.subdomains.lock().remove(&self.label);
    }
}
