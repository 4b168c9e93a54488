//! Asynchronous resource creation and fence-gated retirement.
//!
//! [`ResourceLifetimeManager`] has two responsibilities:
//!
//! - **Creation**: packaging resource creation as jobs on a dedicated
//!   [`JobScheduler`] worker so it happens off the submission thread, with a
//!   synchronous fallback ([`ResourceLifetimeManager::wait_until_resource_valid`])
//!   the first time a resource is needed before its job finished.
//! - **Retirement**: a resource marked used by a queue is held in an
//!   in-flight set keyed by that queue's fence value and released only once
//!   the value is reached, so nothing is destroyed while a command list that
//!   references it might still be executing.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::ResourceFactory;
use crate::jobs::{JobId, JobScheduler, JobTypeId};
use crate::resource::GpuResource;
use crate::sync::{Fence, SyncQueue};
use crate::types::{Extent2d, TextureFormat, TextureUsage};

struct CreateTextureJob {
    resource: Arc<GpuResource>,
    format: TextureFormat,
    extent: Extent2d,
    usage: TextureUsage,
    factory: Arc<dyn ResourceFactory>,
    pending_jobs: Arc<Mutex<HashMap<u64, JobId>>>,
}

struct InFlightBatch {
    fence: Fence,
    fence_value: u64,
    resources: Vec<Arc<GpuResource>>,
}

/// Owns background resource creation and deferred, fence-gated release.
pub struct ResourceLifetimeManager {
    factory: Arc<dyn ResourceFactory>,
    scheduler: JobScheduler,
    create_texture_type: JobTypeId,
    /// Creation job per still-invalid resource, keyed by resource id.
    pending_jobs: Arc<Mutex<HashMap<u64, JobId>>>,
    /// Resources referenced by the next batch on each queue, keyed by
    /// queue id, deduplicated by resource id.
    used: Mutex<HashMap<u64, Vec<Arc<GpuResource>>>>,
    in_flight: Mutex<Vec<InFlightBatch>>,
}

impl ResourceLifetimeManager {
    /// Create the manager and spawn its creation worker.
    pub fn new(factory: Arc<dyn ResourceFactory>) -> Self {
        let scheduler = JobScheduler::new("vermilion-resource");
        let create_texture_type = scheduler.add_job_type(run_create_texture_job, false);
        Self {
            factory,
            scheduler,
            create_texture_type,
            pending_jobs: Arc::new(Mutex::new(HashMap::new())),
            used: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Schedule asynchronous creation of a texture behind `resource`.
    ///
    /// The handle stays invalid until the job installs the device object.
    /// A device-side creation failure is unrecoverable and panics the
    /// worker after logging (continuing with a partially initialized device
    /// is not supported).
    pub fn schedule_create_texture_resource(
        &self,
        resource: &Arc<GpuResource>,
        format: TextureFormat,
        extent: Extent2d,
        usage: TextureUsage,
    ) {
        let payload = CreateTextureJob {
            resource: resource.clone(),
            format,
            extent,
            usage,
            factory: self.factory.clone(),
            pending_jobs: self.pending_jobs.clone(),
        };
        // Register before scheduling so a racing wait_until_resource_valid
        // always finds the job.
        let mut pending = self.pending_jobs.lock();
        if let Some(id) = self
            .scheduler
            .schedule_job(self.create_texture_type, Box::new(payload))
        {
            pending.insert(resource.id(), id);
        }
    }

    /// Force `resource` valid, blocking if its creation job has not run yet.
    ///
    /// The pending job is promoted ahead of lower-priority queued work to
    /// bound the wait. Calling this from the creation worker itself is a
    /// no-op: the creation callback must not block on its own in-flight
    /// state.
    pub fn wait_until_resource_valid(&self, resource: &Arc<GpuResource>) {
        if resource.is_valid() {
            return;
        }
        if self.scheduler.is_worker_thread() {
            return;
        }
        let job = self.pending_jobs.lock().get(&resource.id()).copied();
        match job {
            Some(job) => {
                log::debug!(
                    "forcing synchronous creation of resource '{}'",
                    resource.name()
                );
                self.scheduler.prioritize_job(job);
                self.scheduler.sync(job);
            }
            None => {
                log::warn!(
                    "resource '{}' is invalid but has no pending creation job",
                    resource.name()
                );
            }
        }
    }

    /// Record that `resource` is referenced by the next batch submitted on
    /// `queue`. Marking the same resource twice before submission is a no-op.
    ///
    /// Marking a resource that is not yet valid logs a warning and is
    /// ignored: an in-flight command list cannot reference a resource that
    /// does not exist device-side.
    pub fn mark_used(&self, resource: &Arc<GpuResource>, queue: &SyncQueue) {
        if !resource.is_valid() {
            log::warn!(
                "mark_used: resource '{}' is not valid yet, ignored",
                resource.name()
            );
            return;
        }
        let mut used = self.used.lock();
        let entries = used.entry(queue.id()).or_default();
        if entries.iter().any(|entry| entry.id() == resource.id()) {
            return;
        }
        entries.push(resource.clone());
    }

    /// Move everything marked used on `queue` into the in-flight set, keyed
    /// by `fence_value`. Call immediately after submitting a batch on that
    /// queue with that completion token.
    pub fn on_command_lists_executed(&self, queue: &SyncQueue, fence_value: u64) {
        let resources = self.used.lock().remove(&queue.id()).unwrap_or_default();
        if resources.is_empty() {
            return;
        }
        self.in_flight.lock().push(InFlightBatch {
            fence: queue.fence(),
            fence_value,
            resources,
        });
    }

    /// Release every in-flight entry whose fence value has been reached.
    /// Called once per frame.
    pub fn update_bookkeeping(&self) {
        let mut in_flight = self.in_flight.lock();
        let before = in_flight.len();
        in_flight.retain(|batch| !batch.fence.is_reached(batch.fence_value));
        let released = before - in_flight.len();
        if released > 0 {
            log::trace!("released {released} in-flight resource batch(es)");
        }
    }

    /// Number of in-flight batches still gated on a fence.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Number of resources marked used but not yet submitted, on any queue.
    pub fn used_count(&self) -> usize {
        self.used.lock().values().map(Vec::len).sum()
    }

    /// Access to the creation scheduler, for stall checks
    /// ([`JobScheduler::is_stalling`]) and forced catch-ups.
    pub fn creation_scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }
}

impl Drop for ResourceLifetimeManager {
    fn drop(&mut self) {
        // Drain creation first so no job installs an object into a handle
        // we are about to release.
        self.scheduler.sync_all();

        // Then block on every still-in-flight fence; shutdown must never
        // race a GPU-visible deletion.
        let in_flight = std::mem::take(&mut *self.in_flight.lock());
        for batch in in_flight {
            if !batch
                .fence
                .wait(batch.fence_value, Some(Duration::from_secs(10)))
            {
                log::error!(
                    "shutdown: fence value {} never reached, releasing {} resource(s) anyway",
                    batch.fence_value,
                    batch.resources.len()
                );
            }
        }
    }
}

fn run_create_texture_job(payload: Box<dyn Any + Send>) {
    let job = payload
        .downcast::<CreateTextureJob>()
        .expect("create-texture job carries a CreateTextureJob payload");

    match job
        .factory
        .create_texture(job.resource.name(), job.format, job.extent, job.usage)
    {
        Ok(object) => {
            job.resource.set_device_object(object);
            job.pending_jobs.lock().remove(&job.resource.id());
            log::trace!("created resource '{}' asynchronously", job.resource.name());
        }
        Err(err) => {
            log::error!(
                "unrecoverable: device failed to create resource '{}': {err}",
                job.resource.name()
            );
            panic!("device resource creation failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::null::{NullFactory, NullQueue};

    fn manager_with(factory: NullFactory) -> ResourceLifetimeManager {
        ResourceLifetimeManager::new(Arc::new(factory))
    }

    fn schedule_texture(
        manager: &ResourceLifetimeManager,
        name: &str,
    ) -> Arc<GpuResource> {
        let resource = Arc::new(GpuResource::new_pending(name));
        manager.schedule_create_texture_resource(
            &resource,
            TextureFormat::Rgba8Unorm,
            Extent2d::new(64, 64),
            TextureUsage::SAMPLED,
        );
        resource
    }

    #[test]
    fn test_async_creation_completes() {
        let manager = manager_with(NullFactory::new());
        let resource = schedule_texture(&manager, "shadow_atlas");
        manager.creation_scheduler().sync_all();
        assert!(resource.is_valid());
    }

    #[test]
    fn test_wait_until_valid_forces_creation() {
        let manager = manager_with(NullFactory::with_creation_delay(Duration::from_millis(30)));
        // Several slow creations queued ahead.
        let _a = schedule_texture(&manager, "a");
        let _b = schedule_texture(&manager, "b");
        let _c = schedule_texture(&manager, "c");
        let target = schedule_texture(&manager, "target");

        manager.wait_until_resource_valid(&target);
        assert!(target.is_valid());
    }

    #[test]
    fn test_wait_on_already_valid_resource_is_noop() {
        let manager = manager_with(NullFactory::new());
        let resource = schedule_texture(&manager, "t");
        manager.creation_scheduler().sync_all();
        manager.wait_until_resource_valid(&resource);
        assert!(resource.is_valid());
    }

    #[test]
    fn test_mark_used_requires_valid_resource() {
        let manager = manager_with(NullFactory::new());
        let queue = SyncQueue::new("graphics", Arc::new(NullQueue::manual()));
        let invalid = Arc::new(GpuResource::new_pending("pending"));

        manager.mark_used(&invalid, &queue);
        assert_eq!(manager.used_count(), 0);
    }

    #[test]
    fn test_mark_used_deduplicates() {
        let manager = manager_with(NullFactory::new());
        let queue = SyncQueue::new("graphics", Arc::new(NullQueue::manual()));
        let resource = schedule_texture(&manager, "t");
        manager.creation_scheduler().sync_all();

        manager.mark_used(&resource, &queue);
        manager.mark_used(&resource, &queue);
        assert_eq!(manager.used_count(), 1);
    }

    #[test]
    fn test_retirement_waits_for_fence() {
        let backend = Arc::new(NullQueue::manual());
        let queue = SyncQueue::new("graphics", backend.clone());
        let manager = manager_with(NullFactory::new());
        let resource = schedule_texture(&manager, "t");
        manager.creation_scheduler().sync_all();

        manager.mark_used(&resource, &queue);
        let fence_value = queue.signal_fence();
        manager.on_command_lists_executed(&queue, fence_value);
        assert_eq!(manager.used_count(), 0);
        assert_eq!(manager.in_flight_count(), 1);

        // Fence not reached: the batch must survive bookkeeping.
        manager.update_bookkeeping();
        assert_eq!(manager.in_flight_count(), 1);

        backend.complete_to(fence_value);
        manager.update_bookkeeping();
        assert_eq!(manager.in_flight_count(), 0);
    }
}
