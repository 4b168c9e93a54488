//! Physical GPU resource handles.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::backend::DeviceResource;
use crate::barrier::ResourceState;

/// Handle to a physical device resource plus its client-side tracked state.
///
/// Two lifecycles intersect here:
///
/// - **Creation** may be asynchronous: the handle starts invalid and becomes
///   valid once a background creation job installs the device object (see
///   [`ResourceLifetimeManager`](crate::lifetime::ResourceLifetimeManager)).
/// - **Retirement** is deferred: the handle is only dropped after every queue
///   that marked it used has reached the fence value recorded at that usage.
///
/// State transitions must go through
/// [`ResourceStateTracker`](crate::barrier::ResourceStateTracker); mutating a
/// resource behind the tracker's back desynchronizes the client-side state
/// from the device.
#[derive(Debug)]
pub struct GpuResource {
    name: String,
    id: u64,
    device_object: RwLock<Option<Box<dyn DeviceResource>>>,
    state: Mutex<ResourceState>,
}

impl GpuResource {
    /// Create an invalid handle; the device object is installed later.
    pub fn new_pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: next_resource_id(),
            device_object: RwLock::new(None),
            state: Mutex::new(ResourceState::Common),
        }
    }

    /// Create a handle that is valid immediately.
    pub fn new_with_object(name: impl Into<String>, object: Box<dyn DeviceResource>) -> Self {
        Self {
            name: name.into(),
            id: next_resource_id(),
            device_object: RwLock::new(Some(object)),
            state: Mutex::new(ResourceState::Common),
        }
    }

    /// Debug name of the resource.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process-unique id of this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the device object has been created.
    pub fn is_valid(&self) -> bool {
        self.device_object.read().is_some()
    }

    /// Install the device object, making the handle valid.
    ///
    /// Called by the creation job (or synchronously by the allocate phase).
    pub fn set_device_object(&self, object: Box<dyn DeviceResource>) {
        let mut slot = self.device_object.write();
        if slot.is_some() {
            log::warn!("resource '{}' already has a device object", self.name);
        }
        *slot = Some(object);
    }

    /// Run `f` against the device object, if the handle is valid.
    pub fn with_device_object<R>(&self, f: impl FnOnce(&dyn DeviceResource) -> R) -> Option<R> {
        self.device_object.read().as_deref().map(f)
    }

    /// Client-side tracked state.
    pub fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    /// Update the client-side tracked state.
    ///
    /// Reserved for the state tracker; the new state is assumed to take
    /// effect once the batched barrier executes on the device.
    pub(crate) fn set_state(&self, state: ResourceState) {
        *self.state.lock() = state;
    }
}

fn next_resource_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}
