use alloc::boxed::Box;

use heapless::{Deque, Vec};
use log::{debug, warn};

use super::{
    Access, DeliveryStatus, Method, Methods, ResourceError, ResourceName, ResourcePath,
    ResourceValue,
};

/// Maximum number of resources a table holds
pub const MAX_RESOURCES: usize = 8;

/// Invoked after a remote PUT stored a new value
pub type PutCallback = Box<dyn FnMut(&str, &ResourceValue) + Send>;
/// Invoked when the server executes a resource; receives the POST body
pub type PostCallback = Box<dyn FnMut(&str, &[u8]) + Send>;
/// Invoked with the delivery outcome of a push-notification
pub type NotificationCallback = Box<dyn FnMut(&str, DeliveryStatus) + Send>;

/// Lightweight reference to a resource owned by a [`ResourceTable`]
///
/// Handles are only produced by [`ResourceTable::create`] and stay valid for
/// the lifetime of the table that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceHandle(u8);

impl ResourceHandle {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A value exposed to the management server
pub struct Resource {
    path: ResourcePath,
    display_name: ResourceName,
    value: ResourceValue,
    allowed_methods: Methods,
    observable: bool,
    on_put: Option<PutCallback>,
    on_post: Option<PostCallback>,
    on_notification_status: Option<NotificationCallback>,
}

impl Resource {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn value(&self) -> &ResourceValue {
        &self.value
    }

    pub fn allowed_methods(&self) -> Methods {
        self.allowed_methods
    }

    pub fn is_observable(&self) -> bool {
        self.observable
    }

    /// Replace the set of methods the server may invoke
    pub fn methods(&mut self, methods: Methods) -> &mut Self {
        self.allowed_methods = methods;
        self
    }

    pub fn observable(&mut self, observable: bool) -> &mut Self {
        self.observable = observable;
        self
    }

    /// Initial value, set before the resource is published
    pub fn initial_value(&mut self, value: ResourceValue) -> &mut Self {
        self.value = value;
        self
    }

    pub fn attach_put_callback(&mut self, callback: PutCallback) -> &mut Self {
        self.on_put = Some(callback);
        self
    }

    pub fn attach_post_callback(&mut self, callback: PostCallback) -> &mut Self {
        self.on_post = Some(callback);
        self
    }

    pub fn attach_notification_callback(&mut self, callback: NotificationCallback) -> &mut Self {
        self.on_notification_status = Some(callback);
        self
    }

    fn check(&self, method: Method) -> Result<(), ResourceError> {
        if self.allowed_methods.contains(method) {
            Ok(())
        } else {
            Err(ResourceError::MethodNotAllowed {
                path: self.path.clone(),
                method,
                allowed: self.allowed_methods,
            })
        }
    }
}

/// Everything the management client needs to publish a resource
#[derive(Debug, Clone, Copy)]
pub struct ResourceDescriptor<'a> {
    pub path: &'a str,
    pub display_name: &'a str,
    pub value: &'a ResourceValue,
    pub methods: Methods,
    pub observable: bool,
}

/// Owned set of resources keyed by path
///
/// All methods run on the worker thread; callbacks are invoked synchronously
/// from inside them, so no two callbacks ever run at the same time.
pub struct ResourceTable {
    resources: Vec<Resource, MAX_RESOURCES>,
    pending_notifications: Deque<ResourceHandle, MAX_RESOURCES>,
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTable {
    pub const fn new() -> Self {
        Self {
            resources: Vec::new(),
            pending_notifications: Deque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Create a GET-only, non-observable resource holding `0`
    pub fn create(
        &mut self,
        path: &str,
        display_name: &str,
    ) -> Result<ResourceHandle, ResourceError> {
        if path.is_empty() {
            return Err(ResourceError::InvalidPath);
        }
        if let Some(existing) = self.find(path) {
            return Err(ResourceError::DuplicatePath(
                self.resources[existing.index()].path.clone(),
            ));
        }
        let path = ResourcePath::try_from(path).map_err(|_| ResourceError::InvalidPath)?;
        let display_name =
            ResourceName::try_from(display_name).map_err(|_| ResourceError::InvalidPath)?;

        let handle = ResourceHandle(self.resources.len() as u8);
        self.resources
            .push(Resource {
                path,
                display_name,
                value: ResourceValue::default(),
                allowed_methods: Methods::GET,
                observable: false,
                on_put: None,
                on_post: None,
                on_notification_status: None,
            })
            .map_err(|_| ResourceError::TableFull)?;

        let created = &self.resources[handle.index()];
        debug!("Created resource {} ({})", created.path, created.display_name);
        Ok(handle)
    }

    /// Configure a resource created by this table
    pub fn resource_mut(&mut self, handle: ResourceHandle) -> &mut Resource {
        &mut self.resources[handle.index()]
    }

    pub fn resource(&self, handle: ResourceHandle) -> &Resource {
        &self.resources[handle.index()]
    }

    pub fn find(&self, path: &str) -> Option<ResourceHandle> {
        self.resources
            .iter()
            .position(|r| r.path.as_str() == path)
            .map(|i| ResourceHandle(i as u8))
    }

    pub fn get_value(&self, handle: ResourceHandle) -> &ResourceValue {
        &self.resources[handle.index()].value
    }

    pub fn descriptor(&self, handle: ResourceHandle) -> ResourceDescriptor<'_> {
        let resource = &self.resources[handle.index()];
        ResourceDescriptor {
            path: resource.path.as_str(),
            display_name: resource.display_name.as_str(),
            value: &resource.value,
            methods: resource.allowed_methods,
            observable: resource.observable,
        }
    }

    pub fn handles(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        (0..self.resources.len()).map(|i| ResourceHandle(i as u8))
    }

    /// Store a new value on behalf of `access`
    ///
    /// Local writes are always accepted. Remote writes must be a PUT the
    /// resource allows; anything else is rejected and the value is left as is.
    /// Observable resources get a notification scheduled on success.
    pub fn set_value(
        &mut self,
        handle: ResourceHandle,
        access: Access,
        value: ResourceValue,
    ) -> Result<(), ResourceError> {
        let resource = &mut self.resources[handle.index()];
        let remote_put = match access {
            Access::Local => false,
            Access::Remote(Method::Put) => {
                resource.check(Method::Put)?;
                true
            }
            // GET reads and POST executes; neither assigns a value
            Access::Remote(method) => {
                return Err(ResourceError::MethodNotAllowed {
                    path: resource.path.clone(),
                    method,
                    allowed: resource.allowed_methods,
                });
            }
        };

        resource.value = value;
        if remote_put {
            if let Some(on_put) = resource.on_put.as_mut() {
                on_put(resource.path.as_str(), &resource.value);
            }
        }
        if resource.observable {
            self.schedule_notification(handle);
        }
        Ok(())
    }

    /// Remote PUT addressed by path
    pub fn remote_put(&mut self, path: &str, value: ResourceValue) -> Result<(), ResourceError> {
        let handle = self.lookup(path)?;
        self.set_value(handle, Access::Remote(Method::Put), value)
    }

    /// Execute a resource (remote POST); the value is not modified
    pub fn execute(&mut self, handle: ResourceHandle, payload: &[u8]) -> Result<(), ResourceError> {
        let resource = &mut self.resources[handle.index()];
        resource.check(Method::Post)?;
        if let Some(on_post) = resource.on_post.as_mut() {
            on_post(resource.path.as_str(), payload);
        }
        Ok(())
    }

    /// Remote POST addressed by path
    pub fn remote_post(&mut self, path: &str, payload: &[u8]) -> Result<(), ResourceError> {
        let handle = self.lookup(path)?;
        self.execute(handle, payload)
    }

    /// Next resource whose value should be pushed to the server
    pub fn next_notification(&mut self) -> Option<ResourceHandle> {
        self.pending_notifications.pop_front()
    }

    /// Hand a delivery outcome to the resource's status callback
    ///
    /// The table never retries; that decision belongs to the callback owner.
    pub fn report_delivery(&mut self, handle: ResourceHandle, status: DeliveryStatus) {
        let resource = &mut self.resources[handle.index()];
        match resource.on_notification_status.as_mut() {
            Some(callback) => callback(resource.path.as_str(), status),
            None => debug!(
                "Notification on {} finished with status {}",
                resource.path,
                status.label()
            ),
        }
    }

    fn lookup(&self, path: &str) -> Result<ResourceHandle, ResourceError> {
        self.find(path).ok_or_else(|| {
            ResourceError::UnknownPath(ResourcePath::try_from(path).unwrap_or_default())
        })
    }

    fn schedule_notification(&mut self, handle: ResourceHandle) {
        // One pending entry per resource; the push always carries the latest value
        if self.pending_notifications.iter().any(|h| *h == handle) {
            return;
        }
        if self.pending_notifications.push_back(handle).is_err() {
            warn!(
                "Notification queue full, skipping {}",
                self.resources[handle.index()].path
            );
        }
    }
}
