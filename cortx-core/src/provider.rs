//! Provider - Trait abstracting resource operations
//!
//! A Provider maps resources onto calls against a concrete backend. It owns the
//! client, translates backend failures into [`ProviderError`], and reports the
//! remote view of each resource as a [`State`].

use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "cortx.bucket")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::default()
    }
}

/// Attribute rules the differ needs to know about
#[derive(Debug, Default, Clone)]
pub struct ResourceSchema {
    /// Attributes whose change requires destroying and recreating the resource
    pub force_new: Vec<&'static str>,
    /// Attributes that only drive provider behaviour and are never read back
    pub local_only: Vec<&'static str>,
}

impl ResourceSchema {
    pub fn with_force_new(mut self, attributes: &[&'static str]) -> Self {
        self.force_new.extend_from_slice(attributes);
        self
    }

    pub fn with_local_only(mut self, attributes: &[&'static str]) -> Self {
        self.local_only.extend_from_slice(attributes);
        self
    }

    pub fn is_force_new(&self, attribute: &str) -> bool {
        self.force_new.contains(&attribute)
    }

    pub fn is_local_only(&self, attribute: &str) -> bool {
        self.local_only.contains(&attribute)
    }
}

/// Main Provider trait
///
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "cortx")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// If identifier is provided, use it to read the resource directly.
    /// Otherwise, fall back to the resource name.
    /// Returns `State::not_found()` if the resource does not exist.
    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Read a data source; the resource's attributes are the query arguments
    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let id = resource.id.clone();
        Box::pin(async move {
            Err(ProviderError::new("Data sources are not supported by this provider")
                .for_resource(id))
        })
    }

    /// Create a resource
    ///
    /// Returns State with identifier set to the remote ID
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    ///
    /// The declared resource is passed so that delete-time options such as
    /// `force_destroy` are visible to the provider.
    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read_data_source(resource)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(resource, identifier)
    }
}
