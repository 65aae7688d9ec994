use std::sync::Arc;

use parking_lot::RwLock;

use shared::{
    domain::{ControllerDescription, ControllerRole, DocumentDescriptor},
    error::{DocumentError, DocumentResult},
};
use tracing::debug;

use crate::{ControllerFactory, DocumentController};

/// The factory that claimed a descriptor and the views it offers.
#[derive(Clone)]
pub struct Resolution {
    pub factory: Arc<dyn ControllerFactory>,
    pub descriptions: Vec<ControllerDescription>,
}

impl Resolution {
    /// First description flagged as default, else the first offered.
    pub fn default_description(&self) -> Option<&ControllerDescription> {
        self.descriptions
            .iter()
            .find(|description| description.is_default)
            .or_else(|| self.descriptions.first())
    }

    pub fn description_for(&self, role: ControllerRole) -> Option<&ControllerDescription> {
        self.descriptions
            .iter()
            .find(|description| description.role == role)
    }
}

/// Ordered set of controller factories. Registration order decides which
/// factory wins when several support the same descriptor.
#[derive(Default)]
pub struct ControllerFactoryRegistry {
    factories: RwLock<Vec<Arc<dyn ControllerFactory>>>,
}

impl ControllerFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_factory(&self, factory: Arc<dyn ControllerFactory>) {
        debug!(factory = factory.name(), "registered controller factory");
        self.factories.write().push(factory);
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolve(&self, descriptor: &DocumentDescriptor) -> DocumentResult<Resolution> {
        let factories = self.factories.read().clone();

        let mut any_supported = false;
        for factory in factories {
            if !factory.supports(descriptor) {
                continue;
            }
            any_supported = true;
            let descriptions = factory.supported_controllers(descriptor);
            if !descriptions.is_empty() {
                return Ok(Resolution {
                    factory,
                    descriptions,
                });
            }
        }

        if any_supported {
            Err(DocumentError::NoControllerAvailable {
                descriptor: descriptor.to_string(),
            })
        } else {
            Err(DocumentError::UnsupportedDescriptor {
                descriptor: descriptor.to_string(),
            })
        }
    }

    pub fn supported_controllers(
        &self,
        descriptor: &DocumentDescriptor,
    ) -> DocumentResult<Vec<ControllerDescription>> {
        self.resolve(descriptor)
            .map(|resolution| resolution.descriptions)
    }

    /// Creates the requested view, or the default one when `role` is `None`.
    pub async fn create_controller(
        &self,
        descriptor: &DocumentDescriptor,
        role: Option<ControllerRole>,
    ) -> DocumentResult<(ControllerDescription, Arc<dyn DocumentController>)> {
        let resolution = self.resolve(descriptor)?;
        let description = match role {
            Some(role) => resolution.description_for(role),
            None => resolution.default_description(),
        }
        .cloned()
        .ok_or_else(|| DocumentError::NoControllerAvailable {
            descriptor: descriptor.to_string(),
        })?;

        let controller = resolution
            .factory
            .create_controller(descriptor, &description)
            .await
            .map_err(|source| DocumentError::ControllerCreation {
                factory: resolution.factory.name().to_string(),
                descriptor: descriptor.to_string(),
                source,
            })?;
        debug!(
            factory = resolution.factory.name(),
            view = %description.name,
            %descriptor,
            "created controller"
        );
        Ok((description, controller))
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
