// Dependency injection container

use crate::binding::{BindingDefinition, BindingRegistry, Dependencies, FactoryFn, Instance, Recipe};
use crate::logging::{debug, trace};
use crate::{Error, Injectable, Lifecycle, TypeKey};
use parking_lot::{Mutex, RwLock};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

thread_local! {
    static RESOLVING: RefCell<Vec<TypeKey>> = const { RefCell::new(Vec::new()) };
}

/// Marks a type as being resolved on this thread; popped on drop.
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter(key: TypeKey) -> Result<Self, Error> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack.iter().position(|k| *k == key) {
                let mut path: Vec<&'static str> = stack[start..].iter().map(|k| k.name()).collect();
                path.push(key.name());
                return Err(Error::CircularResolution { path });
            }
            stack.push(key);
            Ok(ResolutionGuard)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The dependency injection container.
///
/// Bindings are declared up front; instances are built on demand by
/// resolving declared dependencies first. Cloning a container is cheap and
/// every clone shares the same bindings and shared-instance cache.
#[derive(Clone, Default)]
pub struct Container {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    registry: RwLock<BindingRegistry>,
    shared: Mutex<HashMap<TypeKey, Instance>>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new DI container");
        Self::default()
    }

    /// Register `T` as a shared binding built from its declared constructor.
    pub fn register_shared<T: Injectable>(&self) -> Result<(), Error> {
        self.register::<T>(Lifecycle::Shared, None)
    }

    /// Register `T` as a dedicated binding built from its declared constructor.
    pub fn register_dedicated<T: Injectable>(&self) -> Result<(), Error> {
        self.register::<T>(Lifecycle::Dedicated, None)
    }

    /// Register `T` as a shared binding built by `factory`.
    ///
    /// If `T` declares a constructor, its parameters are still validated and
    /// resolved before the factory runs.
    pub fn register_shared_with<T, F>(&self, factory: F) -> Result<(), Error>
    where
        T: Injectable,
        F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.register::<T>(Lifecycle::Shared, Some(erase_factory(factory)))
    }

    /// Register `T` as a dedicated binding built by `factory`.
    pub fn register_dedicated_with<T, F>(&self, factory: F) -> Result<(), Error>
    where
        T: Injectable,
        F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.register::<T>(Lifecycle::Dedicated, Some(erase_factory(factory)))
    }

    /// Register an already-built shared instance.
    pub fn register_instance<T: Send + Sync + 'static>(&self, instance: Arc<T>) -> Result<(), Error> {
        let key = TypeKey::of::<T>();
        let factory: FactoryFn = Arc::new(move |_: &Container| {
            let instance: Instance = instance.clone();
            Ok(instance)
        });
        self.insert(BindingDefinition {
            key,
            lifecycle: Lifecycle::Shared,
            dependencies: Vec::new(),
            recipe: Recipe::Factory(factory),
        })
    }

    fn register<T: Injectable>(
        &self,
        lifecycle: Lifecycle,
        factory: Option<FactoryFn>,
    ) -> Result<(), Error> {
        let key = TypeKey::of::<T>();
        trace!(binding = key.name(), ?lifecycle, "Inspecting constructor");

        let constructor = T::constructor();
        let (params, construct) = match constructor {
            Some(constructor) => {
                let (params, construct) = constructor.into_parts();
                (params, Some(construct))
            }
            None => (Vec::new(), None),
        };

        let recipe = match (factory, construct) {
            (Some(factory), _) => Recipe::Factory(factory),
            (None, Some(construct)) => Recipe::Construct(construct),
            (None, None) => return Err(Error::NoConstructor { type_name: key.name() }),
        };

        let dependencies = self.inner.registry.read().inspect(key, &params)?;

        self.insert(BindingDefinition {
            key,
            lifecycle,
            dependencies,
            recipe,
        })
    }

    /// Insert a definition and re-run the cycle check, rolling back on failure.
    fn insert(&self, definition: BindingDefinition) -> Result<(), Error> {
        let key = definition.key;
        let lifecycle = definition.lifecycle;
        let dependency_count = definition.dependencies.len();

        let mut registry = self.inner.registry.write();
        let previous = registry.insert(definition);
        if let Err(err) = registry.ensure_no_cycles() {
            registry.restore(key, previous);
            debug!(binding = key.name(), error = %err, "Binding rejected");
            return Err(err);
        }
        drop(registry);

        if previous.is_some() {
            self.inner.shared.lock().remove(&key);
        }

        debug!(
            binding = key.name(),
            ?lifecycle,
            dependencies = dependency_count,
            "Binding registered in DI container"
        );
        Ok(())
    }

    /// Resolve an instance of `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        let key = TypeKey::of::<T>();
        self.resolve(key)?
            .downcast::<T>()
            .map_err(|_| Error::TypeMismatch {
                expected: key.name(),
                found: "<erased instance>",
            })
    }

    /// Resolve a type-erased instance by key.
    pub fn resolve(&self, key: TypeKey) -> Result<Instance, Error> {
        trace!(binding = key.name(), "Attempting to resolve binding");

        let definition = self
            .inner
            .registry
            .read()
            .get(&key)
            .cloned()
            .ok_or(Error::UnknownBinding { type_name: key.name() })?;

        if definition.lifecycle == Lifecycle::Shared {
            if let Some(instance) = self.inner.shared.lock().get(&key) {
                trace!(binding = key.name(), "Returning cached shared instance");
                return Ok(instance.clone());
            }
        }

        let instance = {
            let _guard = ResolutionGuard::enter(key)?;
            self.create_instance(&definition)?
        };

        if definition.lifecycle == Lifecycle::Shared {
            // First instance wins if another thread raced us here.
            let instance = self
                .inner
                .shared
                .lock()
                .entry(key)
                .or_insert(instance)
                .clone();
            debug!(binding = key.name(), "Shared instance created");
            return Ok(instance);
        }

        debug!(binding = key.name(), "Dedicated instance created");
        Ok(instance)
    }

    fn create_instance(&self, definition: &BindingDefinition) -> Result<Instance, Error> {
        let mut resolved = Vec::with_capacity(definition.dependencies.len());
        for dependency in &definition.dependencies {
            resolved.push((*dependency, self.resolve(*dependency)?));
        }

        match &definition.recipe {
            Recipe::Factory(factory) => factory(self),
            Recipe::Construct(construct) => {
                let mut dependencies = Dependencies::new(definition.key.name(), resolved);
                construct(&mut dependencies)
            }
        }
    }

    /// Check if a binding is registered for `T`.
    pub fn has<T: 'static>(&self) -> bool {
        self.has_key(TypeKey::of::<T>())
    }

    /// Check if a binding is registered for `key`.
    pub fn has_key(&self, key: TypeKey) -> bool {
        let exists = self.inner.registry.read().contains(&key);
        trace!(binding = key.name(), exists = exists, "Checked binding existence");
        exists
    }

    /// The registered definition for `T`, if any.
    pub fn definition<T: 'static>(&self) -> Option<BindingDefinition> {
        self.inner
            .registry
            .read()
            .get(&TypeKey::of::<T>())
            .map(|definition| (**definition).clone())
    }

    pub fn len(&self) -> usize {
        self.inner.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn erase_factory<T, F>(factory: F) -> FactoryFn
where
    T: Send + Sync + 'static,
    F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
{
    Arc::new(move |container: &Container| {
        let instance: Instance = Arc::new(factory(container)?);
        Ok(instance)
    })
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.len())
            .field("shared_instances", &self.inner.shared.lock().len())
            .finish()
    }
}
