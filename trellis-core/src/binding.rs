// Binding definitions and the registry that owns them

use crate::{Container, Error};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A type-erased instance held by the container.
pub type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type ConstructFn = Arc<dyn Fn(&mut Dependencies) -> Result<Instance, Error> + Send + Sync>;
pub(crate) type FactoryFn = Arc<dyn Fn(&Container) -> Result<Instance, Error> + Send + Sync>;

/// Identity of a bindable type.
///
/// Equality and hashing only look at the `TypeId`; the name is kept for
/// diagnostics and by-name lookups.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full type path, e.g. `my_app::services::Mailer`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name, e.g. `Mailer`.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Whether `name` refers to this type, either by full path or short name.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.short_name() == name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// One instance for the lifetime of the container, built on first use.
    Shared,
    /// A fresh instance on every resolution.
    Dedicated,
}

/// The declared type of a constructor parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// A concrete service type, resolved through the container.
    Service(TypeKey),
    /// A reference by type name, matched against registered bindings.
    Named(String),
    /// A primitive such as `u16` or `String`; never injectable.
    Builtin(&'static str),
    /// No type information at all.
    Untyped,
}

/// One parameter of a constructor descriptor.
#[derive(Debug, Clone)]
pub struct ConstructorParam {
    pub name: &'static str,
    pub ty: ParamType,
    pub optional: bool,
    pub nullable: bool,
}

impl ConstructorParam {
    fn new(name: &'static str, ty: ParamType) -> Self {
        Self {
            name,
            ty,
            optional: false,
            nullable: false,
        }
    }
}

/// Declared constructor of an injectable type.
///
/// The parameter list describes what the type needs; the build closure
/// receives the resolved dependencies in declaration order.
///
/// ```
/// use std::sync::Arc;
/// use trellis_core::{Constructor, Injectable};
///
/// struct Clock;
///
/// impl Injectable for Clock {
///     fn constructor() -> Option<Constructor<Self>> {
///         Some(Constructor::new(|_| Ok(Clock)))
///     }
/// }
///
/// struct Scheduler {
///     clock: Arc<Clock>,
/// }
///
/// impl Injectable for Scheduler {
///     fn constructor() -> Option<Constructor<Self>> {
///         Some(
///             Constructor::new(|deps| Ok(Scheduler { clock: deps.next()? }))
///                 .inject::<Clock>("clock"),
///         )
///     }
/// }
/// ```
pub struct Constructor<T> {
    params: Vec<ConstructorParam>,
    build: Arc<dyn Fn(&mut Dependencies) -> Result<T, Error> + Send + Sync>,
}

impl<T: Send + Sync + 'static> Constructor<T> {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&mut Dependencies) -> Result<T, Error> + Send + Sync + 'static,
    {
        Self {
            params: Vec::new(),
            build: Arc::new(build),
        }
    }

    /// Require an instance of `D` from the container.
    pub fn inject<D: Send + Sync + 'static>(mut self, name: &'static str) -> Self {
        self.params
            .push(ConstructorParam::new(name, ParamType::Service(TypeKey::of::<D>())));
        self
    }

    /// Require a service registered under the given type name.
    pub fn inject_named(mut self, name: &'static str, type_name: impl Into<String>) -> Self {
        self.params
            .push(ConstructorParam::new(name, ParamType::Named(type_name.into())));
        self
    }

    /// Declare an optional service parameter.
    pub fn optional<D: Send + Sync + 'static>(mut self, name: &'static str) -> Self {
        let mut param = ConstructorParam::new(name, ParamType::Service(TypeKey::of::<D>()));
        param.optional = true;
        self.params.push(param);
        self
    }

    /// Declare a service parameter that accepts "no value".
    pub fn nullable<D: Send + Sync + 'static>(mut self, name: &'static str) -> Self {
        let mut param = ConstructorParam::new(name, ParamType::Service(TypeKey::of::<D>()));
        param.nullable = true;
        self.params.push(param);
        self
    }

    /// Declare a primitive parameter.
    pub fn builtin<B: 'static>(mut self, name: &'static str) -> Self {
        self.params.push(ConstructorParam::new(
            name,
            ParamType::Builtin(std::any::type_name::<B>()),
        ));
        self
    }

    /// Declare a parameter without type information.
    pub fn untyped(mut self, name: &'static str) -> Self {
        self.params.push(ConstructorParam::new(name, ParamType::Untyped));
        self
    }

    pub fn params(&self) -> &[ConstructorParam] {
        &self.params
    }

    pub(crate) fn into_parts(self) -> (Vec<ConstructorParam>, ConstructFn) {
        let build = self.build;
        let erased: ConstructFn = Arc::new(move |deps: &mut Dependencies| {
            let instance: Instance = Arc::new(build(deps)?);
            Ok(instance)
        });
        (self.params, erased)
    }
}

impl<T> fmt::Debug for Constructor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("params", &self.params)
            .finish()
    }
}

/// Resolved constructor arguments, handed out in declaration order.
pub struct Dependencies {
    owner: &'static str,
    values: std::vec::IntoIter<(TypeKey, Instance)>,
}

impl Dependencies {
    pub(crate) fn new(owner: &'static str, values: Vec<(TypeKey, Instance)>) -> Self {
        Self {
            owner,
            values: values.into_iter(),
        }
    }

    /// Take the next dependency as an `Arc<D>`.
    pub fn next<D: Send + Sync + 'static>(&mut self) -> Result<Arc<D>, Error> {
        let (key, instance) = self.values.next().ok_or(Error::MissingDependency {
            type_name: self.owner,
        })?;
        instance.downcast::<D>().map_err(|_| Error::TypeMismatch {
            expected: std::any::type_name::<D>(),
            found: key.name(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

/// How a binding produces its instance.
#[derive(Clone)]
pub(crate) enum Recipe {
    Construct(ConstructFn),
    Factory(FactoryFn),
}

/// A registered binding. Immutable once created.
#[derive(Clone)]
pub struct BindingDefinition {
    pub(crate) key: TypeKey,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) dependencies: Vec<TypeKey>,
    pub(crate) recipe: Recipe,
}

impl BindingDefinition {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn dependencies(&self) -> &[TypeKey] {
        &self.dependencies
    }

    pub fn has_factory(&self) -> bool {
        matches!(self.recipe, Recipe::Factory(_))
    }
}

impl fmt::Debug for BindingDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingDefinition")
            .field("key", &self.key)
            .field("lifecycle", &self.lifecycle)
            .field("dependencies", &self.dependencies)
            .field("factory", &self.has_factory())
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct BindingRegistry {
    definitions: HashMap<TypeKey, Arc<BindingDefinition>>,
}

impl BindingRegistry {
    /// Insert a definition, returning the one it replaced.
    pub(crate) fn insert(&mut self, definition: BindingDefinition) -> Option<Arc<BindingDefinition>> {
        self.definitions.insert(definition.key, Arc::new(definition))
    }

    pub(crate) fn restore(&mut self, key: TypeKey, previous: Option<Arc<BindingDefinition>>) {
        match previous {
            Some(previous) => {
                self.definitions.insert(key, previous);
            }
            None => {
                self.definitions.remove(&key);
            }
        }
    }

    pub(crate) fn get(&self, key: &TypeKey) -> Option<&Arc<BindingDefinition>> {
        self.definitions.get(key)
    }

    pub(crate) fn contains(&self, key: &TypeKey) -> bool {
        self.definitions.contains_key(key)
    }

    /// Look a binding up by full type path, then by short name.
    ///
    /// `Err` lists the candidates when several bindings share the short name.
    pub(crate) fn find_by_name(&self, name: &str) -> Result<Option<TypeKey>, Vec<&'static str>> {
        if let Some(key) = self.definitions.keys().find(|key| key.name() == name) {
            return Ok(Some(*key));
        }

        let mut matches: Vec<TypeKey> = self
            .definitions
            .keys()
            .filter(|key| key.short_name() == name)
            .copied()
            .collect();
        if matches.len() > 1 {
            let mut candidates: Vec<&'static str> = matches.iter().map(TypeKey::name).collect();
            candidates.sort_unstable();
            return Err(candidates);
        }
        Ok(matches.pop())
    }

    pub(crate) fn all(&self) -> impl Iterator<Item = &Arc<BindingDefinition>> {
        self.definitions.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Validate constructor parameters and return the dependency keys.
    pub(crate) fn inspect(
        &self,
        owner: TypeKey,
        params: &[ConstructorParam],
    ) -> Result<Vec<TypeKey>, Error> {
        let type_name = owner.name();
        let mut dependencies = Vec::with_capacity(params.len());

        for param in params {
            if param.optional {
                return Err(Error::OptionalParameter {
                    type_name,
                    param: param.name,
                });
            }
            if param.nullable {
                return Err(Error::NullableParameter {
                    type_name,
                    param: param.name,
                });
            }
            let key = match &param.ty {
                ParamType::Untyped => {
                    return Err(Error::MissingType {
                        type_name,
                        param: param.name,
                    });
                }
                ParamType::Builtin(builtin) => {
                    return Err(Error::BuiltinType {
                        type_name,
                        param: param.name,
                        builtin: *builtin,
                    });
                }
                ParamType::Named(referenced) => {
                    if owner.answers_to(referenced) {
                        owner
                    } else {
                        match self.find_by_name(referenced) {
                            Ok(Some(key)) => key,
                            Ok(None) => {
                                return Err(Error::UnknownType {
                                    type_name,
                                    param: param.name,
                                    referenced: referenced.clone(),
                                });
                            }
                            Err(candidates) => {
                                return Err(Error::AmbiguousType {
                                    type_name,
                                    param: param.name,
                                    referenced: referenced.clone(),
                                    candidates,
                                });
                            }
                        }
                    }
                }
                ParamType::Service(key) => *key,
            };
            if key == owner {
                return Err(Error::SelfDependency {
                    type_name,
                    param: param.name,
                });
            }
            dependencies.push(key);
        }

        Ok(dependencies)
    }

    /// One-hop cycle check: no dependency may list its dependent.
    ///
    /// Longer cycles (A -> B -> C -> A) pass here and are reported when the
    /// container first tries to resolve them.
    pub(crate) fn ensure_no_cycles(&self) -> Result<(), Error> {
        for definition in self.all() {
            for dependency in &definition.dependencies {
                let Some(dependency_definition) = self.get(dependency) else {
                    continue;
                };
                if dependency_definition.dependencies.contains(&definition.key) {
                    return Err(Error::CyclicDependency {
                        type_name: definition.key.name(),
                        dependency: dependency.name(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mailer;
    struct Outbox;

    fn definition(key: TypeKey, dependencies: Vec<TypeKey>) -> BindingDefinition {
        BindingDefinition {
            key,
            lifecycle: Lifecycle::Shared,
            dependencies,
            recipe: Recipe::Factory(Arc::new(|_: &Container| Ok(Arc::new(()) as Instance))),
        }
    }

    #[test]
    fn test_type_key_names() {
        let key = TypeKey::of::<Mailer>();
        assert!(key.name().ends_with("Mailer"));
        assert_eq!(key.short_name(), "Mailer");
        assert!(key.answers_to("Mailer"));
        assert!(!key.answers_to("Outbox"));
        assert_eq!(key, TypeKey::of::<Mailer>());
        assert_ne!(key, TypeKey::of::<Outbox>());
    }

    #[test]
    fn test_inspect_checks_in_order() {
        let registry = BindingRegistry::default();
        let owner = TypeKey::of::<Mailer>();

        let mut param = ConstructorParam::new("x", ParamType::Untyped);
        param.optional = true;
        param.nullable = true;
        assert!(matches!(
            registry.inspect(owner, &[param.clone()]),
            Err(Error::OptionalParameter { param: "x", .. })
        ));

        param.optional = false;
        assert!(matches!(
            registry.inspect(owner, &[param.clone()]),
            Err(Error::NullableParameter { .. })
        ));

        param.nullable = false;
        assert!(matches!(
            registry.inspect(owner, &[param]),
            Err(Error::MissingType { .. })
        ));
    }

    #[test]
    fn test_inspect_resolves_named_references() {
        let mut registry = BindingRegistry::default();
        registry.insert(definition(TypeKey::of::<Outbox>(), vec![]));

        let params = [ConstructorParam::new("outbox", ParamType::Named("Outbox".into()))];
        let deps = registry.inspect(TypeKey::of::<Mailer>(), &params).unwrap();
        assert_eq!(deps, vec![TypeKey::of::<Outbox>()]);

        let params = [ConstructorParam::new("queue", ParamType::Named("Queue".into()))];
        assert!(matches!(
            registry.inspect(TypeKey::of::<Mailer>(), &params),
            Err(Error::UnknownType { .. })
        ));
    }

    mod billing {
        pub struct Store;
    }

    mod catalog {
        pub struct Store;
    }

    #[test]
    fn test_shared_short_name_is_ambiguous() {
        let mut registry = BindingRegistry::default();
        registry.insert(definition(TypeKey::of::<billing::Store>(), vec![]));
        registry.insert(definition(TypeKey::of::<catalog::Store>(), vec![]));

        let params = [ConstructorParam::new("store", ParamType::Named("Store".into()))];
        let err = registry.inspect(TypeKey::of::<Mailer>(), &params).unwrap_err();
        assert!(matches!(
            err,
            Error::AmbiguousType { ref candidates, .. } if candidates.len() == 2
        ));

        let full = TypeKey::of::<catalog::Store>().name();
        let params = [ConstructorParam::new("store", ParamType::Named(full.into()))];
        let deps = registry.inspect(TypeKey::of::<Mailer>(), &params).unwrap();
        assert_eq!(deps, vec![TypeKey::of::<catalog::Store>()]);
    }

    #[test]
    fn test_named_self_reference_is_self_dependency() {
        let registry = BindingRegistry::default();
        let params = [ConstructorParam::new("me", ParamType::Named("Mailer".into()))];
        assert!(matches!(
            registry.inspect(TypeKey::of::<Mailer>(), &params),
            Err(Error::SelfDependency { param: "me", .. })
        ));
    }

    #[test]
    fn test_one_hop_cycle_detected() {
        let mut registry = BindingRegistry::default();
        let a = TypeKey::of::<Mailer>();
        let b = TypeKey::of::<Outbox>();
        registry.insert(definition(a, vec![b]));
        assert!(registry.ensure_no_cycles().is_ok());

        registry.insert(definition(b, vec![a]));
        assert!(matches!(
            registry.ensure_no_cycles(),
            Err(Error::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_restore_previous_definition() {
        let mut registry = BindingRegistry::default();
        let a = TypeKey::of::<Mailer>();
        let previous = registry.insert(definition(a, vec![]));
        assert!(previous.is_none());

        let previous = registry.insert(definition(a, vec![TypeKey::of::<Outbox>()]));
        registry.restore(a, previous);
        assert!(registry.get(&a).unwrap().dependencies.is_empty());
        assert_eq!(registry.len(), 1);

        registry.restore(a, None);
        assert!(!registry.contains(&a));
    }
}
