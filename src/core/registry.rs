//! Block Registry - Central catalogue of block types
//!
//! This module provides the thread-safe type registry used to materialize
//! blocks by name or by wire type identifier. It supports:
//! - Type registration and unregistration
//! - O(1) lookup by type name and by type identifier
//! - Instantiation of default blocks through per-type factories
//! - Bidirectional mapping between property slots and property identifiers

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::block::{AsAny, Block, BlockType, Library};
use super::flags::BlockFlags;
use super::property::PropertyDescriptor;

/// Stable 32-bit hash of a type or property name (FNV-1a).
///
/// Type and property identifiers on the wire are produced by this function,
/// so it must never change within a stream format version.
pub fn name_hash(name: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    name.bytes()
        .fold(OFFSET_BASIS, |hash, byte| (hash ^ u32::from(byte)).wrapping_mul(PRIME))
}

/// Named add-on attached to a registered block type.
///
/// Several extensions may share a name; lookups by name return them in
/// registration order.
pub trait BlockExtension: AsAny + Send + Sync + 'static {
    fn extension_name(&self) -> &str;
}

fn create_default<T: BlockType>() -> Box<dyn Block> {
    Box::new(T::default())
}

/// Registry entry of one block type.
///
/// Holds the type's identifiers, its property table and the factory producing
/// default instances. Entries are immutable once built, except for the
/// live-instance counter.
pub struct MetaBlock {
    name: &'static str,
    type_id: u32,
    default_flags: BlockFlags,
    properties: Vec<PropertyDescriptor>,
    property_ids: Vec<u32>,
    slots_by_id: HashMap<u32, usize>,
    factory: fn() -> Box<dyn Block>,
    instances: AtomicUsize,
    extensions: RwLock<Vec<Arc<dyn BlockExtension>>>,
}

impl MetaBlock {
    /// Build the registry entry of `T`.
    ///
    /// # Returns
    /// * `Ok(MetaBlock)` with the type identifier and property cache computed
    /// * `Err(RegistryError::PropertyIdCollision)` if two properties of `T` hash
    ///   to the same identifier
    pub fn of<T: BlockType>() -> Result<Self, RegistryError> {
        let properties = T::properties();
        let mut property_ids = Vec::with_capacity(properties.len());
        let mut slots_by_id = HashMap::with_capacity(properties.len());

        for (slot, property) in properties.iter().enumerate() {
            let id = name_hash(property.name());
            if let Some(&existing) = slots_by_id.get(&id) {
                let existing: &PropertyDescriptor = &properties[existing];
                return Err(RegistryError::PropertyIdCollision {
                    type_name: T::TYPE_NAME.to_string(),
                    property: property.name().to_string(),
                    existing: existing.name().to_string(),
                    id,
                });
            }
            slots_by_id.insert(id, slot);
            property_ids.push(id);
        }

        Ok(Self {
            name: T::TYPE_NAME,
            type_id: name_hash(T::TYPE_NAME),
            default_flags: T::default_flags(),
            properties,
            property_ids,
            slots_by_id,
            factory: create_default::<T>,
            instances: AtomicUsize::new(0),
            extensions: RwLock::new(Vec::new()),
        })
    }

    /// Registered type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wire type identifier
    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    /// Flags set on freshly created instances
    pub fn default_flags(&self) -> BlockFlags {
        self.default_flags
    }

    /// Property table, in declaration order
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Descriptor at `slot`
    pub fn property(&self, slot: usize) -> Option<&PropertyDescriptor> {
        self.properties.get(slot)
    }

    /// Wire identifier of the property at `slot`
    pub fn property_id(&self, slot: usize) -> Option<u32> {
        self.property_ids.get(slot).copied()
    }

    /// Slot of the property with wire identifier `id`
    pub fn property_slot(&self, id: u32) -> Option<usize> {
        self.slots_by_id.get(&id).copied()
    }

    /// Slot of the property called `name`
    pub fn property_slot_by_name(&self, name: &str) -> Option<usize> {
        self.property_slot(name_hash(name))
            .filter(|&slot| self.properties[slot].name() == name)
    }

    /// Default-construct an instance, counting it as alive.
    ///
    /// The instance must be handed back through [`MetaBlock::release_block`].
    pub fn create_block(&self) -> Box<dyn Block> {
        self.instances.fetch_add(1, Ordering::AcqRel);
        (self.factory)()
    }

    /// Reclaim an instance produced by [`MetaBlock::create_block`].
    pub fn release_block(&self, block: Box<dyn Block>) {
        debug_assert_eq!(block.type_name(), self.name);
        let previous = self.instances.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "released more {} blocks than created", self.name);
        drop(block);
    }

    /// Number of live instances created through this entry
    pub fn instance_count(&self) -> usize {
        self.instances.load(Ordering::Acquire)
    }

    /// Whether the entry may be unregistered
    pub fn can_unload(&self) -> bool {
        self.instance_count() == 0
    }

    /// Attach an extension to this type.
    ///
    /// Returns `false` if this very extension is already attached.
    pub fn register_extension(&self, extension: Arc<dyn BlockExtension>) -> bool {
        let mut extensions = self.extensions.write();
        if extensions.iter().any(|e| Arc::ptr_eq(e, &extension)) {
            return false;
        }
        debug!(
            type_name = self.name,
            extension = extension.extension_name(),
            "Registered block extension"
        );
        extensions.push(extension);
        true
    }

    /// Detach an extension, returning whether it was attached
    pub fn unregister_extension(&self, extension: &Arc<dyn BlockExtension>) -> bool {
        let mut extensions = self.extensions.write();
        let before = extensions.len();
        extensions.retain(|e| !Arc::ptr_eq(e, extension));
        extensions.len() != before
    }

    /// First extension registered under `name`
    pub fn extension(&self, name: &str) -> Option<Arc<dyn BlockExtension>> {
        self.extensions
            .read()
            .iter()
            .find(|e| e.extension_name() == name)
            .cloned()
    }

    /// Every extension registered under `name`
    pub fn extensions_named(&self, name: &str) -> Vec<Arc<dyn BlockExtension>> {
        self.extensions
            .read()
            .iter()
            .filter(|e| e.extension_name() == name)
            .cloned()
            .collect()
    }

    pub fn extension_count(&self) -> usize {
        self.extensions.read().len()
    }

    fn clear_extensions(&self) {
        self.extensions.write().clear();
    }
}

impl fmt::Debug for MetaBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaBlock")
            .field("name", &self.name)
            .field("type_id", &format_args!("{:#010x}", self.type_id))
            .field("properties", &self.properties)
            .field("instances", &self.instance_count())
            .field("extensions", &self.extension_count())
            .finish()
    }
}

#[derive(Default)]
struct RegistryMaps {
    by_name: HashMap<&'static str, Arc<MetaBlock>>,
    by_id: HashMap<u32, Arc<MetaBlock>>,
}

/// Block registry for managing all available block types
///
/// The registry uses `Arc<RwLock<..>>` so that clones share one catalogue.
/// Lookups take a read lock; registration and unregistration are rare and
/// take the write lock.
#[derive(Clone, Default)]
pub struct BlockRegistry {
    maps: Arc<RwLock<RegistryMaps>>,
}

impl BlockRegistry {
    /// Create a new empty block registry
    ///
    /// # Example
    /// ```
    /// use kore_blocks::core::registry::BlockRegistry;
    ///
    /// let registry = BlockRegistry::new();
    /// assert_eq!(registry.count(), 0);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in types already registered
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let registry = Self::new();
        registry.register::<Library>()?;
        Ok(registry)
    }

    /// Register a block type
    ///
    /// A collision between identifiers is a configuration error: callers are
    /// expected to stop at startup rather than run with ambiguous identifiers.
    ///
    /// # Returns
    /// * `Ok(Arc<MetaBlock>)` if registration succeeds
    /// * `Err(RegistryError)` if the name is taken or an identifier collides
    ///
    /// # Example
    /// ```
    /// use kore_blocks::core::block::Library;
    /// use kore_blocks::core::registry::BlockRegistry;
    ///
    /// let registry = BlockRegistry::new();
    /// let meta = registry.register::<Library>().unwrap();
    /// assert!(registry.lookup_id(meta.type_id()).is_some());
    /// ```
    pub fn register<T: BlockType>(&self) -> Result<Arc<MetaBlock>, RegistryError> {
        let meta = Arc::new(MetaBlock::of::<T>()?);
        let mut maps = self.maps.write();

        if maps.by_name.contains_key(meta.name()) {
            return Err(RegistryError::DuplicateType(meta.name().to_string()));
        }

        if let Some(existing) = maps.by_id.get(&meta.type_id()) {
            return Err(RegistryError::TypeIdCollision {
                name: meta.name().to_string(),
                existing: existing.name().to_string(),
                id: meta.type_id(),
            });
        }

        maps.by_name.insert(meta.name(), Arc::clone(&meta));
        maps.by_id.insert(meta.type_id(), Arc::clone(&meta));
        debug!(
            type_name = meta.name(),
            type_id = meta.type_id(),
            properties = meta.properties().len(),
            "Registered meta-block"
        );
        Ok(meta)
    }

    /// Unregister a block type
    ///
    /// # Returns
    /// * `Ok(())` if unregistration succeeds
    /// * `Err(RegistryError::TypeNotFound)` if the type is not registered
    /// * `Err(RegistryError::InstancesAlive)` while instances of the type live
    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let mut maps = self.maps.write();

        let meta = maps
            .by_name
            .get(name)
            .ok_or_else(|| RegistryError::TypeNotFound(name.to_string()))?;

        if !meta.can_unload() {
            return Err(RegistryError::InstancesAlive {
                name: name.to_string(),
                count: meta.instance_count(),
            });
        }

        let type_id = meta.type_id();
        meta.clear_extensions();
        maps.by_name.remove(name);
        maps.by_id.remove(&type_id);
        debug!(type_name = name, "Unregistered meta-block");
        Ok(())
    }

    /// Look a type up by name
    pub fn lookup_name(&self, name: &str) -> Option<Arc<MetaBlock>> {
        self.maps.read().by_name.get(name).cloned()
    }

    /// Look a type up by wire identifier
    pub fn lookup_id(&self, type_id: u32) -> Option<Arc<MetaBlock>> {
        self.maps.read().by_id.get(&type_id).cloned()
    }

    /// Default-construct an instance of the type called `name`
    ///
    /// # Returns
    /// `None` if the type is unknown. The instance counts as alive until it is
    /// released through its entry's [`MetaBlock::release_block`].
    pub fn create_block(&self, name: &str) -> Option<Box<dyn Block>> {
        self.lookup_name(name).map(|meta| meta.create_block())
    }

    /// Wire identifier of the property at `slot` of the type called `type_name`
    pub fn property_id(&self, type_name: &str, slot: usize) -> Option<u32> {
        self.lookup_name(type_name)?.property_id(slot)
    }

    /// Slot of the property with wire identifier `id` of the type called `type_name`
    pub fn property_slot(&self, type_name: &str, id: u32) -> Option<usize> {
        self.lookup_name(type_name)?.property_slot(id)
    }

    /// Get all registered types
    pub fn types(&self) -> Vec<Arc<MetaBlock>> {
        self.maps.read().by_name.values().cloned().collect()
    }

    /// Get the number of registered types
    pub fn count(&self) -> usize {
        self.maps.read().by_name.len()
    }

    /// Check if a type with the given name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.maps.read().by_name.contains_key(name)
    }
}

impl fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let maps = self.maps.read();
        let mut names: Vec<_> = maps.by_name.keys().copied().collect();
        names.sort_unstable();
        f.debug_struct("BlockRegistry").field("types", &names).finish()
    }
}

/// Registry error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No type is registered under the given name
    #[error("Block type not found: {0}")]
    TypeNotFound(String),

    /// A type with the same name is already registered
    #[error("Duplicate block type: {0}")]
    DuplicateType(String),

    /// Two type names hash to the same identifier
    #[error("Type identifier {id:#010x} of {name} collides with {existing}")]
    TypeIdCollision {
        name: String,
        existing: String,
        id: u32,
    },

    /// Two property names of one type hash to the same identifier
    #[error("Property identifier {id:#010x} of {type_name}.{property} collides with {existing}")]
    PropertyIdCollision {
        type_name: String,
        property: String,
        existing: String,
        id: u32,
    },

    /// Instances of the type are still alive
    #[error("Cannot unregister {name}: {count} instances alive")]
    InstancesAlive { name: String, count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::property::{mismatch, PropertyError};
    use crate::core::value::{Value, ValueKind};

    #[derive(Default)]
    struct Gauge {
        level: i32,
        label: String,
    }

    impl Block for Gauge {
        fn type_name(&self) -> &'static str {
            Self::TYPE_NAME
        }
    }

    impl BlockType for Gauge {
        const TYPE_NAME: &'static str = "Gauge";

        fn properties() -> Vec<PropertyDescriptor> {
            vec![
                PropertyDescriptor::new::<Gauge>(
                    "level",
                    |g| Value::Int(g.level),
                    |g, v| match v {
                        Value::Int(level) => {
                            g.level = level;
                            Ok(())
                        }
                        other => Err(mismatch("level", ValueKind::Int, &other)),
                    },
                ),
                PropertyDescriptor::new::<Gauge>(
                    "label",
                    |g| Value::from(g.label.as_str()),
                    |g, v| match v {
                        Value::String(label) => {
                            g.label = label;
                            Ok(())
                        }
                        other => Err(mismatch("label", ValueKind::String, &other)),
                    },
                ),
            ]
        }
    }

    // "costarring" and "liquid" share an FNV-1a hash.
    #[derive(Default)]
    struct Costarring;

    impl Block for Costarring {
        fn type_name(&self) -> &'static str {
            Self::TYPE_NAME
        }
    }

    impl BlockType for Costarring {
        const TYPE_NAME: &'static str = "costarring";
    }

    #[derive(Default)]
    struct Liquid;

    impl Block for Liquid {
        fn type_name(&self) -> &'static str {
            Self::TYPE_NAME
        }
    }

    impl BlockType for Liquid {
        const TYPE_NAME: &'static str = "liquid";
    }

    #[derive(Default)]
    struct Clashing;

    impl Block for Clashing {
        fn type_name(&self) -> &'static str {
            Self::TYPE_NAME
        }
    }

    impl BlockType for Clashing {
        const TYPE_NAME: &'static str = "Clashing";

        fn properties() -> Vec<PropertyDescriptor> {
            vec![
                PropertyDescriptor::read_only::<Clashing>("altarage", |_| Value::Bool(true)),
                PropertyDescriptor::read_only::<Clashing>("zinke", |_| Value::Bool(false)),
            ]
        }
    }

    #[test]
    fn test_name_hash_is_fnv1a() {
        assert_eq!(name_hash(""), 0x811c_9dc5);
        assert_eq!(name_hash("Library"), 0xa853_2270);
        assert_eq!(name_hash("costarring"), name_hash("liquid"));
    }

    #[test]
    fn test_registry_creation() {
        let registry = BlockRegistry::new();
        assert_eq!(registry.count(), 0);

        let registry = BlockRegistry::with_builtins().unwrap();
        assert!(registry.contains("Library"));
    }

    #[test]
    fn test_type_registration_and_lookup() {
        let registry = BlockRegistry::new();
        let meta = registry.register::<Gauge>().unwrap();

        assert_eq!(meta.type_id(), name_hash("Gauge"));
        let by_name = registry.lookup_name("Gauge").unwrap();
        let by_id = registry.lookup_id(meta.type_id()).unwrap();
        assert!(Arc::ptr_eq(&by_name, &by_id));
        assert!(registry.lookup_name("Missing").is_none());
        assert!(registry.lookup_id(0xdead_beef).is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = BlockRegistry::new();
        registry.register::<Gauge>().unwrap();

        let result = registry.register::<Gauge>();
        assert!(matches!(result, Err(RegistryError::DuplicateType(_))));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_type_id_collision_is_rejected() {
        let registry = BlockRegistry::new();
        registry.register::<Costarring>().unwrap();

        match registry.register::<Liquid>() {
            Err(RegistryError::TypeIdCollision { name, existing, .. }) => {
                assert_eq!(name, "liquid");
                assert_eq!(existing, "costarring");
            }
            other => panic!("expected a collision, got {other:?}"),
        }
        assert!(!registry.contains("liquid"));
    }

    #[test]
    fn test_property_id_collision_is_rejected() {
        let registry = BlockRegistry::new();
        let result = registry.register::<Clashing>();
        assert!(matches!(
            result,
            Err(RegistryError::PropertyIdCollision { ref property, .. }) if property == "zinke"
        ));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_property_mapping_is_bidirectional() {
        let registry = BlockRegistry::new();
        let meta = registry.register::<Gauge>().unwrap();

        for slot in 0..meta.properties().len() {
            let id = meta.property_id(slot).unwrap();
            assert_eq!(meta.property_slot(id), Some(slot));
            assert_eq!(id, name_hash(meta.properties()[slot].name()));
        }
        assert_eq!(registry.property_id("Gauge", 1), Some(name_hash("label")));
        assert_eq!(registry.property_slot("Gauge", name_hash("level")), Some(0));
        assert_eq!(meta.property_slot(name_hash("unknown")), None);
        assert_eq!(meta.property_slot_by_name("label"), Some(1));
        assert_eq!(meta.property_id(2), None);
    }

    #[test]
    fn test_instance_counting() {
        let registry = BlockRegistry::new();
        let meta = registry.register::<Gauge>().unwrap();

        let a = meta.create_block();
        let b = registry.create_block("Gauge").unwrap();
        assert_eq!(meta.instance_count(), 2);
        assert!(registry.create_block("Nope").is_none());

        assert!(matches!(
            registry.unregister("Gauge"),
            Err(RegistryError::InstancesAlive { count: 2, .. })
        ));

        meta.release_block(a);
        meta.release_block(b);
        assert!(meta.can_unload());
        registry.unregister("Gauge").unwrap();
        assert!(registry.lookup_id(meta.type_id()).is_none());
    }

    #[test]
    fn test_unregister_nonexistent() {
        let registry = BlockRegistry::new();
        let result = registry.unregister("nonexistent");
        assert!(matches!(result, Err(RegistryError::TypeNotFound(_))));
    }

    #[test]
    fn test_property_write_reports_mismatch() {
        let registry = BlockRegistry::new();
        let meta = registry.register::<Gauge>().unwrap();
        let mut block = meta.create_block();

        let level = meta.property(0).unwrap();
        level.write(block.as_mut(), Value::Int(9)).unwrap();
        assert_eq!(level.read(block.as_ref()), Some(Value::Int(9)));

        let err = level.write(block.as_mut(), Value::from("nine")).unwrap_err();
        assert_eq!(
            err,
            PropertyError::TypeMismatch {
                property: "level",
                expected: ValueKind::Int,
                found: ValueKind::String,
            }
        );
        meta.release_block(block);
    }

    struct Palette {
        colors: Vec<&'static str>,
    }

    impl BlockExtension for Palette {
        fn extension_name(&self) -> &str {
            "palette"
        }
    }

    struct Exporter;

    impl BlockExtension for Exporter {
        fn extension_name(&self) -> &str {
            "export"
        }
    }

    #[test]
    fn test_extensions_by_name() {
        let registry = BlockRegistry::new();
        let meta = registry.register::<Gauge>().unwrap();

        let warm: Arc<dyn BlockExtension> = Arc::new(Palette { colors: vec!["red", "orange"] });
        let cold: Arc<dyn BlockExtension> = Arc::new(Palette { colors: vec!["blue"] });
        assert!(meta.register_extension(Arc::clone(&warm)));
        assert!(meta.register_extension(Arc::clone(&cold)));
        assert!(meta.register_extension(Arc::new(Exporter)));
        assert!(!meta.register_extension(Arc::clone(&warm)));
        assert_eq!(meta.extension_count(), 3);

        let first = meta.extension("palette").unwrap();
        assert!(Arc::ptr_eq(&first, &warm));
        let palette = (*first).as_any().downcast_ref::<Palette>().unwrap();
        assert_eq!(palette.colors, vec!["red", "orange"]);
        assert_eq!(meta.extensions_named("palette").len(), 2);
        assert!(meta.extension("missing").is_none());

        assert!(meta.unregister_extension(&warm));
        assert!(!meta.unregister_extension(&warm));
        assert!(Arc::ptr_eq(&meta.extension("palette").unwrap(), &cold));
    }

    #[test]
    fn test_unregister_drops_extensions() {
        let registry = BlockRegistry::new();
        let meta = registry.register::<Gauge>().unwrap();
        meta.register_extension(Arc::new(Exporter));

        registry.unregister("Gauge").unwrap();
        assert_eq!(meta.extension_count(), 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::thread;

        let registry = BlockRegistry::new();
        let meta = registry.register::<Gauge>().unwrap();
        let mut handles = vec![];

        for _ in 0..8 {
            let registry_clone = registry.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let meta = registry_clone.lookup_name("Gauge").unwrap();
                    let block = meta.create_block();
                    meta.release_block(block);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(meta.instance_count(), 0);
    }
}
