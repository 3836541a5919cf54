//! Property descriptors
//!
//! Block types describe their properties with a static table of
//! [`PropertyDescriptor`]s built when the type is registered. A descriptor
//! carries the property name (hashed into the wire identifier), whether the
//! property is persisted, and type-erased accessors used by the codec to read
//! and write the value on any instance of the type.

use std::fmt;

use super::block::Block;
use super::value::{Value, ValueKind};

type ReadFn = Box<dyn Fn(&dyn Block) -> Option<Value> + Send + Sync>;
type WriteFn = Box<dyn Fn(&mut dyn Block, Value) -> Result<(), PropertyError> + Send + Sync>;

/// Property access errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    /// The value does not have the kind the property stores
    #[error("Type mismatch for property {property}: expected {expected}, found {found}")]
    TypeMismatch {
        property: &'static str,
        expected: ValueKind,
        found: ValueKind,
    },

    /// The accessor was called on an instance of another type
    #[error("Property {0} accessed on a block of another type")]
    WrongReceiver(&'static str),

    /// The property has no write accessor
    #[error("Property {0} is read-only")]
    ReadOnly(&'static str),

    /// The value has the right kind but is out of the accepted range
    #[error("Invalid value for property {property}: {reason}")]
    InvalidValue {
        property: &'static str,
        reason: String,
    },
}

/// Description of one property of a block type.
pub struct PropertyDescriptor {
    name: &'static str,
    stored: bool,
    read: ReadFn,
    write: Option<WriteFn>,
}

impl PropertyDescriptor {
    /// Describe a stored, read-write property of `T`.
    ///
    /// # Example
    /// ```
    /// use kore_blocks::core::property::{PropertyDescriptor, PropertyError};
    /// use kore_blocks::core::value::{Value, ValueKind};
    ///
    /// #[derive(Default)]
    /// struct Note { title: String }
    /// # impl kore_blocks::core::block::Block for Note {
    /// #     fn type_name(&self) -> &'static str { "Note" }
    /// # }
    ///
    /// let title = PropertyDescriptor::new::<Note>(
    ///     "title",
    ///     |n| Value::from(n.title.as_str()),
    ///     |n, v| match v {
    ///         Value::String(s) => { n.title = s; Ok(()) }
    ///         other => Err(PropertyError::TypeMismatch {
    ///             property: "title",
    ///             expected: ValueKind::String,
    ///             found: other.kind(),
    ///         }),
    ///     },
    /// );
    /// assert!(title.is_stored());
    /// ```
    pub fn new<T: Block>(
        name: &'static str,
        read: fn(&T) -> Value,
        write: fn(&mut T, Value) -> Result<(), PropertyError>,
    ) -> Self {
        Self {
            name,
            stored: true,
            read: Box::new(move |block: &dyn Block| block.as_any().downcast_ref::<T>().map(read)),
            write: Some(Box::new(move |block: &mut dyn Block, value: Value| {
                let target = block
                    .as_any_mut()
                    .downcast_mut::<T>()
                    .ok_or(PropertyError::WrongReceiver(name))?;
                write(target, value)
            })),
        }
    }

    /// Describe a property of `T` that can be read but never written.
    ///
    /// Read-only properties are never persisted.
    pub fn read_only<T: Block>(name: &'static str, read: fn(&T) -> Value) -> Self {
        Self {
            name,
            stored: false,
            read: Box::new(move |block: &dyn Block| block.as_any().downcast_ref::<T>().map(read)),
            write: None,
        }
    }

    /// Mark the property as transient: it keeps its accessors but the codec skips it.
    pub fn transient(mut self) -> Self {
        self.stored = false;
        self
    }

    /// Property name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the codec persists this property
    pub fn is_stored(&self) -> bool {
        self.stored
    }

    /// Whether the property has a write accessor
    pub fn is_writable(&self) -> bool {
        self.write.is_some()
    }

    /// Read the property from `block`.
    ///
    /// Returns `None` when `block` is not an instance of the described type.
    pub fn read(&self, block: &dyn Block) -> Option<Value> {
        (self.read)(block)
    }

    /// Write `value` into the property of `block`.
    pub fn write(&self, block: &mut dyn Block, value: Value) -> Result<(), PropertyError> {
        match &self.write {
            Some(write) => write(block, value),
            None => Err(PropertyError::ReadOnly(self.name)),
        }
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("stored", &self.stored)
            .field("writable", &self.write.is_some())
            .finish()
    }
}

/// Build a [`PropertyError::TypeMismatch`] for `property`.
///
/// Convenience for write accessors that match on a single [`Value`] variant.
pub fn mismatch(property: &'static str, expected: ValueKind, found: &Value) -> PropertyError {
    PropertyError::TypeMismatch {
        property,
        expected,
        found: found.kind(),
    }
}
