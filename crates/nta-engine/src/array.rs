//! Typed element buffer
//!
//! [`Array`] is the buffer behind every [`crate::Output`] and [`crate::Input`].
//! It is tagged with a [`BasicType`] and accessed through typed slices; the
//! only untyped access is the byte view used by the link copy.
//!
//! ## Example
//!
//! ```text
//! let mut array = Array::new(BasicType::Real64);
//! array.allocate_buffer(4)?;
//! array.fill(10.0f64)?;
//! assert_eq!(array.as_slice::<f64>()?, &[10.0; 4]);
//! ```

use crate::error::{Error, Result};
use crate::types::{BasicType, Element};

#[derive(Clone, Debug)]
enum Storage {
    Byte(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Real32(Vec<f32>),
    Real64(Vec<f64>),
}

macro_rules! with_storage {
    ($storage:expr, $values:ident => $body:expr) => {
        match $storage {
            Storage::Byte($values) => $body,
            Storage::Int16($values) => $body,
            Storage::UInt16($values) => $body,
            Storage::Int32($values) => $body,
            Storage::UInt32($values) => $body,
            Storage::Int64($values) => $body,
            Storage::UInt64($values) => $body,
            Storage::Real32($values) => $body,
            Storage::Real64($values) => $body,
        }
    };
}

impl Storage {
    fn zeroed(element_type: BasicType, count: usize) -> Self {
        match element_type {
            BasicType::Byte => Self::Byte(vec![0; count]),
            BasicType::Int16 => Self::Int16(vec![0; count]),
            BasicType::UInt16 => Self::UInt16(vec![0; count]),
            BasicType::Int32 => Self::Int32(vec![0; count]),
            BasicType::UInt32 => Self::UInt32(vec![0; count]),
            BasicType::Int64 => Self::Int64(vec![0; count]),
            BasicType::UInt64 => Self::UInt64(vec![0; count]),
            BasicType::Real32 => Self::Real32(vec![0.0; count]),
            BasicType::Real64 => Self::Real64(vec![0.0; count]),
        }
    }

    fn len(&self) -> usize {
        with_storage!(self, values => values.len())
    }

    fn bytes(&self) -> &[u8] {
        with_storage!(self, values => bytemuck::cast_slice(values.as_slice()))
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        with_storage!(self, values => bytemuck::cast_slice_mut(values.as_mut_slice()))
    }
}

/// Typed, zero-initialized element buffer.
#[derive(Clone, Debug)]
pub struct Array {
    element_type: BasicType,
    storage: Option<Storage>,
}

impl Array {
    /// An unallocated array of `element_type`.
    pub fn new(element_type: BasicType) -> Self {
        Self {
            element_type,
            storage: None,
        }
    }

    /// An allocated array holding a copy of `values`.
    pub fn from_slice<T: Element>(values: &[T]) -> Self {
        let mut storage = Storage::zeroed(T::TYPE, values.len());
        storage.bytes_mut().copy_from_slice(bytemuck::cast_slice(values));
        Self {
            element_type: T::TYPE,
            storage: Some(storage),
        }
    }

    pub fn element_type(&self) -> BasicType {
        self.element_type
    }

    pub fn is_allocated(&self) -> bool {
        self.storage.is_some()
    }

    /// Allocate `count` zeroed elements. A zero count is a valid, empty allocation.
    pub fn allocate_buffer(&mut self, count: usize) -> Result<()> {
        if self.storage.is_some() {
            return Err(Error::InvalidState(format!(
                "buffer of {} {} elements is already allocated",
                self.count(),
                self.element_type
            )));
        }
        self.storage = Some(Storage::zeroed(self.element_type, count));
        Ok(())
    }

    pub fn release_buffer(&mut self) {
        self.storage = None;
    }

    /// Element count; 0 while unallocated.
    pub fn count(&self) -> usize {
        self.storage.as_ref().map_or(0, Storage::len)
    }

    pub fn byte_len(&self) -> usize {
        self.count() * self.element_type.size()
    }

    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        self.check_type::<T>()?;
        match &self.storage {
            Some(storage) => bytemuck::try_cast_slice(storage.bytes())
                .map_err(|err| Error::InvalidState(format!("misaligned {} buffer: {err}", self.element_type))),
            None => Ok(Default::default()),
        }
    }

    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T]> {
        self.check_type::<T>()?;
        let element_type = self.element_type;
        match &mut self.storage {
            Some(storage) => bytemuck::try_cast_slice_mut(storage.bytes_mut())
                .map_err(|err| Error::InvalidState(format!("misaligned {element_type} buffer: {err}"))),
            None => Ok(Default::default()),
        }
    }

    /// Set every element to `value`.
    pub fn fill<T: Element>(&mut self, value: T) -> Result<()> {
        self.as_mut_slice::<T>()?.fill(value);
        Ok(())
    }

    /// Reset every element to zero, whatever the element type.
    pub fn zero(&mut self) {
        if let Some(storage) = &mut self.storage {
            storage.bytes_mut().fill(0);
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        match &self.storage {
            Some(storage) => storage.bytes(),
            None => &[],
        }
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Some(storage) => storage.bytes_mut(),
            None => Default::default(),
        }
    }

    fn check_type<T: Element>(&self) -> Result<()> {
        if T::TYPE == self.element_type {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected: self.element_type.to_string(),
                actual: T::TYPE.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_zeroed() -> Result<()> {
        let mut array = Array::new(BasicType::Int32);
        assert!(!array.is_allocated());
        assert_eq!(array.count(), 0);

        array.allocate_buffer(5)?;
        assert!(array.is_allocated());
        assert_eq!(array.count(), 5);
        assert_eq!(array.byte_len(), 20);
        assert_eq!(array.as_slice::<i32>()?, &[0; 5]);
        Ok(())
    }

    #[test]
    fn double_allocation_is_rejected() -> Result<()> {
        let mut array = Array::new(BasicType::Byte);
        array.allocate_buffer(1)?;
        assert!(matches!(array.allocate_buffer(2), Err(Error::InvalidState(_))));

        array.release_buffer();
        array.allocate_buffer(2)?;
        assert_eq!(array.count(), 2);
        Ok(())
    }

    #[test]
    fn typed_access_checks_element_type() -> Result<()> {
        let mut array = Array::new(BasicType::Real64);
        array.allocate_buffer(3)?;
        array.fill(1.5f64)?;
        assert_eq!(array.as_slice::<f64>()?, &[1.5, 1.5, 1.5]);

        let err = array.as_slice::<f32>().unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert!(err.to_string().contains("expected Real64, got Real32"));
        Ok(())
    }

    #[test]
    fn zero_clears_any_type() -> Result<()> {
        let mut array = Array::from_slice(&[3u16, 4, 5]);
        assert_eq!(array.element_type(), BasicType::UInt16);
        array.zero();
        assert_eq!(array.as_slice::<u16>()?, &[0, 0, 0]);
        Ok(())
    }

    #[test]
    fn byte_view_covers_every_element() {
        let array = Array::from_slice(&[1.0f32, 2.0]);
        assert_eq!(array.as_bytes().len(), 8);
        assert_eq!(&array.as_bytes()[..4], &1.0f32.to_ne_bytes());
    }
}
