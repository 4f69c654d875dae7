//! Typed capability for a resolved function address.

use core::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use crate::error::{ResolveError, Result};
use crate::module;

/// A resolved address paired with the function pointer type it is called as.
///
/// Construction is the only unsafe step: the caller vouches that the code at
/// `address` has signature `F`. After that, [`Symbol::get`] hands out a typed
/// pointer without further casts.
pub struct Symbol<F> {
    name: String,
    address: NonNull<c_void>,
    _signature: PhantomData<F>,
}

impl<F: Copy> Symbol<F> {
    /// Wrap `address` as a function of type `F`.
    ///
    /// Fails when the address is null or `F` is not pointer sized (so it
    /// cannot be a function pointer).
    ///
    /// # Safety
    /// `address` must point to a function whose ABI and signature match `F`
    /// and that stays mapped for the life of the process.
    pub unsafe fn from_address(name: &str, address: *mut c_void) -> Result<Self> {
        if mem::size_of::<F>() != mem::size_of::<*mut c_void>() {
            return Err(ResolveError::NotAFunctionPointer {
                name: name.to_string(),
                expected: mem::size_of::<*mut c_void>(),
                actual: mem::size_of::<F>(),
            });
        }
        let address = NonNull::new(address).ok_or_else(|| ResolveError::NotFound {
            name: name.to_string(),
            reason: "null address".to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            address,
            _signature: PhantomData,
        })
    }

    pub fn get(&self) -> F {
        // SAFETY: size equality was checked in from_address and the caller
        // vouched for the signature there.
        unsafe { mem::transmute_copy::<NonNull<c_void>, F>(&self.address) }
    }
}

impl<F> Symbol<F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> usize {
        self.address.as_ptr() as usize
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.address.as_ptr()
    }

    /// Object the address lives in, if the loader knows it.
    pub fn module(&self) -> Option<String> {
        module::module_for_address(self.address())
    }
}

impl<F> Clone for Symbol<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            address: self.address,
            _signature: PhantomData,
        }
    }
}

impl<F> fmt::Debug for Symbol<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("name", &self.name)
            .field("address", &format_args!("{:#x}", self.address()))
            .finish()
    }
}

// Function addresses are immutable once resolved and the code they point to
// is never unmapped.
unsafe impl<F> Send for Symbol<F> {}
unsafe impl<F> Sync for Symbol<F> {}
