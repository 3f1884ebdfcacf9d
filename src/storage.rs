use {
    crate::{
        signature::{Callable, Signature},
        vtable::FunctionVTable,
    },
    static_assertions::const_assert_eq,
    std::{
        cell::UnsafeCell,
        mem::{align_of, size_of, MaybeUninit},
    },
    tracing::trace,
};

/// Raw buffer the callable is written into if it fits, or the owning heap pointer otherwise.
/// Exactly one machine word, pointer-aligned.
type InlineStorage = MaybeUninit<*mut ()>;

/// Amount of memory available for inline callable storage.
///
/// x86: 4b, x64: 8b.
pub(crate) const STORAGE_SIZE: usize = size_of::<InlineStorage>();
pub(crate) const STORAGE_ALIGN: usize = align_of::<InlineStorage>();

const_assert_eq!(STORAGE_SIZE, size_of::<usize>());
const_assert_eq!(STORAGE_ALIGN, align_of::<usize>());

/// Where a bound callable lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Placement {
    /// The callable is stored in the wrapper itself; no allocation was made.
    Inline,
    /// The callable is boxed; only the pointer is stored in the wrapper.
    /// Boxing allocates unless the callable is zero-sized (i.e. only over-aligned).
    Heap,
}

impl Placement {
    /// Placement chosen for every callable of type `F`.
    pub const fn of<F>() -> Self {
        if fits_inline::<F>() {
            Placement::Inline
        } else {
            Placement::Heap
        }
    }
}

/// Rust moves are bitwise copies and cannot fail,
/// so size and alignment are the only constraints.
pub(crate) const fn fits_inline<F>() -> bool {
    size_of::<F>() <= STORAGE_SIZE && STORAGE_ALIGN % align_of::<F>() == 0
}

/// Callable storage paired with the vtable of whatever it currently holds.
///
/// The storage tag is implicit: the bound vtable knows the callable's placement.
/// `UnsafeCell` because `Fn` callables may mutate their interior (`Cell` captures etc.)
/// through a shared reference to the buffer.
pub(crate) struct Storage<S: Signature> {
    buf: UnsafeCell<InlineStorage>,
    vtable: &'static FunctionVTable<S>,
}

impl<S: Signature> Storage<S> {
    pub(crate) fn empty() -> Self {
        Self {
            buf: UnsafeCell::new(MaybeUninit::uninit()),
            vtable: FunctionVTable::empty(),
        }
    }

    /// Moves `f` into new storage, inline or boxed.
    ///
    /// Allocates iff `F` does not fit inline and is not zero-sized.
    /// An over-aligned zero-sized `F` is boxed without an allocation.
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: Callable<S> + Clone + 'static,
    {
        let mut result = Self::empty();

        if fits_inline::<F>() {
            // SAFETY: `F` fits the size and alignment of the buffer, which holds nothing.
            unsafe {
                result.inline_ptr::<F>().write(f);
            }
        } else {
            trace!(
                size = size_of::<F>(),
                align = align_of::<F>(),
                "callable placed on the heap"
            );

            result.set_heap_ptr(Box::into_raw(Box::new(f)));
        }

        result.bind(FunctionVTable::of::<F>());
        result
    }

    pub(crate) fn vtable(&self) -> &'static FunctionVTable<S> {
        self.vtable
    }

    pub(crate) fn bind(&mut self, vtable: &'static FunctionVTable<S>) {
        self.vtable = vtable;
    }

    pub(crate) fn unbind(&mut self) {
        self.vtable = FunctionVTable::empty();
    }

    /// Pointer to the callable of type `T`, wherever it is placed.
    ///
    /// # Safety
    ///
    /// The storage must hold a `T`.
    pub(crate) unsafe fn get<T>(&self) -> *mut T {
        if fits_inline::<T>() {
            self.inline_ptr::<T>()
        } else {
            self.heap_ptr::<T>()
        }
    }

    /// The inline buffer reinterpreted as a `T`.
    /// Only meaningful for types which fit inline.
    pub(crate) fn inline_ptr<T>(&self) -> *mut T {
        debug_assert!(fits_inline::<T>());
        self.buf.get().cast::<T>()
    }

    /// The owning pointer stored in the buffer.
    ///
    /// # Safety
    ///
    /// The buffer must have been written with [`set_heap_ptr`].
    ///
    /// [`set_heap_ptr`]: #method.set_heap_ptr
    pub(crate) unsafe fn heap_ptr<T>(&self) -> *mut T {
        (*self.buf.get()).assume_init().cast::<T>()
    }

    pub(crate) fn set_heap_ptr<T>(&mut self, heap: *mut T) {
        *self.buf.get_mut() = MaybeUninit::new(heap.cast::<()>());
    }

    /// Runs the bound vtable's `destroy`. Leaves the storage empty.
    pub(crate) fn destroy(&mut self) {
        let vtable = self.vtable;
        // SAFETY: `vtable` is the vtable bound to `self`.
        unsafe { vtable.destroy(self) }
    }

    /// Replaces whatever `to` holds with a copy of this storage's callable.
    pub(crate) fn copy_into(&self, to: &mut Self) {
        let vtable = self.vtable;
        // SAFETY: `vtable` is the vtable bound to `self`.
        unsafe { vtable.copy(self, to) }
    }

    /// Replaces whatever `to` holds with this storage's callable. Leaves this storage empty.
    pub(crate) fn move_into(&mut self, to: &mut Self) {
        let vtable = self.vtable;
        // SAFETY: `vtable` is the vtable bound to `self`.
        unsafe { vtable.relocate(self, to) }
    }

    #[cfg(test)]
    pub(crate) fn raw_heap_ptr(&self) -> *const () {
        // SAFETY: only used by tests on heap-placed callables.
        unsafe { (*self.buf.get()).assume_init() }
    }
}

impl<S: Signature> Drop for Storage<S> {
    fn drop(&mut self) {
        self.destroy();
    }
}
