//! Vtables for type-erased callable operations.
//!
//! A [`FunctionVTable`] is created once per concrete callable type `F` and signature `S`
//! as a `&'static` constant of [`InlinePlacement`] or [`HeapPlacement`], depending on
//! whether `F` fits in the wrapper's inline buffer.
//! One more constant per signature, the empty vtable, is bound to storage which holds nothing.
//!
//! # Safety invariant
//!
//! A [`Storage`] is bound to the vtable created for the type of the callable it holds,
//! or to the empty vtable iff it holds nothing.
//! The fields of [`FunctionVTable`] are private to this module, so vtables can only be
//! created here, paired with their types at compile time.

use {
    crate::{
        error::BadFunctionCall,
        signature::{Callable, Signature},
        storage::{Placement, Storage},
    },
    std::{any::TypeId, marker::PhantomData, ptr},
    tracing::trace,
};

type InvokeFn<S> = unsafe fn(
    &Storage<S>,
    <S as Signature>::Args,
) -> Result<<S as Signature>::Output, BadFunctionCall>;

type DestroyFn<S> = unsafe fn(&mut Storage<S>);

type CopyFn<S> = unsafe fn(&Storage<S>, &mut Storage<S>);

type RelocateFn<S> = unsafe fn(&mut Storage<S>, &mut Storage<S>);

/// Identity key of the empty vtable.
enum Empty {}

/// Vtable struct for a concrete callable type
/// which knows
/// 1) how to call the callable;
/// 2) how to drop it;
/// 3) how to clone it into other storage;
/// 4) how to move it into other storage.
/// A static reference to this is stored next to the callable.
pub(crate) struct FunctionVTable<S: Signature> {
    /// [`TypeId`] of the callable type; the identity of the vtable.
    type_id: fn() -> TypeId,
    /// `None` for the empty vtable.
    placement: Option<Placement>,
    invoke: InvokeFn<S>,
    destroy: DestroyFn<S>,
    copy: CopyFn<S>,
    relocate: RelocateFn<S>,
}

impl<S: Signature> FunctionVTable<S> {
    const EMPTY: &'static Self = &Self {
        type_id: TypeId::of::<Empty>,
        placement: None,
        invoke: empty_invoke::<S>,
        destroy: empty_destroy::<S>,
        copy: empty_copy::<S>,
        relocate: empty_relocate::<S>,
    };

    /// The vtable bound to storage which holds nothing.
    pub(crate) fn empty() -> &'static Self {
        Self::EMPTY
    }

    /// The vtable for callables of type `F`.
    pub(crate) fn of<F>() -> &'static Self
    where
        F: Callable<S> + Clone + 'static,
    {
        match Placement::of::<F>() {
            Placement::Inline => InlinePlacement::<F, S>::VTABLE,
            Placement::Heap => HeapPlacement::<F, S>::VTABLE,
        }
    }

    pub(crate) fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    pub(crate) fn placement(&self) -> Option<Placement> {
        self.placement
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.holds::<Empty>()
    }

    /// Whether this is the vtable of callables of type `T`.
    ///
    /// Compares identity keys; constants are not guaranteed a unique address.
    pub(crate) fn holds<T: 'static>(&self) -> bool {
        self.type_id() == TypeId::of::<T>()
    }

    /// Whether `self` and `other` are the same vtable.
    pub(crate) fn same(&self, other: &Self) -> bool {
        ptr::eq(self, other) || self.type_id() == other.type_id()
    }

    /// # Safety
    ///
    /// `storage` must be bound to this vtable.
    #[inline]
    pub(crate) unsafe fn invoke(
        &self,
        storage: &Storage<S>,
        args: S::Args,
    ) -> Result<S::Output, BadFunctionCall> {
        debug_assert!(self.same(storage.vtable()));
        (self.invoke)(storage, args)
    }

    /// Drops the callable and unbinds `storage`.
    ///
    /// # Safety
    ///
    /// `storage` must be bound to this vtable.
    #[inline]
    pub(crate) unsafe fn destroy(&self, storage: &mut Storage<S>) {
        debug_assert!(self.same(storage.vtable()));
        (self.destroy)(storage)
    }

    /// Drops whatever `to` holds, then clones the callable in `from` into it.
    ///
    /// # Safety
    ///
    /// `from` must be bound to this vtable.
    #[inline]
    pub(crate) unsafe fn copy(&self, from: &Storage<S>, to: &mut Storage<S>) {
        debug_assert!(self.same(from.vtable()));
        (self.copy)(from, to)
    }

    /// Drops whatever `to` holds, then moves the callable in `from` into it and unbinds `from`.
    ///
    /// # Safety
    ///
    /// `from` must be bound to this vtable.
    #[inline]
    pub(crate) unsafe fn relocate(&self, from: &mut Storage<S>, to: &mut Storage<S>) {
        debug_assert!(self.same(from.vtable()));
        (self.relocate)(from, to)
    }
}

unsafe fn empty_invoke<S: Signature>(
    _: &Storage<S>,
    _: S::Args,
) -> Result<S::Output, BadFunctionCall> {
    trace!("called an empty function wrapper");
    Err(BadFunctionCall)
}

unsafe fn empty_destroy<S: Signature>(_: &mut Storage<S>) {}

unsafe fn empty_copy<S: Signature>(_: &Storage<S>, to: &mut Storage<S>) {
    to.destroy();
}

unsafe fn empty_relocate<S: Signature>(_: &mut Storage<S>, to: &mut Storage<S>) {
    to.destroy();
}

/// Shared by both placements: `Storage::get` resolves the placement of `F`.
unsafe fn invoke<F, S>(storage: &Storage<S>, args: S::Args) -> Result<S::Output, BadFunctionCall>
where
    F: Callable<S>,
    S: Signature,
{
    Ok(<F as Callable<S>>::invoke(&*storage.get::<F>(), args))
}

/// Vtable provider for callables stored in the inline buffer.
pub(crate) struct InlinePlacement<F, S>(PhantomData<fn() -> (F, S)>);

impl<F, S> InlinePlacement<F, S>
where
    F: Callable<S> + Clone + 'static,
    S: Signature,
{
    pub(crate) const VTABLE: &'static FunctionVTable<S> = &FunctionVTable {
        type_id: TypeId::of::<F>,
        placement: Some(Placement::Inline),
        invoke: invoke::<F, S>,
        destroy: Self::destroy,
        copy: Self::copy,
        relocate: Self::relocate,
    };

    unsafe fn destroy(storage: &mut Storage<S>) {
        // Unbind first: a panicking destructor must not leave a bound, half-dropped callable.
        storage.unbind();
        ptr::drop_in_place(storage.inline_ptr::<F>());
    }

    unsafe fn copy(from: &Storage<S>, to: &mut Storage<S>) {
        to.destroy();

        // `to` is empty if this panics.
        let f = (*from.inline_ptr::<F>()).clone();

        to.inline_ptr::<F>().write(f);
        to.bind(from.vtable());
    }

    unsafe fn relocate(from: &mut Storage<S>, to: &mut Storage<S>) {
        to.destroy();

        let f = from.inline_ptr::<F>().read();
        let vtable = from.vtable();
        from.unbind();

        to.inline_ptr::<F>().write(f);
        to.bind(vtable);
    }
}

/// Vtable provider for boxed callables.
pub(crate) struct HeapPlacement<F, S>(PhantomData<fn() -> (F, S)>);

impl<F, S> HeapPlacement<F, S>
where
    F: Callable<S> + Clone + 'static,
    S: Signature,
{
    pub(crate) const VTABLE: &'static FunctionVTable<S> = &FunctionVTable {
        type_id: TypeId::of::<F>,
        placement: Some(Placement::Heap),
        invoke: invoke::<F, S>,
        destroy: Self::destroy,
        copy: Self::copy,
        relocate: Self::relocate,
    };

    unsafe fn destroy(storage: &mut Storage<S>) {
        let f = storage.heap_ptr::<F>();
        storage.unbind();
        storage.set_heap_ptr(ptr::null_mut::<F>());

        drop(Box::from_raw(f)); // Callable dropped and freed here.
    }

    unsafe fn copy(from: &Storage<S>, to: &mut Storage<S>) {
        to.destroy();

        // `to` is empty if this panics.
        let f = Box::new((*from.heap_ptr::<F>()).clone());

        to.set_heap_ptr(Box::into_raw(f));
        to.bind(from.vtable());
    }

    /// Pointer hand-off; nothing is allocated or constructed.
    unsafe fn relocate(from: &mut Storage<S>, to: &mut Storage<S>) {
        to.destroy();

        let f = from.heap_ptr::<F>();
        let vtable = from.vtable();
        from.unbind();
        from.set_heap_ptr(ptr::null_mut::<F>());

        to.set_heap_ptr(f);
        to.bind(vtable);
    }
}
