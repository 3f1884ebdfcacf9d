use {
    crate::{
        error::BadFunctionCall,
        signature::{Callable, Signature},
        storage::{Placement, Storage},
    },
    std::fmt::{self, Debug, Formatter},
    tracing::debug,
};

/// Type-erased wrapper for a clonable callable with the call signature `S`.
///
/// Internally uses the small function optimization: callables no larger and no more aligned
/// than a pointer are stored in the wrapper itself, larger ones are boxed.
/// The wrapper is always two pointers large.
///
/// ```
/// use minifunction::{BadFunctionCall, Function};
///
/// let answer = Function::<fn() -> i32>::new(|| 42);
/// assert_eq!(answer.call(), Ok(42));
///
/// let empty = Function::<fn() -> i32>::empty();
/// assert_eq!(empty.call(), Err(BadFunctionCall));
/// ```
pub struct Function<S: Signature> {
    storage: Storage<S>,
}

impl<S: Signature> Function<S> {
    /// Creates an empty [`Function`].
    ///
    /// [`Function`]: struct.Function.html
    pub fn empty() -> Self {
        Self {
            storage: Storage::empty(),
        }
    }

    /// Creates a [`Function`] which holds the callable `f`.
    ///
    /// Allocates iff `f` does not fit inline (see [`placement`]) and is not zero-sized:
    /// an over-aligned zero-sized callable is boxed, which does not allocate.
    ///
    /// [`Function`]: struct.Function.html
    /// [`placement`]: #method.placement
    pub fn new<F>(f: F) -> Self
    where
        F: Callable<S> + Clone + 'static,
    {
        Self {
            storage: Storage::new(f),
        }
    }

    /// If the [`Function`] holds no callable, returns `true`; otherwise returns `false`.
    ///
    /// [`Function`]: struct.Function.html
    pub fn is_empty(&self) -> bool {
        self.storage.vtable().is_empty()
    }

    /// Where the held callable is stored, or `None` if the [`Function`] is empty.
    ///
    /// [`Function`]: struct.Function.html
    pub fn placement(&self) -> Option<Placement> {
        self.storage.vtable().placement()
    }

    /// Calls the held callable with the argument tuple `args`.
    ///
    /// Prefer `call`, which takes the arguments separately.
    ///
    /// Returns [`BadFunctionCall`] if the [`Function`] is empty.
    ///
    /// [`BadFunctionCall`]: struct.BadFunctionCall.html
    /// [`Function`]: struct.Function.html
    #[inline]
    pub fn invoke(&self, args: S::Args) -> Result<S::Output, BadFunctionCall> {
        let vtable = self.storage.vtable();
        // SAFETY: `vtable` is the vtable bound to the storage.
        unsafe { vtable.invoke(&self.storage, args) }
    }

    /// Returns a reference to the held callable if it is a `T`; otherwise returns `None`.
    pub fn target<T: 'static>(&self) -> Option<&T> {
        if self.storage.vtable().holds::<T>() {
            // SAFETY: the storage holds a `T`.
            Some(unsafe { &*self.storage.get::<T>() })
        } else {
            None
        }
    }

    /// Returns a mutable reference to the held callable if it is a `T`; otherwise returns `None`.
    pub fn target_mut<T: 'static>(&mut self) -> Option<&mut T> {
        if self.storage.vtable().holds::<T>() {
            // SAFETY: the storage holds a `T`, and is borrowed mutably.
            Some(unsafe { &mut *self.storage.get::<T>() })
        } else {
            None
        }
    }

    /// Moves the held callable out into a new [`Function`]. Leaves `self` empty.
    ///
    /// Never allocates: boxed callables are handed off by pointer.
    ///
    /// [`Function`]: struct.Function.html
    pub fn take(&mut self) -> Self {
        let mut result = Self::empty();
        result.move_from(self);
        result
    }

    /// Drops the callable held by `self`, if any, and moves the callable held by `source` in its place.
    /// Leaves `source` empty.
    pub fn move_from(&mut self, source: &mut Self) {
        source.storage.move_into(&mut self.storage);
    }

    /// Drops the held callable, if any; frees its allocation, if necessary.
    pub fn clear(&mut self) {
        self.storage.destroy();
    }
}

impl<S: Signature> Default for Function<S> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<S: Signature> Clone for Function<S> {
    /// Clones the held callable into a new [`Function`].
    ///
    /// # Panics
    ///
    /// Propagates the panic of the held callable's `clone`.
    ///
    /// [`Function`]: struct.Function.html
    fn clone(&self) -> Self {
        let mut result = Self::empty();
        self.storage.copy_into(&mut result.storage);
        result
    }

    /// Replaces the held callable with a clone of the one held by `source`.
    ///
    /// # Panics
    ///
    /// Propagates the panic of the `source` callable's `clone`.
    /// `self` is left holding its previous callable in that case.
    fn clone_from(&mut self, source: &Self) {
        let backup = self.take();
        let mut restore = Restore {
            target: self,
            backup,
            committed: false,
        };

        source.storage.copy_into(&mut restore.target.storage);

        restore.committed = true;
    }
}

/// Moves the backed-up callable back into `target` unless committed,
/// i.e. when dropped during unwinding.
struct Restore<'a, S: Signature> {
    target: &'a mut Function<S>,
    backup: Function<S>,
    committed: bool,
}

impl<'a, S: Signature> Drop for Restore<'a, S> {
    fn drop(&mut self) {
        if !self.committed {
            debug!("callable clone failed, restoring the previous callable");
            self.target.move_from(&mut self.backup);
        }
    }
}

impl<S: Signature> Debug for Function<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("placement", &self.placement())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            cell::Cell,
            panic::{catch_unwind, AssertUnwindSafe},
            rc::Rc,
        },
    };

    type Counter = Function<fn() -> usize>;

    /// Lets tests name closure types.
    fn target_of<'a, S: Signature, T: 'static>(f: &'a Function<S>, _: &T) -> Option<&'a T> {
        f.target::<T>()
    }

    fn double(x: u32) -> u32 {
        x * 2
    }

    fn triple(x: u32) -> u32 {
        x * 3
    }

    /// Panics when cloned if armed.
    struct Explosive {
        armed: bool,
        value: i32,
    }

    impl Clone for Explosive {
        fn clone(&self) -> Self {
            assert!(!self.armed, "tried to clone an armed `Explosive`");

            Explosive {
                armed: false,
                value: self.value,
            }
        }
    }

    #[test]
    fn empty() {
        let f = Function::<fn(u32) -> u32>::empty();

        assert!(f.is_empty());
        assert!(f.placement().is_none());
        assert_eq!(f.call(7), Err(BadFunctionCall));
        assert!(f.target::<fn(u32) -> u32>().is_none());
        assert!(f.target::<u32>().is_none());

        let f = Function::<fn(u32) -> u32>::default();
        assert!(f.is_empty());
    }

    #[test]
    fn forty_two() {
        let f = Function::<fn() -> i32>::new(|| 42);

        assert!(!f.is_empty());
        assert_eq!(f.placement(), Some(Placement::Inline));
        assert_eq!(f.call(), Ok(42));
        assert_eq!(f.call(), Ok(42));
    }

    #[test]
    fn arguments() {
        let f = Function::<fn(i32, i32) -> i32>::new(|a: i32, b: i32| a - b);
        assert_eq!(f.call(10, 3), Ok(7));
        assert_eq!(f.invoke((3, 10)), Ok(-7));

        let greeting = String::from("Hello");
        let f = Function::<fn(String) -> String>::new(move |name: String| format!("{}, {}!", greeting, name));
        assert_eq!(f.call("world".to_owned()).unwrap(), "Hello, world!");

        let f = Function::<fn(u8, u8, u8, u8, u8, u8, u8, u8) -> u8>::new(
            |a: u8, b: u8, c: u8, d: u8, e: u8, f: u8, g: u8, h: u8| a + b + c + d + e + f + g + h,
        );
        assert_eq!(f.call(1, 1, 1, 1, 1, 1, 1, 1), Ok(8));
    }

    #[test]
    fn function_pointer() {
        let f = Function::<fn(u32) -> u32>::new(double as fn(u32) -> u32);

        assert_eq!(f.placement(), Some(Placement::Inline));
        assert_eq!(f.call(4), Ok(8));
    }

    #[test]
    fn clone_inline() {
        let count = Cell::new(0usize);
        let f = Counter::new(move || {
            count.set(count.get() + 1);
            count.get()
        });
        assert_eq!(f.placement(), Some(Placement::Inline));

        assert_eq!(f.call(), Ok(1));

        let g = f.clone();
        assert_eq!(g.placement(), Some(Placement::Inline));

        // Same state at the time of the clone, independent afterwards.
        assert_eq!(f.call(), Ok(2));
        assert_eq!(g.call(), Ok(2));
        assert_eq!(f.call(), Ok(3));
        assert_eq!(f.call(), Ok(4));
        assert_eq!(g.call(), Ok(3));
    }

    #[test]
    fn clone_heap() {
        let buffer = [1u8; 64];
        let count = Cell::new(0usize);

        let f = Counter::new(move || {
            count.set(count.get() + 1);
            count.get() + buffer.iter().map(|&x| x as usize).sum::<usize>()
        });
        assert_eq!(f.placement(), Some(Placement::Heap));

        assert_eq!(f.call(), Ok(1 + 64));

        let g = f.clone();
        assert_eq!(g.placement(), Some(Placement::Heap));
        assert_ne!(f.storage.raw_heap_ptr(), g.storage.raw_heap_ptr());

        assert_eq!(f.call(), Ok(2 + 64));
        assert_eq!(f.call(), Ok(3 + 64));
        assert_eq!(g.call(), Ok(2 + 64));
    }

    #[test]
    fn clone_empty() {
        let f = Counter::empty();
        let g = f.clone();

        assert!(g.is_empty());
        assert_eq!(g.call(), Err(BadFunctionCall));
    }

    #[test]
    fn take() {
        let mut f = Function::<fn(u32) -> u32>::new(move |x: u32| x + 1);
        let g = f.take();

        assert!(f.is_empty());
        assert_eq!(f.call(1), Err(BadFunctionCall));

        assert!(!g.is_empty());
        assert_eq!(g.call(1), Ok(2));

        // Moving out of an empty `Function` yields an empty `Function`.
        let h = f.take();
        assert!(h.is_empty());
    }

    #[test]
    fn take_heap() {
        let offset = [3u64; 4];
        let mut f = Function::<fn(u64) -> u64>::new(move |x: u64| x + offset[0]);
        let ptr = f.storage.raw_heap_ptr();

        let g = f.take();

        assert!(f.is_empty());
        assert_eq!(f.call(1), Err(BadFunctionCall));

        // Pointer hand-off.
        assert_eq!(g.storage.raw_heap_ptr(), ptr);
        assert_eq!(g.call(1), Ok(4));
    }

    #[test]
    fn move_from() {
        let mut f = Function::<fn(u32) -> u32>::new(double as fn(u32) -> u32);
        let mut g = Function::<fn(u32) -> u32>::new(triple as fn(u32) -> u32);

        f.move_from(&mut g);

        assert!(g.is_empty());
        assert_eq!(f.call(2), Ok(6));

        // Moving in an empty `Function` empties the target.
        f.move_from(&mut g);
        assert!(f.is_empty());
    }

    #[test]
    #[allow(clippy::self_assignment)]
    fn self_assignment() {
        let mut f = Function::<fn(u32) -> u32>::new(double as fn(u32) -> u32);
        f = f;

        assert_eq!(f.call(2), Ok(4));

        let mut e = Function::<fn(u32) -> u32>::empty();
        e = e;

        assert!(e.is_empty());
    }

    #[test]
    fn assignment() {
        let mut f = Function::<fn(u32) -> u32>::new(double as fn(u32) -> u32);
        let g = Function::<fn(u32) -> u32>::new(triple as fn(u32) -> u32);

        f.clone_from(&g);
        assert_eq!(f.call(2), Ok(6));
        assert_eq!(g.call(2), Ok(6));

        f = Function::new(|x: u32| x + 100);
        assert_eq!(f.call(2), Ok(102));

        f.clone_from(&Function::empty());
        assert!(f.is_empty());
    }

    #[test]
    fn clone_panics() {
        let explosive = Explosive {
            armed: true,
            value: 7,
        };
        let f = Function::<fn() -> i32>::new(move || {
            let explosive = &explosive;
            explosive.value
        });

        let result = catch_unwind(AssertUnwindSafe(|| f.clone()));
        assert!(result.is_err());

        assert_eq!(f.call(), Ok(7));
    }

    #[test]
    fn clone_from_panics_inline() {
        let explosive = Explosive {
            armed: true,
            value: 7,
        };
        let source = Function::<fn() -> i32>::new(move || {
            let explosive = &explosive;
            explosive.value
        });

        let mut f = Function::<fn() -> i32>::new(|| 1);

        let result = catch_unwind(AssertUnwindSafe(|| f.clone_from(&source)));
        assert!(result.is_err());

        // Left-hand side unchanged.
        assert_eq!(f.placement(), Some(Placement::Inline));
        assert_eq!(f.call(), Ok(1));

        assert_eq!(source.call(), Ok(7));
    }

    #[test]
    fn clone_from_panics_heap() {
        let explosive = Explosive {
            armed: true,
            value: 7,
        };
        let padding = [0i32; 16];
        let source = Function::<fn() -> i32>::new(move || {
            let explosive = &explosive;
            explosive.value + padding[0]
        });
        assert_eq!(source.placement(), Some(Placement::Heap));

        let tag = Rc::new(5);
        let mut f = Function::<fn() -> i32>::new({
            let tag = tag.clone();
            let padding = [0i32; 16];
            move || *tag + padding[0]
        });
        let ptr = f.storage.raw_heap_ptr();

        let result = catch_unwind(AssertUnwindSafe(|| f.clone_from(&source)));
        assert!(result.is_err());

        // Same callable, same allocation.
        assert_eq!(f.storage.raw_heap_ptr(), ptr);
        assert_eq!(f.call(), Ok(5));
        assert_eq!(Rc::strong_count(&tag), 2);

        drop(f);
        assert_eq!(Rc::strong_count(&tag), 1);
    }

    #[test]
    #[should_panic(expected = "tried to clone an armed `Explosive`")]
    fn clone_from_propagates_panic() {
        let explosive = Explosive {
            armed: true,
            value: 7,
        };
        let source = Function::<fn() -> i32>::new(move || {
            let explosive = &explosive;
            explosive.value
        });

        let mut f = Function::<fn() -> i32>::empty();
        f.clone_from(&source);
    }

    #[test]
    fn drop_once() {
        let inline = Rc::new(());
        let heap = Rc::new(());

        {
            let f = Counter::new({
                let inline = inline.clone();
                move || Rc::strong_count(&inline)
            });
            assert_eq!(f.placement(), Some(Placement::Inline));

            let g = Counter::new({
                let heap = heap.clone();
                let padding = [0usize; 8];
                move || Rc::strong_count(&heap) + padding[0]
            });
            assert_eq!(g.placement(), Some(Placement::Heap));

            assert_eq!(Rc::strong_count(&inline), 2);
            assert_eq!(Rc::strong_count(&heap), 2);

            let mut f2 = f.clone();
            let g2 = g.clone();

            assert_eq!(Rc::strong_count(&inline), 3);
            assert_eq!(Rc::strong_count(&heap), 3);

            f2.move_from(&mut g2.clone());

            assert_eq!(Rc::strong_count(&inline), 2);
            assert_eq!(Rc::strong_count(&heap), 4);

            let mut f3 = f2.take();
            f3.clear();
            f3.clear();

            assert_eq!(Rc::strong_count(&inline), 2);
            assert_eq!(Rc::strong_count(&heap), 3);
        }

        assert_eq!(Rc::strong_count(&inline), 1);
        assert_eq!(Rc::strong_count(&heap), 1);
    }

    #[test]
    fn target() {
        let f = Function::<fn(u32) -> u32>::new(double as fn(u32) -> u32);

        let target = f.target::<fn(u32) -> u32>().unwrap();
        assert_eq!(target(4), 8);

        assert!(f.target::<u32>().is_none());
        assert!(f.target::<fn(u32) -> u64>().is_none());
    }

    #[test]
    fn target_closure() {
        let offset = 5u32;
        let add = move |x: u32| x + offset;
        let sub = move |x: u32| x - offset;

        let mut f = Function::<fn(u32) -> u32>::new(add);

        assert!(target_of(&f, &add).is_some());
        assert_eq!(target_of(&f, &add).unwrap()(1), 6);
        assert!(target_of(&f, &sub).is_none());

        f = Function::new(sub);

        assert!(target_of(&f, &add).is_none());
        assert!(target_of(&f, &sub).is_some());
        assert_eq!(f.call(6), Ok(1));
    }

    #[test]
    fn target_heap() {
        let buffer = [7u8; 32];
        let read = move |i: usize| buffer[i];

        let f = Function::<fn(usize) -> u8>::new(read);
        assert_eq!(f.placement(), Some(Placement::Heap));

        assert_eq!(target_of(&f, &read).unwrap()(3), 7);
    }

    #[test]
    fn target_mut() {
        let mut f = Function::<fn(u32) -> u32>::new(double as fn(u32) -> u32);

        *f.target_mut::<fn(u32) -> u32>().unwrap() = triple;
        assert_eq!(f.call(2), Ok(6));

        assert!(f.target_mut::<u32>().is_none());

        f.clear();
        assert!(f.target_mut::<fn(u32) -> u32>().is_none());
    }

    #[test]
    fn over_aligned() {
        #[repr(align(16))]
        #[derive(Clone, Copy)]
        struct OverAligned;

        let aligned = OverAligned;
        let f = Function::<fn() -> usize>::new(move || std::mem::align_of_val(&aligned));

        assert_eq!(f.placement(), Some(Placement::Heap));
        assert_eq!(f.call(), Ok(16));
    }

    #[test]
    fn debug() {
        let f = Function::<fn() -> i32>::new(|| 42);
        assert_eq!(format!("{:?}", f), "Function { placement: Some(Inline) }");

        let f = Function::<fn() -> i32>::empty();
        assert_eq!(format!("{:?}", f), "Function { placement: None }");
    }
}
