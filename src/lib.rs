//! Type-erased, clonable callable wrapper with the small function optimization.
//!
//! A [`Function<S>`] holds any [`Fn`] closure, function item or function pointer
//! matching the call signature `S`, written as a function pointer type:
//!
//! ```
//! use minifunction::{Function, Placement};
//!
//! let offset = 10u32;
//! let add = Function::<fn(u32) -> u32>::new(move |x: u32| x + offset);
//!
//! assert_eq!(add.call(5), Ok(15));
//! assert_eq!(add.placement(), Some(Placement::Inline));
//!
//! let table = [1u32, 2, 3, 4, 5, 6, 7, 8];
//! let lookup = Function::<fn(usize) -> u32>::new(move |i: usize| table[i]);
//!
//! assert_eq!(lookup.call(7), Ok(8));
//! assert_eq!(lookup.placement(), Some(Placement::Heap));
//! ```
//!
//! Callables which fit in one pointer (size and alignment) are stored in the wrapper itself;
//! larger ones are boxed. Either way the wrapper is two pointers large:
//! the storage and a reference to a static vtable for the concrete callable type.
//!
//! Calling an empty [`Function`] returns [`BadFunctionCall`].
//!
//! [`Function<S>`]: struct.Function.html
//! [`Function`]: struct.Function.html
//! [`BadFunctionCall`]: struct.BadFunctionCall.html

use static_assertions::{assert_eq_size, assert_not_impl_any};

mod error;
mod function;
mod signature;
mod storage;
mod vtable;

pub use {
    error::BadFunctionCall,
    function::Function,
    signature::{Callable, Signature},
    storage::Placement,
};

assert_eq_size!(Function<fn()>, [usize; 2]);
assert_eq_size!(Function<fn(String, Vec<u8>) -> String>, [usize; 2]);
assert_eq_size!(Option<Function<fn()>>, [usize; 2]); // Vtable reference niche.

assert_not_impl_any!(Function<fn()>: Send, Sync);
