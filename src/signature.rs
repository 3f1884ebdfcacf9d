use crate::{error::BadFunctionCall, function::Function};

/// Call signature of a [`Function`]: its argument types and return type.
///
/// Implemented for function pointer types of up to 8 arguments,
/// which are only ever used as markers: `Function<fn(u32, &'static str) -> bool>`.
///
/// Argument and return types must be `'static`: the vtables of a [`Function`] are `'static`
/// and name them. `fn(&str)` (which is `for<'a> fn(&'a str)`) is not a `Signature`,
/// but `fn(&'static str)` is.
///
/// [`Function`]: struct.Function.html
pub trait Signature: 'static {
    /// Argument types as a tuple.
    type Args;
    /// Return type.
    type Output;
}

/// A callable which may be stored in a [`Function`] with signature `S`.
///
/// Implemented for every [`Fn`] closure, function item and function pointer
/// with matching argument and return types.
///
/// [`Function`]: struct.Function.html
pub trait Callable<S: Signature> {
    /// Calls the callable with the argument tuple `args`.
    fn invoke(&self, args: S::Args) -> S::Output;
}

macro_rules! signature {
    ($($arg:ident: $ty:ident),*) => {
        impl<R: 'static, $($ty: 'static,)*> Signature for fn($($ty),*) -> R {
            type Args = ($($ty,)*);
            type Output = R;
        }

        impl<Func, R: 'static, $($ty: 'static,)*> Callable<fn($($ty),*) -> R> for Func
        where
            Func: Fn($($ty),*) -> R,
        {
            #[inline]
            fn invoke(&self, ($($arg,)*): ($($ty,)*)) -> R {
                (self)($($arg),*)
            }
        }

        impl<R: 'static, $($ty: 'static,)*> Function<fn($($ty),*) -> R> {
            /// Calls the stored callable with the arguments and returns its result.
            ///
            /// Returns [`BadFunctionCall`] if the [`Function`] is empty.
            ///
            /// [`BadFunctionCall`]: struct.BadFunctionCall.html
            /// [`Function`]: struct.Function.html
            #[inline]
            pub fn call(&self, $($arg: $ty),*) -> Result<R, BadFunctionCall> {
                self.invoke(($($arg,)*))
            }
        }
    };
}

signature!();
signature!(a: A);
signature!(a: A, b: B);
signature!(a: A, b: B, c: C);
signature!(a: A, b: B, c: C, d: D);
signature!(a: A, b: B, c: C, d: D, e: E);
signature!(a: A, b: B, c: C, d: D, e: E, f: F);
signature!(a: A, b: B, c: C, d: D, e: E, f: F, g: G);
signature!(a: A, b: B, c: C, d: D, e: E, f: F, g: G, h: H);
