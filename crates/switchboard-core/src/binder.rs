//! Building slots from callables, with optional pre-bound arguments.
//!
//! [`SlotFn`] and [`MethodFn`] are implemented for every function and
//! closure of up to eight parameters. They are what lets [`Slot::new`] take
//! a plain `fn(i32, i32) -> i32` and record its signature.
//!
//! A [`Binder`] additionally fixes leading arguments at build time; the
//! resulting slot's signature is the remaining tail of parameters:
//!
//! ```
//! use switchboard_core::Binder;
//!
//! fn scale(factor: i32, value: i32) -> i32 {
//!     factor * value
//! }
//!
//! let double = Binder::function(scale).bind(2).name("double").build().unwrap();
//! assert_eq!(double.arity(), 1);
//! assert_eq!(double.call::<i32, _>((21,)).unwrap(), 42);
//! ```

use std::sync::Arc;

use crate::error::BindError;
use crate::signature::{ArgValue, ParamType, ReturnValue, Signature};
use crate::slot::{Invoker, Slot};
use crate::worker::Worker;

/// A callable that can back a slot.
///
/// `A` is the parameter tuple and `R` the return type. Implemented for any
/// `Fn(A1, .., An) -> R + Send + Sync + 'static` with `n <= 8`.
pub trait SlotFn<A, R>: Send + Sync + 'static {
    /// Descriptors of the callable's parameters, in order.
    fn param_types() -> Vec<ParamType>;

    /// Erase the callable into an invoker over boxed values.
    #[doc(hidden)]
    fn into_invoker(self) -> Invoker;
}

/// A method that can back a slot when paired with a shared receiver.
///
/// Implemented for any `Fn(&T, A1, .., An) -> R + Send + Sync + 'static`
/// with `n <= 8`, which includes method paths such as `Counter::add`.
pub trait MethodFn<T, A, R>: Send + Sync + 'static {
    /// Descriptors of the method's parameters, excluding the receiver.
    fn param_types() -> Vec<ParamType>;

    /// Erase the method and its receiver into an invoker.
    #[doc(hidden)]
    fn into_invoker(self, receiver: Arc<T>) -> Invoker;
}

macro_rules! impl_slot_fn {
    ($($arg:ident),*) => {
        impl<Func, Ret, $($arg),*> SlotFn<($($arg,)*), Ret> for Func
        where
            Func: Fn($($arg),*) -> Ret + Send + Sync + 'static,
            Ret: Send + 'static,
            $($arg: Send + 'static,)*
        {
            fn param_types() -> Vec<ParamType> {
                vec![$(ParamType::of::<$arg>()),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_invoker(self) -> Invoker {
                Arc::new(move |values: Vec<ArgValue>| {
                    let mut values = values.into_iter();
                    $(let $arg = *values.next()?.downcast::<$arg>().ok()?;)*
                    Some(Box::new((self)($($arg),*)) as ReturnValue)
                })
            }
        }

        impl<Func, Recv, Ret, $($arg),*> MethodFn<Recv, ($($arg,)*), Ret> for Func
        where
            Func: Fn(&Recv, $($arg),*) -> Ret + Send + Sync + 'static,
            Recv: Send + Sync + 'static,
            Ret: Send + 'static,
            $($arg: Send + 'static,)*
        {
            fn param_types() -> Vec<ParamType> {
                vec![$(ParamType::of::<$arg>()),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_invoker(self, receiver: Arc<Recv>) -> Invoker {
                Arc::new(move |values: Vec<ArgValue>| {
                    let mut values = values.into_iter();
                    $(let $arg = *values.next()?.downcast::<$arg>().ok()?;)*
                    Some(Box::new((self)(&*receiver, $($arg),*)) as ReturnValue)
                })
            }
        }
    };
}

impl_slot_fn!();
impl_slot_fn!(A1);
impl_slot_fn!(A1, A2);
impl_slot_fn!(A1, A2, A3);
impl_slot_fn!(A1, A2, A3, A4);
impl_slot_fn!(A1, A2, A3, A4, A5);
impl_slot_fn!(A1, A2, A3, A4, A5, A6);
impl_slot_fn!(A1, A2, A3, A4, A5, A6, A7);
impl_slot_fn!(A1, A2, A3, A4, A5, A6, A7, A8);

/// A leading argument fixed at build time.
struct BoundArg {
    ty: ParamType,
    make: Box<dyn Fn() -> ArgValue + Send + Sync>,
}

/// Builder for slots with bound arguments, a name or a worker.
///
/// Bound values are cloned into every invocation. Validation happens in
/// [`build`](Self::build): binding more values than the callable accepts,
/// or a value of the wrong type, is rejected there.
pub struct Binder {
    signature: Signature,
    invoker: Invoker,
    bound: Vec<BoundArg>,
    name: Option<String>,
    worker: Option<Worker>,
}

impl Binder {
    /// Start from a function or closure.
    pub fn function<F, A, R>(f: F) -> Self
    where
        F: SlotFn<A, R>,
        R: 'static,
    {
        Self {
            signature: Signature::new(F::param_types(), ParamType::of::<R>()),
            invoker: f.into_invoker(),
            bound: Vec::new(),
            name: None,
            worker: None,
        }
    }

    /// Start from a method and the receiver it is called on.
    pub fn method<T, F, A, R>(receiver: Arc<T>, method: F) -> Self
    where
        F: MethodFn<T, A, R>,
        R: 'static,
    {
        Self {
            signature: Signature::new(F::param_types(), ParamType::of::<R>()),
            invoker: method.into_invoker(receiver),
            bound: Vec::new(),
            name: None,
            worker: None,
        }
    }

    /// Fix the next leading argument to `value`.
    pub fn bind<V>(mut self, value: V) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        self.bound.push(BoundArg {
            ty: ParamType::of::<V>(),
            make: Box::new(move || Box::new(value.clone()) as ArgValue),
        });
        self
    }

    /// Name the slot, for diagnostics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Bind the slot to a worker for asynchronous invocation.
    pub fn worker(mut self, worker: Worker) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Validate the bound arguments and create the slot.
    pub fn build(self) -> Result<Slot, BindError> {
        let arity = self.signature.arity();
        if self.bound.len() > arity {
            return Err(BindError::TooManyArguments {
                bound: self.bound.len(),
                arity,
            });
        }

        for (index, (arg, expected)) in self.bound.iter().zip(self.signature.params()).enumerate() {
            if arg.ty != *expected {
                return Err(BindError::TypeMismatch {
                    index,
                    expected: expected.name(),
                    found: arg.ty.name(),
                });
            }
        }

        let signature = self.signature.without_leading(self.bound.len());
        let invoker = if self.bound.is_empty() {
            self.invoker
        } else {
            let inner = self.invoker;
            let bound = self.bound;
            Arc::new(move |rest: Vec<ArgValue>| {
                let mut values: Vec<ArgValue> = Vec::with_capacity(bound.len() + rest.len());
                values.extend(bound.iter().map(|arg| (arg.make)()));
                values.extend(rest);
                (inner)(values)
            }) as Invoker
        };

        Ok(Slot::from_parts(signature, invoker, self.name, self.worker))
    }
}

/// Create a slot from a function or closure.
///
/// Shorthand for [`Slot::new`].
pub fn new_slot<F, A, R>(f: F) -> Slot
where
    F: SlotFn<A, R>,
    R: 'static,
{
    Slot::new(f)
}

/// Create a slot from a method and its receiver.
///
/// Shorthand for [`Slot::from_method`].
pub fn new_method_slot<T, F, A, R>(receiver: Arc<T>, method: F) -> Slot
where
    F: MethodFn<T, A, R>,
    R: 'static,
{
    Slot::from_method(receiver, method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SlotError;
    use parking_lot::Mutex;

    fn sum(a: i32, b: i32) -> i32 {
        a + b
    }

    struct Greeter {
        log: Mutex<Vec<String>>,
    }

    impl Greeter {
        fn greet(&self, greeting: String, who: String) {
            self.log.lock().push(format!("{greeting}, {who}"));
        }
    }

    #[test]
    fn test_function_without_binding() {
        let slot = Binder::function(sum).build().unwrap();
        assert_eq!(slot.arity(), 2);
        assert_eq!(slot.call::<i32, _>((40, 2)), Ok(42));
    }

    #[test]
    fn test_bound_prefix_reduces_arity() {
        let slot = Binder::function(sum).bind(40).build().unwrap();
        assert_eq!(slot.arity(), 1);
        assert_eq!(slot.signature().to_string(), "fn(i32) -> i32");
        assert_eq!(slot.call::<i32, _>((2,)), Ok(42));
        // Bound values are reused for every call
        assert_eq!(slot.call::<i32, _>((3,)), Ok(43));
    }

    #[test]
    fn test_fully_bound_slot() {
        let slot = Binder::function(sum).bind(40).bind(2).build().unwrap();
        assert_eq!(slot.arity(), 0);
        assert_eq!(slot.call::<i32, _>(()), Ok(42));
        assert_eq!(slot.call::<i32, _>(("ignored",)), Ok(42));
    }

    #[test]
    fn test_bound_method() {
        let greeter = Arc::new(Greeter {
            log: Mutex::new(Vec::new()),
        });
        let slot = Binder::method(greeter.clone(), Greeter::greet)
            .bind("Hello".to_string())
            .build()
            .unwrap();

        slot.run(("world".to_string(),)).unwrap();
        assert_eq!(greeter.log.lock().as_slice(), ["Hello, world"]);
    }

    #[test]
    fn test_too_many_bound_arguments() {
        let result = Binder::function(sum).bind(1).bind(2).bind(3).build();
        assert_eq!(
            result.unwrap_err(),
            BindError::TooManyArguments { bound: 3, arity: 2 }
        );
    }

    #[test]
    fn test_bound_type_mismatch() {
        let result = Binder::function(sum).bind(1.5f64).build();
        assert!(matches!(
            result,
            Err(BindError::TypeMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn test_name_and_worker() {
        let worker = Worker::new();
        let slot = Binder::function(sum)
            .name("sum")
            .worker(worker.clone())
            .build()
            .unwrap();

        assert_eq!(slot.name(), Some("sum"));
        assert_eq!(slot.worker(), Some(worker.clone()));
        assert_eq!(slot.async_call::<i32, _>((1, 2)).unwrap().get(), Ok(3));

        worker.stop();
    }

    #[test]
    fn test_bound_slot_rejects_short_tail() {
        let slot = Binder::function(|a: i32, b: i32, c: i32| a + b + c)
            .bind(1)
            .build()
            .unwrap();
        assert!(matches!(slot.run((2,)), Err(SlotError::BadRun(_))));
        assert_eq!(slot.call::<i32, _>((2, 3)), Ok(6));
    }

    #[test]
    fn test_shorthand_constructors() {
        let greeter = Arc::new(Greeter {
            log: Mutex::new(Vec::new()),
        });
        assert_eq!(new_slot(sum).arity(), 2);
        assert_eq!(new_method_slot(greeter, Greeter::greet).arity(), 2);
    }
}
