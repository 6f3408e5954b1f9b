//! Runtime call-signature descriptors.
//!
//! Every [`Slot`](crate::Slot) records the parameter and return types of the
//! callable it wraps as a [`Signature`]. Invocations carry the types of the
//! supplied arguments alongside type-erased values, and dispatch is a match
//! over the [`ArgMatch`] produced by comparing the two.
//!
//! Argument lists are plain tuples implementing [`Args`]:
//!
//! ```
//! use switchboard_core::signature::{Args, ParamType};
//!
//! assert_eq!(<(i32, String)>::ARITY, 2);
//! assert_eq!(<(i32, String)>::param_types()[0], ParamType::of::<i32>());
//! assert_eq!(<()>::ARITY, 0);
//! ```

use std::any::{Any, TypeId};
use std::fmt;

/// A single type-erased argument value.
pub type ArgValue = Box<dyn Any + Send>;

/// A type-erased return value.
pub type ReturnValue = Box<dyn Any + Send>;

/// Descriptor of a single parameter or return type.
#[derive(Clone, Copy, Debug)]
pub struct ParamType {
    id: TypeId,
    name: &'static str,
}

impl ParamType {
    /// Describe the type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` of the described type.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// The type name, as reported by `std::any::type_name`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check whether this descriptor describes `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for ParamType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ParamType {}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Outcome of matching supplied arguments against a signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgMatch {
    /// Supplied argument types are exactly the parameter types.
    Exact,
    /// The leading supplied arguments match; `dropped` trailing arguments are
    /// discarded before invocation.
    Truncated { dropped: usize },
    /// Fewer arguments were supplied than the signature declares.
    TooFew { needed: usize, supplied: usize },
    /// The argument at `index` does not have the declared type.
    Mismatch {
        index: usize,
        expected: ParamType,
        found: ParamType,
    },
}

impl ArgMatch {
    /// Whether an invocation can proceed with this match.
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Exact | Self::Truncated { .. })
    }
}

impl fmt::Display for ArgMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact match"),
            Self::Truncated { dropped } => write!(f, "{dropped} trailing argument(s) dropped"),
            Self::TooFew { needed, supplied } => {
                write!(f, "{needed} argument(s) needed, {supplied} supplied")
            }
            Self::Mismatch {
                index,
                expected,
                found,
            } => write!(f, "argument {index} is {found}, expected {expected}"),
        }
    }
}

/// The call signature of a slot: ordered parameter types and a return type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    params: Vec<ParamType>,
    ret: ParamType,
}

impl Signature {
    /// Create a signature from parameter descriptors and a return descriptor.
    pub fn new(params: Vec<ParamType>, ret: ParamType) -> Self {
        Self { params, ret }
    }

    /// Number of declared parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Declared parameter types, in order.
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    /// Declared return type.
    pub fn ret(&self) -> ParamType {
        self.ret
    }

    /// Signature left after binding the first `count` parameters.
    pub(crate) fn without_leading(&self, count: usize) -> Self {
        Self {
            params: self.params[count.min(self.params.len())..].to_vec(),
            ret: self.ret,
        }
    }

    /// Match supplied argument types against the declared parameters.
    ///
    /// Extra trailing arguments are tolerated and reported as
    /// [`ArgMatch::Truncated`]; missing arguments or a type mismatch within
    /// the declared arity are not.
    pub fn match_args(&self, supplied: &[ParamType]) -> ArgMatch {
        let arity = self.arity();
        if supplied.len() < arity {
            return ArgMatch::TooFew {
                needed: arity,
                supplied: supplied.len(),
            };
        }

        let mismatch = self
            .params
            .iter()
            .zip(supplied)
            .position(|(expected, found)| expected != found);
        if let Some(index) = mismatch {
            return ArgMatch::Mismatch {
                index,
                expected: self.params[index],
                found: supplied[index],
            };
        }

        match supplied.len() - arity {
            0 => ArgMatch::Exact,
            dropped => ArgMatch::Truncated { dropped },
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fn(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// An argument list that can be passed to slots and signals.
///
/// Implemented for tuples of up to eight elements, including `()`.
/// Single arguments are written as one-element tuples: `(42,)`.
pub trait Args: Send + 'static {
    /// Number of arguments in the list.
    const ARITY: usize;

    /// Types of the arguments, in order.
    fn param_types() -> Vec<ParamType>;

    /// Convert the arguments into type-erased owned values.
    fn into_values(self) -> Vec<ArgValue>;
}

macro_rules! impl_args {
    ($count:expr; $($arg:ident),*) => {
        impl<$($arg: Send + 'static),*> Args for ($($arg,)*) {
            const ARITY: usize = $count;

            fn param_types() -> Vec<ParamType> {
                vec![$(ParamType::of::<$arg>()),*]
            }

            #[allow(non_snake_case)]
            fn into_values(self) -> Vec<ArgValue> {
                let ($($arg,)*) = self;
                vec![$(Box::new($arg) as ArgValue),*]
            }
        }
    };
}

impl_args!(0;);
impl_args!(1; A1);
impl_args!(2; A1, A2);
impl_args!(3; A1, A2, A3);
impl_args!(4; A1, A2, A3, A4);
impl_args!(5; A1, A2, A3, A4, A5);
impl_args!(6; A1, A2, A3, A4, A5, A6);
impl_args!(7; A1, A2, A3, A4, A5, A6, A7);
impl_args!(8; A1, A2, A3, A4, A5, A6, A7, A8);
