//! Executable units with derived enablement, and their composites.

mod cancel;
mod composite;
mod delegate;

pub use cancel::CancelToken;
pub use composite::{
    ChildOutcome, ChildReport, CompositeAggregateError, CompositeCommand, CompositeOptions,
};
pub use delegate::{Command, CommandBuilder};

use uuid::Uuid;

/// Stable identity of a [`Command`]. Composite membership compares ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(Uuid);

impl CommandId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State that converts to an enablement flag.
pub trait Truthy {
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

impl<T> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.is_some()
    }
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Truthy for Vec<T> {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

macro_rules! truthy_numbers {
    ($($ty:ty),*) => {
        $(
            impl Truthy for $ty {
                fn is_truthy(&self) -> bool {
                    *self != 0
                }
            }
        )*
    };
}

truthy_numbers!(i32, i64, u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(true.is_truthy());
        assert!(!Option::<u8>::None.is_truthy());
        assert!(Some(0).is_truthy());
        assert!(!String::new().is_truthy());
        assert!(vec![1].is_truthy());
        assert!(!0usize.is_truthy());
        assert!(3i64.is_truthy());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(CommandId::new(), CommandId::new());
    }
}
