//! Stable type names for components and events.
//!
//! Registries key component and event types by a name that is fixed at
//! compile time. The [`component!`](crate::component!) and
//! [`event!`](crate::event!) macros attach that name to a type; by default it
//! is the type's identifier.
//!
//! ```
//! use iodine_ecs::prelude::*;
//!
//! struct Position { x: f32, y: f32 }
//! struct Health(u32);
//! struct Hit;
//!
//! iodine_ecs::component!(Position, Health);
//! iodine_ecs::event!(Hit => "combat.hit");
//!
//! assert_eq!(<Position as Component>::NAME, "Position");
//! assert_eq!(<Hit as Event>::NAME, "combat.hit");
//! ```

/// Implement [`Component`](crate::component::Component) for one or more types.
///
/// `component!(A, B)` names each type after its identifier;
/// `component!(Path<T> => "name")` sets the name explicitly.
#[macro_export]
macro_rules! component {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl $crate::component::Component for $ty {
                const NAME: &'static str = ::core::stringify!($ty);
            }
        )+
    };
    ($ty:ty => $name:literal) => {
        impl $crate::component::Component for $ty {
            const NAME: &'static str = $name;
        }
    };
}

/// Implement [`Event`](crate::event::Event) for one or more types.
///
/// Same forms as [`component!`](crate::component!).
#[macro_export]
macro_rules! event {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl $crate::event::Event for $ty {
                const NAME: &'static str = ::core::stringify!($ty);
            }
        )+
    };
    ($ty:ty => $name:literal) => {
        impl $crate::event::Event for $ty {
            const NAME: &'static str = $name;
        }
    };
}
