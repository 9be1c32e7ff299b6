//! A normalized, dependency-tracking document cache for GraphQL clients.
//!
//! Query responses are deconstructed into a graph of entity records keyed by
//! type and id. Later operations are answered from that graph without a
//! round-trip, and every read records the exact set of entity fields it
//! touched so that a write can name the operations it staled.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]
#![warn(unreachable_pub)]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod json_ext;

mod configuration;
pub mod error;
mod operations;
mod spec;
mod store;

pub use configuration::CacheConfig;
pub use configuration::FieldCoordinate;
pub use configuration::FieldResolver;
pub use configuration::KeyResolver;
pub use configuration::ResolverContext;
pub use operations::read::ReadOutcome;
pub use operations::read::ReadResult;
pub use operations::write::WriteResult;
pub use spec::Schema;
pub use store::keys::EntityField;
pub use store::keys::EntityKey;
pub use store::keys::FieldKey;
pub use store::keys::OperationKey;
pub use store::Store;
pub use store::StoreSnapshot;
