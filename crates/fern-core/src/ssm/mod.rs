//! SSM-style parameter store.
//!
//! [`ParameterEngine`] owns parameters: versioned values under hierarchical
//! names, optionally sealed with a configured key. Name rules live in
//! [`name`], filter compilation in [`filter`].

mod engine;
pub mod filter;
pub mod name;
pub mod types;

pub use engine::{DESCRIBE_PAGE_SIZE, PATH_PAGE_SIZE, ParameterEngine, TAG_RESOURCE_TYPE};
pub use filter::{KeyMatcher, ParameterFilter};
pub use name::{ParamName, ParamPath};
pub use types::*;
