pub mod member_info;
pub use member_info::*;

pub mod relationship;
pub use relationship::*;

pub mod entity_info;
pub use entity_info::*;

pub mod metadata_provider;
pub use metadata_provider::*;

pub mod policy;
pub use policy::*;
