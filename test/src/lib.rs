mod connector_helpers;
mod constants;

pub use connector_helpers::*;
pub use constants::*;
