pub const REVPOP_CHAIN_ID: &str = "3eb7485cde282aabdfaf41d54fa4fedb1fe2537c598c969b0f4dce412f8ad29d";
pub const REVPOP_DEV_CHAIN_ID: &str = "147f0c14427dc6c28ecc977229e5067cf3608cb6d16f79aa39888845ee4ca2bf";
pub const UNKNOWN_CHAIN_ID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

pub const NODE_A: &str = "wss://A";
pub const NODE_B: &str = "wss://B";
pub const NODE_C: &str = "wss://C";
pub const NODE_D: &str = "wss://D";
