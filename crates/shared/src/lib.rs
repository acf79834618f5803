// idm-shared - components common to the IDM container tools

pub mod log;
pub mod util;
