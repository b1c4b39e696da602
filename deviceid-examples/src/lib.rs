//! Example applications for the `deviceid` resolver
//!
//! The `device_id_screen` example wires the resolver to the in-memory SDK and
//! renders the result the way a settings screen would.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Screen model that shows the resolved device ID
pub mod screen;
