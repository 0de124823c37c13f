//! CORTX Core
//!
//! Resource model, provider abstraction and retry primitives shared by the
//! CORTX bucket provider and its command line front end.

pub mod differ;
pub mod provider;
pub mod resource;
pub mod retry;
