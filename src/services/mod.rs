//! Domain services used by the websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! `registry` owns participant state, `dispatcher` owns fan-out to live
//! connections, and `connection` ties the two together for one transport
//! session. Route handlers stay focused on transport plumbing.

pub mod admission;
pub mod connection;
pub mod dispatcher;
pub mod registry;
