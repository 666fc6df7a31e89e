//! Operation groups bound to a session.
//!
//! Each group is a plain struct borrowing its session. Class-level groups
//! ([`System`], [`Auth`]) carry nothing else; instance-level groups such as
//! [`VFolder`] also carry the identity of the resource they act on. Every
//! method body is written once, as an async block, and handed to
//! [`bind`](crate::bind).

mod auth;
mod system;
mod vfolder;

pub use auth::{Auth, LoginResult};
pub use system::System;
pub use vfolder::VFolder;
