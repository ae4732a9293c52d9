//! Hypervisor collaborators: control-plane client, process runner and API
//! request models.
//!
//! ## Architecture
//!
//! - **VmmClient**: control-plane calls against a live hypervisor
//! - **ProcessRunner**: launching and supervising the hypervisor process
//!
//! Both are trait objects owned by the machine context, so either can be
//! replaced before boot.

pub mod client;
pub mod models;
pub mod process;

pub use client::{SocketClient, VmmClient};
pub use process::{CommandRunner, JailerConfig, ProcessRunner};
