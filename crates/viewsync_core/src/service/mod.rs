//! Use-case services over the store clients.
//!
//! # Responsibility
//! - Orchestrate store calls into reconciliation, batch and publish flows.
//! - Receive every store client as an injected collaborator.

pub mod consumer;
pub mod publish_service;
pub mod reconciler;
