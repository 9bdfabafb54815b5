#![doc = "thingsync-core: core logic library for thingsync."]

//! This crate holds the data model and the publish pipeline for thingsync.
//! It knows nothing about HTTP: remote calls go through the
//! [`contract::ThingApi`] trait, implemented by the CLI crate's client and by
//! `mockall` mocks in tests.
//!
//! # Usage
//! Build a [`config::Config`], resolve [`config::Credentials`], hand both to a
//! [`publish::Publisher`] together with a `ThingApi` implementation, and call
//! `publish`.

pub mod attachment;
pub mod config;
pub mod contract;
pub mod error;
pub mod publish;

pub use attachment::AttachmentKind;
pub use config::{Config, CredentialOverrides, Credentials};
pub use error::PublishError;
pub use publish::{AttachmentOutcome, PublishReport, Publisher, ThingAction};
