//! Structural/cosmetic versioning for procedural background images.
//!
//! A generated image is split into a [`model::BaseStructure`] (seed, size,
//! noise) and any number of [`model::CosmeticRender`]s (color mappings)
//! saved against it. The [`editor::Editor`] tracks one edit session: which
//! edits invalidate saved renders, when a build or save is allowed, and how
//! a structural edit is reconciled with existing renders.

pub mod compare;
pub mod config;
pub mod driver;
pub mod editor;
pub mod error;
pub mod lenient;
pub mod lifecycle;
pub mod model;
pub mod preview;
pub mod reconcile;
pub mod renders;
pub mod service;

pub use config::EditorConfig;
pub use editor::{Command, Editor, Event};
pub use error::{ServiceError, ServiceResult};
pub use model::{BaseStructure, ColorParams, CosmeticRender, Sbgb};
pub use reconcile::{Decision, EditOutcome};
