//! # Herald Template
//!
//! Version-keyed notification templates, the placeholder renderer and the
//! tenant-branding HTML wrapper for the email channel.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod branding;
pub mod model;
pub mod renderer;
pub mod store;

pub use branding::wrap_email_html;
pub use model::Template;
pub use renderer::{render, render_string};
pub use store::{InMemoryTemplateStore, TemplateStore};
