//! # oopt-renderer
//!
//! Tera-based rendering of the pod manifests, config maps and the
//! hardware-abstraction port file.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use oopt_core::{ConfigTree, Settings};
//! use oopt_renderer::{Manifest, Renderer};
//!
//! fn render_all(tree: &ConfigTree) {
//!     if let Ok(renderer) = Renderer::new(None, Settings::default(), false) {
//!         for manifest in Manifest::all() {
//!             if let Ok(text) = renderer.pod(*manifest) {
//!                 println!("{}: {} bytes", manifest.file_name(), text.len());
//!             }
//!         }
//!         if let Ok(ports) = renderer.hal_ports(tree) {
//!             print!("{ports}");
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::{ConfigMapContext, HalPort, HalPortsContext, PodTemplateContext};
pub use engine::{Manifest, Renderer, TemplateEngine, HAL_CONFIG_MAP, SWITCH_CONFIG_MAP};
pub use error::RenderError;
