//! Tera rendering engine: [`Manifest`] kinds, [`TemplateEngine`] and the
//! settings-aware [`Renderer`].
//!
//! | Manifest            | Template             | Pod         | Config map     |
//! |---------------------|----------------------|-------------|----------------|
//! | StateDb             | `redis.yml.tera`     | `redis`     |                |
//! | NetworkOs           | `sonic.yml.tera`     | `sonic`     | `sonic-config` |
//! | TransportSync       | `transyncd.yml.tera` | `transyncd` |                |
//! | HardwareAbstraction | `ofdpa.yml.tera`     | `ofdpa`     | `ofdpa-config` |

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tera::Tera;
use tracing::debug;

use oopt_core::{ConfigTree, Settings};

use crate::context::{ConfigMapContext, HalPortsContext, PodCtx, PodTemplateContext, STATE_DB_DIR};
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates
// ---------------------------------------------------------------------------

pub const CONFIG_MAP_TEMPLATE: &str = "configmap.yml.tera";
pub const HAL_PORTS_TEMPLATE: &str = "ofdpa.conf.tera";

const TPLS: &[(&str, &str)] = &[
    ("redis.yml.tera", include_str!("templates/redis.yml.tera")),
    ("sonic.yml.tera", include_str!("templates/sonic.yml.tera")),
    ("transyncd.yml.tera", include_str!("templates/transyncd.yml.tera")),
    ("ofdpa.yml.tera", include_str!("templates/ofdpa.yml.tera")),
    (CONFIG_MAP_TEMPLATE, include_str!("templates/configmap.yml.tera")),
    (HAL_PORTS_TEMPLATE, include_str!("templates/ofdpa.conf.tera")),
];

pub const SWITCH_CONFIG_MAP: &str = "sonic-config";
pub const HAL_CONFIG_MAP: &str = "ofdpa-config";

/// Key of the switch configuration inside its config map.
pub const SWITCH_CONFIG_KEY: &str = "config_db.json";
/// Key of the port configuration inside the hardware-abstraction config map.
pub const HAL_PORTS_KEY: &str = "ofdpa.conf";

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    let mut templates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        debug!(template = %name, "user template override");
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert((*name).to_string(), (*content).to_string());
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// The managed processes, each run as one pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Manifest {
    StateDb,
    NetworkOs,
    TransportSync,
    HardwareAbstraction,
}

impl Manifest {
    pub fn all() -> &'static [Manifest] {
        &[
            Manifest::StateDb,
            Manifest::NetworkOs,
            Manifest::TransportSync,
            Manifest::HardwareAbstraction,
        ]
    }

    pub fn pod_name(&self) -> &'static str {
        match self {
            Manifest::StateDb => "redis",
            Manifest::NetworkOs => "sonic",
            Manifest::TransportSync => "transyncd",
            Manifest::HardwareAbstraction => "ofdpa",
        }
    }

    pub fn template_name(&self) -> &'static str {
        match self {
            Manifest::StateDb => "redis.yml.tera",
            Manifest::NetworkOs => "sonic.yml.tera",
            Manifest::TransportSync => "transyncd.yml.tera",
            Manifest::HardwareAbstraction => "ofdpa.yml.tera",
        }
    }

    /// File name the rendered manifest is written under.
    pub fn file_name(&self) -> String {
        format!("{}.yml", self.pod_name())
    }

    pub fn config_map(&self) -> Option<&'static str> {
        match self {
            Manifest::NetworkOs => Some(SWITCH_CONFIG_MAP),
            Manifest::HardwareAbstraction => Some(HAL_CONFIG_MAP),
            Manifest::StateDb | Manifest::TransportSync => None,
        }
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pod_name())
    }
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Tera-based engine for rendering templates with optional user overrides.
///
/// `user_template_dir` may contain `.tera` files named like the embedded
/// ones; those replace the defaults.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        let tera = build_tera(user_template_dir)?;
        Ok(TemplateEngine { tera })
    }

    pub fn render_pod(&self, manifest: Manifest, ctx: &PodTemplateContext) -> Result<String, RenderError> {
        Ok(self.tera.render(manifest.template_name(), &ctx.to_tera_context()?)?)
    }

    pub fn render_config_map(&self, ctx: &ConfigMapContext) -> Result<String, RenderError> {
        Ok(self.tera.render(CONFIG_MAP_TEMPLATE, &ctx.to_tera_context()?)?)
    }

    pub fn render_hal_ports(&self, ctx: &HalPortsContext) -> Result<String, RenderError> {
        Ok(self.tera.render(HAL_PORTS_TEMPLATE, &ctx.to_tera_context()?)?)
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders manifests and config maps from [`Settings`].
///
/// Create once per invocation with [`Renderer::new`] and reuse.
pub struct Renderer {
    engine: TemplateEngine,
    settings: Settings,
    virtual_mode: bool,
}

impl Renderer {
    pub fn new(
        user_template_dir: Option<&Path>,
        settings: Settings,
        virtual_mode: bool,
    ) -> Result<Self, RenderError> {
        Ok(Renderer {
            engine: TemplateEngine::new(user_template_dir)?,
            settings,
            virtual_mode,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether the virtual images are rendered and the hardware-abstraction
    /// process is left out.
    pub fn virtual_mode(&self) -> bool {
        self.virtual_mode
    }

    pub fn pod_context(&self, manifest: Manifest) -> PodTemplateContext {
        let images = &self.settings.images;
        let image = match manifest {
            Manifest::StateDb => images.state_db.clone(),
            Manifest::NetworkOs => images.network_os(self.virtual_mode).to_owned(),
            Manifest::TransportSync => images.transport_sync(self.virtual_mode).to_owned(),
            Manifest::HardwareAbstraction => images.hardware_abstraction.clone(),
        };
        PodTemplateContext::new(PodCtx {
            name: manifest.pod_name().to_owned(),
            image,
            state_db_image: images.state_db.clone(),
            state_db_dir: STATE_DB_DIR.to_owned(),
            config_map: manifest.config_map().map(str::to_owned),
        })
    }

    /// The pod manifest of `manifest`.
    pub fn pod(&self, manifest: Manifest) -> Result<String, RenderError> {
        self.engine.render_pod(manifest, &self.pod_context(manifest))
    }

    /// Config map carrying the network-OS `config_db.json`.
    pub fn switch_config_map(&self, config_json: &str) -> Result<String, RenderError> {
        let ctx = ConfigMapContext::new(SWITCH_CONFIG_MAP)
            .with_entry(SWITCH_CONFIG_KEY, config_json);
        self.engine.render_config_map(&ctx)
    }

    /// The hardware-abstraction port configuration for `tree`.
    pub fn hal_ports(&self, tree: &ConfigTree) -> Result<String, RenderError> {
        let ctx = HalPortsContext::from_tree(tree)?;
        self.engine.render_hal_ports(&ctx)
    }

    /// Config map carrying the hardware-abstraction port configuration.
    pub fn hal_config_map(&self, tree: &ConfigTree) -> Result<String, RenderError> {
        let ports = self.hal_ports(tree)?;
        let ctx = ConfigMapContext::new(HAL_CONFIG_MAP).with_entry(HAL_PORTS_KEY, &ports);
        self.engine.render_config_map(&ctx)
    }
}
