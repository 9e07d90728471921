//! Plugin discovery and loading.
//!
//! The core only cares about two things: which files in the plugin folder it
//! can load, and reporting the ones it recognizes but cannot run. Loading
//! itself is behind the [`PluginHost`] trait; [`NativePluginHost`] loads
//! native dynamic libraries exporting a small C ABI:
//!
//! * `lodestone_plugin_name() -> *const c_char` (required, NUL-terminated)
//! * `lodestone_plugin_enable() -> i32` (optional, 0 means success)
//! * `lodestone_plugin_disable()` (optional)

use async_trait::async_trait;
use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

const NAME_SYMBOL: &[u8] = b"lodestone_plugin_name\0";
const ENABLE_SYMBOL: &[u8] = b"lodestone_plugin_enable\0";
const DISABLE_SYMBOL: &[u8] = b"lodestone_plugin_disable\0";

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("failed to load library {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("{path} does not export {symbol}")]
    MissingSymbol { path: PathBuf, symbol: &'static str },

    #[error("plugin {name} failed to enable (code {code})")]
    EnableFailed { name: String, code: i32 },

    #[error("plugin {0} is already loaded")]
    Duplicate(String),

    #[error("plugin folder {path} is not accessible: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a file in the plugin folder looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginFormat {
    /// A dynamic library built for this platform.
    Native,
    /// A dynamic library built for another platform.
    ForeignNative,
    JavaArchive,
    Script,
    Wasm,
    Unrecognized,
}

impl PluginFormat {
    pub fn is_supported(self) -> bool {
        self == PluginFormat::Native
    }
}

impl fmt::Display for PluginFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginFormat::Native => "native",
            PluginFormat::ForeignNative => "foreign-platform native",
            PluginFormat::JavaArchive => "Java archive",
            PluginFormat::Script => "script",
            PluginFormat::Wasm => "WebAssembly",
            PluginFormat::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

/// Extension of native libraries on this platform.
pub fn native_extension() -> &'static str {
    std::env::consts::DLL_EXTENSION
}

/// Classifies a plugin folder entry by its extension.
pub fn classify(path: &Path) -> PluginFormat {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ext == native_extension() {
        return PluginFormat::Native;
    }
    match ext.as_str() {
        "so" | "dll" | "dylib" => PluginFormat::ForeignNative,
        "jar" => PluginFormat::JavaArchive,
        "js" | "lua" | "py" => PluginFormat::Script,
        "wasm" => PluginFormat::Wasm,
        _ => PluginFormat::Unrecognized,
    }
}

/// Callback invoked for every plugin folder entry that will not be loaded.
pub type UnsupportedCallback<'a> = &'a (dyn Fn(&Path, PluginFormat) + Send + Sync);

/// Loads and unloads plugins.
#[async_trait]
pub trait PluginHost: Send + Sync {
    /// Loads every supported plugin in `dir`, reporting the rest through
    /// `unsupported`. Returns the names of the plugins that loaded.
    async fn load_all(
        &self,
        dir: &Path,
        unsupported: UnsupportedCallback<'_>,
    ) -> Result<Vec<String>, PluginError>;

    /// Disables everything currently loaded, then loads `dir` again.
    async fn reload(
        &self,
        dir: &Path,
        unsupported: UnsupportedCallback<'_>,
    ) -> Result<Vec<String>, PluginError> {
        self.disable_all().await;
        self.load_all(dir, unsupported).await
    }

    async fn disable_all(&self);

    async fn plugin_names(&self) -> Vec<String>;
}

struct LoadedPlugin {
    path: PathBuf,
    disable: Option<unsafe extern "C" fn()>,
    // dropped last so the function pointers above stay valid until then
    _library: Library,
}

/// [`PluginHost`] backed by `libloading`.
#[derive(Default)]
pub struct NativePluginHost {
    plugins: RwLock<HashMap<String, LoadedPlugin>>,
}

impl NativePluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn load_library(path: &Path) -> Result<(String, LoadedPlugin), PluginError> {
        // SAFETY: loading runs the library's initializers; plugins are trusted
        // code placed in the plugin folder by the operator.
        let library = unsafe { Library::new(path) }.map_err(|e| PluginError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let name = unsafe {
            let symbol: Symbol<unsafe extern "C" fn() -> *const c_char> =
                library.get(NAME_SYMBOL).map_err(|_| PluginError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: "lodestone_plugin_name",
                })?;
            let raw = symbol();
            if raw.is_null() {
                return Err(PluginError::Load {
                    path: path.to_path_buf(),
                    reason: "lodestone_plugin_name returned null".to_string(),
                });
            }
            CStr::from_ptr(raw).to_string_lossy().into_owned()
        };

        let enable = unsafe {
            library
                .get::<unsafe extern "C" fn() -> i32>(ENABLE_SYMBOL)
                .ok()
                .map(|s| *s)
        };
        let disable = unsafe {
            library
                .get::<unsafe extern "C" fn()>(DISABLE_SYMBOL)
                .ok()
                .map(|s| *s)
        };

        if let Some(enable) = enable {
            let code = unsafe { enable() };
            if code != 0 {
                return Err(PluginError::EnableFailed { name, code });
            }
        }

        Ok((
            name,
            LoadedPlugin {
                path: path.to_path_buf(),
                disable,
                _library: library,
            },
        ))
    }
}

#[async_trait]
impl PluginHost for NativePluginHost {
    async fn load_all(
        &self,
        dir: &Path,
        unsupported: UnsupportedCallback<'_>,
    ) -> Result<Vec<String>, PluginError> {
        let io_err = |source| PluginError::Io {
            path: dir.to_path_buf(),
            source,
        };

        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
            info!("Created plugin directory: {}", dir.display());
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.path());
            }
        }
        files.sort();

        let mut loaded = Vec::new();
        for path in files {
            let format = classify(&path);
            if !format.is_supported() {
                unsupported(&path, format);
                continue;
            }

            debug!("Loading plugin from: {}", path.display());
            match Self::load_library(&path) {
                Ok((name, plugin)) => {
                    let mut plugins = self.plugins.write().await;
                    if plugins.contains_key(&name) {
                        if let Some(disable) = plugin.disable {
                            unsafe { disable() };
                        }
                        error!("{}", PluginError::Duplicate(name));
                        continue;
                    }
                    info!("🔌 Loaded plugin {} from {}", name, path.display());
                    plugins.insert(name.clone(), plugin);
                    loaded.push(name);
                }
                Err(e) => error!("Could not load plugin {}: {}", path.display(), e),
            }
        }
        Ok(loaded)
    }

    async fn disable_all(&self) {
        let mut plugins = self.plugins.write().await;
        for (name, plugin) in plugins.drain() {
            if let Some(disable) = plugin.disable {
                // SAFETY: the library is still loaded; it is dropped with `plugin`.
                unsafe { disable() };
            }
            debug!("Disabled plugin {} ({})", name, plugin.path.display());
        }
    }

    async fn plugin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Moves pending plugin files from `update_dir` into `plugin_dir`,
/// replacing older copies. Returns how many files were moved.
pub fn apply_pending_updates(update_dir: &Path, plugin_dir: &Path) -> std::io::Result<usize> {
    if !update_dir.is_dir() {
        return Ok(0);
    }
    std::fs::create_dir_all(plugin_dir)?;

    let mut moved = 0;
    for entry in std::fs::read_dir(update_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let target = plugin_dir.join(entry.file_name());
        let source = entry.path();
        if std::fs::rename(&source, &target).is_err() {
            // rename fails across filesystems
            std::fs::copy(&source, &target)?;
            std::fs::remove_file(&source)?;
        }
        info!("Applied plugin update {}", target.display());
        moved += 1;
    }
    Ok(moved)
}

/// Logs an entry the host will not load.
pub fn report_unsupported(path: &Path, format: PluginFormat) {
    match format {
        PluginFormat::Unrecognized => {
            warn!("Unrecognized plugin file: {}", path.display())
        }
        other => warn!(
            "Could not load plugin {}: {} plugins are not supported",
            path.display(),
            other
        ),
    }
}
