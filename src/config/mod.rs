//! Site configuration resolution engine.
//!
//! Resolves the portfolio site configuration from layered sources:
//! 1. **Defaults** - Built-in baseline tree plus the tier overlay
//! 2. **Files** - `site.json`, `site.<tier>.json`, `site.local.json` (JSON or YAML)
//! 3. **Remote** - Optional document at `PORTFOLIO_CONFIG_URL`
//! 4. **Environment** - Mapped variables and the `PORTFOLIO_CONFIG_JSON` overlay
//!
//! ## Merge Strategy
//! Objects merge key-by-key; arrays and scalars from the higher-priority source
//! replace the lower one. After merging, `{{...}}` templates are resolved and the
//! result is validated against the site schema.
//!
//! ## Environment Variables
//! - `PORTFOLIO_ENV` - Deployment tier (`APP_ENV` is accepted as a fallback)
//! - `PORTFOLIO_CONFIG_DIR` - Directory holding site files (default: `./config`)
//! - `PORTFOLIO_CONFIG_URL` - Remote source for staging and production
//! - `PORTFOLIO_CONFIG_JSON` - JSON overlay merged into the environment source
//! - `PORTFOLIO_PUBLIC_*` - Variables exposed to templates under `env.*`

pub mod defaults;
pub mod diff;
pub mod env;
pub mod loader;
mod manager;
mod merge;
pub mod model;
mod path;
pub mod presets;
pub mod schema;
pub mod template;
mod types;
pub mod watcher;

pub use diff::{ConfigDiff, diff};
pub use env::{EnvAdapter, EnvProvider, MapEnv, ProcessEnv};
pub use loader::{Clock, FileFormat, LoaderStats, ManualClock, SourceLoader, SystemClock};
pub use manager::{
    ChangeListener, ConfigManager, ExportMetadata, ExportedConfig, ListenerHandle, ManagerOptions,
    SetOptions,
};
pub use merge::{deep_merge, deep_merge_all, merge_into};
pub use path::ConfigPath;
pub use schema::Schema;
pub use types::*;
