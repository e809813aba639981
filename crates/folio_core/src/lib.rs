pub mod api;
pub mod content;
pub mod error;
pub mod hooks;
pub mod idgen;
pub mod ids;
pub mod time;

pub use api::*;
pub use content::*;
pub use error::{FolioError, FolioResult};
pub use hooks::{FnHook, HookContext, HookError, HookMatcher, HookPipeline, HookResult, PreStoreHook};
pub use idgen::IdGenerator;
pub use ids::*;
pub use time::*;
