pub mod chat;
pub mod show;
pub mod tool;

use skimmer_core::{Config, Paths};
use skimmer_storage::FileChatStore;

/// Config plus the file-backed chat store under the same base directory.
pub(crate) fn load_env() -> anyhow::Result<(Config, FileChatStore)> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    Ok((config, FileChatStore::new(paths)))
}
