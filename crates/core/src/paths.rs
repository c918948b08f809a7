use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".skimmer"))
            .unwrap_or_else(|| PathBuf::from(".skimmer"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn chats_dir(&self) -> PathBuf {
        self.base.join("chats")
    }

    pub fn chat_file(&self, chat_id: &str) -> PathBuf {
        let safe_id = chat_id.replace([':', '/', '\\'], "_");
        self.chats_dir().join(format!("{}.jsonl", safe_id))
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_file_sanitizes_id() {
        let paths = Paths::with_base(PathBuf::from("/tmp/skimmer"));
        let file = paths.chat_file("a/b:c");
        assert_eq!(file, PathBuf::from("/tmp/skimmer/chats/a_b_c.jsonl"));
    }
}
