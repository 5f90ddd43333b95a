use std::rc::Rc;

use crate::context::DownloadContext;
use crate::error::HandlerError;
use crate::task::{DownloadTask, Spawner};

use super::in_memory::InMemoryPreHandler;
use super::{HandlerOutcome, PostDownloadHandler, SpawnMetadata};

/// Parse a URI list: one download per line, mirrors of the same content
/// separated by whitespace. Blank lines and `#` comments are skipped, as
/// are tokens that are not absolute URIs.
pub fn parse_uri_list(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|line| {
            let mirrors: Vec<String> = line
                .split_whitespace()
                .filter(|tok| match url::Url::parse(tok) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(token = %tok, error = %e, "skipping invalid URI in list");
                        false
                    }
                })
                .map(str::to_string)
                .collect();
            (!mirrors.is_empty()).then_some(mirrors)
        })
        .collect()
}

/// Turns a finished in-memory URI list into one child task per line.
#[derive(Debug, Clone)]
pub struct UriListPostHandler {
    suffixes: Vec<String>,
}

impl UriListPostHandler {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self {
            suffixes: suffixes.into_iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }
}

impl PostDownloadHandler for UriListPostHandler {
    fn name(&self) -> &'static str {
        "uri-list"
    }

    fn apply(&self, task: &DownloadTask, spawner: &mut Spawner<'_>) -> Result<HandlerOutcome, HandlerError> {
        let Some(content) = task.in_memory_content() else {
            return Ok(HandlerOutcome::NotApplicable);
        };
        let basename = task.context().first_file().map(|f| f.basename()).unwrap_or_default();
        if !InMemoryPreHandler::matches(&self.suffixes, &basename) {
            return Ok(HandlerOutcome::NotApplicable);
        }
        let text = std::str::from_utf8(content)
            .map_err(|e| HandlerError::new(self.name(), format!("{} is not UTF-8: {}", basename, e)))?;

        let metadata = Rc::new(SpawnMetadata {
            origin_task: task.id(),
            origin_uri: task.context().uris().first().cloned(),
            handler: self.name(),
        });
        for mirrors in parse_uri_list(text) {
            let context = DownloadContext::from_uris(&task.config().dir, mirrors, None);
            spawner.spawn(task.config().clone(), context, Rc::clone(&metadata));
        }
        Ok(HandlerOutcome::Applied)
    }
}
