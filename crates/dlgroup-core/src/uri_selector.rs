//! URI candidate selection and per-URI outcomes.

use serde::{Deserialize, Serialize};

use crate::result_code::ResultCode;

/// Outcome of one attempt against one URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriResult {
    pub uri: String,
    pub code: ResultCode,
}

impl UriResult {
    pub fn new(uri: impl Into<String>, code: ResultCode) -> Self {
        Self {
            uri: uri.into(),
            code,
        }
    }
}

pub trait UriSelector {
    /// Choose the URI for the next command. `None` when there are no candidates.
    fn select(&self, candidates: &[String], last_result: Option<&UriResult>) -> Option<String>;
}

/// Takes candidates in order, skipping the URI whose last attempt failed
/// while another candidate remains.
#[derive(Debug, Clone, Copy, Default)]
pub struct InorderUriSelector;

impl UriSelector for InorderUriSelector {
    fn select(&self, candidates: &[String], last_result: Option<&UriResult>) -> Option<String> {
        let failed = last_result
            .filter(|r| !r.code.is_finished())
            .map(|r| r.uri.as_str());
        candidates
            .iter()
            .find(|u| Some(u.as_str()) != failed)
            .or_else(|| candidates.first())
            .cloned()
    }
}
