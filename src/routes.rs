//! Static route/page provider.
//!
//! Pages come from config or a YAML list. The visible list is computed once
//! at construction, so a later config change cannot reorder an export that
//! already took its snapshot.

use serde::Deserialize;
use std::path::Path;

use crate::host::PageSource;
use crate::types::PageDescriptor;
use crate::{DexError, Result};

#[derive(Debug, Clone, Default)]
pub struct StaticPages {
    pages: Vec<PageDescriptor>,
}

/// YAML accepts either a bare list or `{ pages: [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PageList {
    Bare(Vec<PageDescriptor>),
    Wrapped { pages: Vec<PageDescriptor> },
}

impl StaticPages {
    /// Sorts by page number (unnumbered pages last, by `order`), drops
    /// hidden pages, and fills empty titles with `Page N`.
    pub fn new(pages: impl IntoIterator<Item = PageDescriptor>) -> Self {
        let mut pages: Vec<PageDescriptor> = pages.into_iter().filter(|p| !p.hidden).collect();
        pages.sort_by_key(|p| (p.page_number.is_none(), p.page_number, p.order));

        for (index, page) in pages.iter_mut().enumerate() {
            if page.title.trim().is_empty() {
                let n = page.page_number.unwrap_or(index as u32 + 1);
                page.title = format!("Page {n}");
            }
        }

        Self { pages }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let list: PageList = serde_yaml::from_str(raw)
            .map_err(|e| DexError::Config(format!("invalid page list: {e}")))?;
        let pages = match list {
            PageList::Bare(pages) | PageList::Wrapped { pages } => pages,
        };
        Ok(Self::new(pages))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DexError::Config(format!("failed to read page list {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn next_after(&self, path: &str) -> Option<&PageDescriptor> {
        let index = self.pages.iter().position(|p| p.path == path)?;
        self.pages.get(index + 1)
    }

    pub fn previous_before(&self, path: &str) -> Option<&PageDescriptor> {
        let index = self.pages.iter().position(|p| p.path == path)?;
        index.checked_sub(1).and_then(|i| self.pages.get(i))
    }
}

impl PageSource for StaticPages {
    fn pages(&self) -> Vec<PageDescriptor> {
        self.pages.clone()
    }
}
