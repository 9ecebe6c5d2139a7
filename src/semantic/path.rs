//! Semantic path generation and validation.
//!
//! A task's directory component is `<ord>-<LEVEL>-<slug>-<hash8>`: the
//! zero-padded sibling ordinal, the level label, a URL-safe slug of the
//! title, and the first eight hex chars of the id for uniqueness. Full
//! paths must stay inside the platform length limit; over-long paths are
//! shortened by trimming slug middles, never the ordinal prefix or the
//! hash suffix.

use std::path::{Component, Path, PathBuf};

use dashmap::DashMap;

use crate::error::{StoreError, StoreResult};
use crate::task::model::{MAX_DEPTH, Task, zeropad};
use crate::util::short_id;

/// Characters never allowed in a path component.
const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

/// Slugs are never trimmed below this many chars.
const SLUG_MIN_LEN: usize = 10;

/// Conservative per-platform maximum for a full path.
pub const fn platform_max_path_len() -> usize {
    if cfg!(target_os = "windows") {
        200
    } else if cfg!(target_os = "macos") {
        900
    } else {
        200
    }
}

/// Builds and validates semantic paths under one root.
pub struct PathManager {
    root: PathBuf,
    max_len: usize,
    /// `(title, id)` to slug, so repeated moves do not re-slug.
    slug_cache: DashMap<(String, String), String>,
}

impl PathManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_limit(root, platform_max_path_len())
    }

    pub fn with_limit(root: impl Into<PathBuf>, max_len: usize) -> Self {
        Self {
            root: root.into(),
            max_len,
            slug_cache: DashMap::new(),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// The directory component for one task.
    pub fn component(&self, task: &Task) -> String {
        let key = (task.title.clone(), task.id.clone());
        let slug = match self.slug_cache.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let slug = slugify(&task.title);
                self.slug_cache.insert(key, slug.clone());
                slug
            }
        };
        format!(
            "{}-{}-{}-{}",
            zeropad(task.path_order),
            task.level.semantic_label(),
            slug,
            short_id(&task.id)
        )
    }

    /// The directory for a task given its ancestor chain (root first,
    /// the task itself last). Applies length truncation.
    pub fn semantic_dir(&self, chain: &[&Task]) -> StoreResult<PathBuf> {
        let mut components: Vec<String> = chain.iter().map(|task| self.component(task)).collect();
        let leaf = chain.last().expect("chain is never empty");
        let file_len = format!("task-{}.md", leaf.id).len();

        let total = self.path_len(&components) + file_len + 1;
        if total > self.max_len {
            shrink_components(&mut components, total - self.max_len);
        }

        let mut dir = self.root.clone();
        for component in &components {
            dir.push(component);
        }
        let full = dir.join(format!("task-{}.md", leaf.id));
        self.validate(&full)?;
        Ok(dir)
    }

    /// Full file path for a task given its ancestor chain.
    pub fn task_file_path(&self, chain: &[&Task]) -> StoreResult<PathBuf> {
        let leaf = chain.last().expect("chain is never empty");
        Ok(self
            .semantic_dir(chain)?
            .join(format!("task-{}.md", leaf.id)))
    }

    /// Check length, reserved characters, and directory depth.
    pub fn validate(&self, path: &Path) -> StoreResult<()> {
        let rendered = path.to_string_lossy();
        if rendered.len() > self.max_len {
            return Err(StoreError::InvalidPath {
                path: rendered.to_string(),
                reason: format!("length {} exceeds limit {}", rendered.len(), self.max_len),
            });
        }

        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut dir_depth = 0usize;
        for component in relative.components() {
            let Component::Normal(name) = component else {
                return Err(StoreError::InvalidPath {
                    path: rendered.to_string(),
                    reason: "non-normal path component".to_string(),
                });
            };
            let name = name.to_string_lossy();
            if let Some(reserved) = name.chars().find(|c| RESERVED.contains(c) || (*c as u32) < 32)
            {
                return Err(StoreError::InvalidPath {
                    path: rendered.to_string(),
                    reason: format!("reserved character {:?}", reserved),
                });
            }
            dir_depth += 1;
        }
        // The file itself does not count toward directory depth.
        if path.extension().is_some() {
            dir_depth = dir_depth.saturating_sub(1);
        }
        if dir_depth > MAX_DEPTH {
            return Err(StoreError::DepthExceeded {
                path: rendered.to_string(),
                depth: dir_depth,
            });
        }
        Ok(())
    }

    fn path_len(&self, components: &[String]) -> usize {
        self.root.to_string_lossy().len()
            + components.iter().map(|c| c.len() + 1).sum::<usize>()
    }
}

/// Lowercased, diacritic-stripped, URL-safe slug of a title.
pub fn slugify(title: &str) -> String {
    let spaced: String = title
        .chars()
        .map(fold_diacritic)
        .map(|c| match c {
            ' ' | '\t' | '_' => '-',
            c => c,
        })
        .collect();
    // sanitize-filename strips the reserved set and control characters
    // for every platform; the remainder is narrowed to ascii-alnum.
    let safe = sanitize_filename::sanitize(&spaced);
    let mut collapsed = String::with_capacity(safe.len());
    for c in safe.chars() {
        match c {
            c if c.is_ascii_alphanumeric() => collapsed.push(c.to_ascii_lowercase()),
            '-' if !collapsed.ends_with('-') => collapsed.push('-'),
            _ => {}
        }
    }
    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        "task".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Map common accented Latin letters onto their base letter.
fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'a',
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => 'u',
        'ý' | 'ÿ' | 'Ý' => 'y',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        'ß' => 's',
        _ => c,
    }
}

/// Trim slug middles until `excess` chars are gone, longest slug first.
/// The `<ord>-<LEVEL>-` prefix and `-<hash8>` suffix always survive, and
/// no slug drops below the minimum.
fn shrink_components(components: &mut [String], mut excess: usize) {
    while excess > 0 {
        // Index of the component with the longest slug still above the
        // minimum.
        let candidate = components
            .iter()
            .enumerate()
            .filter_map(|(i, c)| split_component(c).map(|(_, slug, _)| (i, slug.len())))
            .filter(|(_, len)| *len > SLUG_MIN_LEN)
            .max_by_key(|(_, len)| *len);
        let Some((index, _)) = candidate else {
            break; // nothing left to trim
        };
        let (prefix, slug, suffix) = {
            let (prefix, slug, suffix) =
                split_component(&components[index]).expect("candidate splits");
            (prefix.to_string(), slug.to_string(), suffix.to_string())
        };
        let mut trimmed = slug;
        trimmed.pop();
        let trimmed = trimmed.trim_end_matches('-');
        components[index] = format!("{}{}{}", prefix, trimmed, suffix);
        excess = excess.saturating_sub(1);
    }
}

/// Split `<ord>-<LEVEL>-<slug>-<hash8>` into prefix, slug, and suffix.
fn split_component(component: &str) -> Option<(&str, &str, &str)> {
    // Prefix ends after the second '-'; suffix starts at the last '-'.
    let mut dashes = component.char_indices().filter(|(_, c)| *c == '-');
    let _first = dashes.next()?;
    let (second, _) = dashes.next()?;
    let prefix_end = second + 1;
    let suffix_start = component.rfind('-')?;
    if suffix_start <= prefix_end {
        return None;
    }
    Some((
        &component[..prefix_end],
        &component[prefix_end..suffix_start],
        &component[suffix_start..],
    ))
}
