use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use crate::error::SeekerError;
use crate::search::handles::{CacheOptions, Handle, HandleCache, HandleSet};
use crate::search::pattern::Pattern;
use crate::search::{open_source, EvidenceSource, SourceKind};

/// How an artifact wants its patterns resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Keep only paths, never open the files
    pub names_only: bool,
    /// Stop at the first pattern that matches and return its first handle
    pub first_hit: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            names_only: false,
            first_hit: true,
        }
    }
}

impl SearchOptions {
    /// Every match of every pattern
    pub fn all() -> Self {
        SearchOptions {
            names_only: false,
            first_hit: false,
        }
    }

    pub fn names_only(mut self) -> Self {
        self.names_only = true;
        self
    }
}

/// Handles found for a list of patterns, borrowed from the seeker's cache
#[derive(Debug, Default)]
pub struct Found<'a> {
    handles: Vec<&'a Handle>,
}

impl<'a> Found<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a Handle> + '_ {
        self.handles.iter().copied()
    }

    pub fn first(&self) -> Option<&'a Handle> {
        self.handles.first().copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Origin paths of the found handles
    pub fn paths(&self) -> Vec<&'a Path> {
        self.handles.iter().map(|handle| handle.path()).collect()
    }
}

/// An evidence source paired with the handle cache for one run.
///
/// Dropping the seeker releases the container even when [`Seeker::cleanup`]
/// was never called, so early returns and panics do not leak it.
pub struct Seeker {
    source: Box<dyn EvidenceSource>,
    cache: HandleCache,
    /// Patterns that resolved to nothing
    misses: HashSet<String>,
    closed: bool,
}

impl Seeker {
    /// Open the container and create the scratch folder archives extract into
    pub fn open(
        kind: SourceKind,
        input: &Path,
        scratch: &Path,
        options: CacheOptions,
    ) -> Result<Self, SeekerError> {
        if kind != SourceKind::Fs {
            fs::create_dir_all(scratch).map_err(|e| SeekerError::container(scratch, e))?;
        }
        let source = open_source(kind, input, scratch)?;
        info!(
            "Opened {} evidence at {} ({} locations indexed)",
            kind,
            input.display(),
            source.indexed()
        );
        Ok(Seeker::with_source(source, options))
    }

    /// Wrap an already opened source
    pub fn with_source(source: Box<dyn EvidenceSource>, options: CacheOptions) -> Self {
        Seeker {
            source,
            cache: HandleCache::new(options),
            misses: HashSet::new(),
            closed: false,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    pub fn source(&self) -> &dyn EvidenceSource {
        self.source.as_ref()
    }

    pub fn handles(&self) -> &HandleCache {
        &self.cache
    }

    /// Resolve one pattern, going to the container only the first time.
    ///
    /// Returns `Ok(None)` when nothing matches. A handle that cannot be
    /// opened fails this pattern only; nothing is cached for it.
    pub fn resolve(&mut self, pattern: &str, names_only: bool) -> Result<Option<&HandleSet>, SeekerError> {
        if self.misses.contains(pattern) {
            return Ok(None);
        }

        if !self.cache.contains(pattern) {
            let compiled = Pattern::new(pattern)?;
            let files = self.source.search(&compiled)?;
            if files.is_empty() {
                debug!("No files found for {}", pattern);
                self.misses.insert(pattern.to_string());
                return Ok(None);
            }
            self.cache.add(pattern, &files, names_only)?;
        }

        Ok(self.cache.get(pattern))
    }

    /// Resolve a list of patterns and collect their handles.
    ///
    /// With `first_hit` only the first handle of the first matching pattern
    /// is returned; otherwise the handles of all patterns, without
    /// duplicate paths.
    pub fn find(&mut self, patterns: &[&str], options: SearchOptions) -> Result<Found<'_>, SeekerError> {
        let mut hits = Vec::new();
        for pattern in patterns {
            if self.resolve(pattern, options.names_only)?.is_some() {
                hits.push(*pattern);
                if options.first_hit {
                    break;
                }
            }
        }

        let mut found = Found::default();
        let mut seen = HashSet::new();
        for pattern in hits {
            let Some(set) = self.cache.peek(pattern) else {
                continue;
            };
            for handle in set.iter() {
                if seen.insert(handle.path()) {
                    found.handles.push(handle);
                }
                if options.first_hit {
                    return Ok(found);
                }
            }
        }
        Ok(found)
    }

    /// Forget a pattern so its next lookup goes back to the container
    pub fn invalidate(&mut self, pattern: &str) -> bool {
        let was_miss = self.misses.remove(pattern);
        self.cache.invalidate(pattern) || was_miss
    }

    /// Close cached handles and release the container
    pub fn cleanup(&mut self) -> Result<(), SeekerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cache.clear();
        self.source.cleanup()
    }
}

impl Drop for Seeker {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("Failed to release evidence container: {}", e);
        }
    }
}
