//! Ref resolution
//!
//! Resolves names in a vault's ref namespace (`HEAD`, branch pointers,
//! symbolic refs) to history log entries.

use std::collections::BTreeMap;

use git2::{Oid, ReferenceType, Repository};
use tracing::debug;

use strongroom_core::error::GitError;

use crate::repository::Result;

/// Levels of symbolic indirection followed when resolving `HEAD`
pub const HEAD_SYMBOLIC_DEPTH: usize = 2;

/// Refs of a history log with their resolved entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    /// Ref names and entries, `HEAD` first when present
    pub refs: Vec<(String, Oid)>,
    /// Symbolic refs and the names they point at
    pub symbolic: BTreeMap<String, String>,
}

impl ReferenceSet {
    /// Entry a ref name resolves to
    pub fn get(&self, name: &str) -> Option<Oid> {
        self.refs
            .iter()
            .find(|(ref_name, _)| ref_name == name)
            .map(|(_, oid)| *oid)
    }

    /// Whether the set holds no refs
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Walks the ref namespace of one repository
pub struct ReferenceResolver<'r> {
    repo: &'r Repository,
}

impl<'r> ReferenceResolver<'r> {
    /// Create a resolver over `repo`
    pub fn new(repo: &'r Repository) -> Self {
        Self { repo }
    }

    /// All ref names under `refs/`, sorted
    pub fn list_refs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut references = self.repo.references()?;
        for name in references.names() {
            let name = name?;
            if name.starts_with("refs/") {
                names.push(name.to_string());
            }
        }
        names.sort();
        debug!(count = names.len(), "listed refs");
        Ok(names)
    }

    /// Name a symbolic ref points at, or `None` for a direct ref
    pub fn symbolic_target(&self, name: &str) -> Result<Option<String>> {
        let reference = self.find(name)?;
        Ok(reference.symbolic_target().map(|s| s.to_string()))
    }

    /// Resolve `name` to an entry, following at most `depth` symbolic hops
    pub fn resolve(&self, name: &str, depth: usize) -> Result<Oid> {
        let mut current = name.to_string();
        let mut remaining = depth;

        loop {
            let reference = self.find(&current)?;
            match reference.kind() {
                Some(ReferenceType::Direct) => {
                    return reference.target().ok_or_else(|| GitError::ResolutionFailed {
                        reference: current.clone(),
                        reason: "direct ref has no target".to_string(),
                    });
                }
                Some(ReferenceType::Symbolic) => {
                    if remaining == 0 {
                        return Err(GitError::SymbolicDepthExceeded {
                            reference: name.to_string(),
                            depth,
                        });
                    }
                    remaining -= 1;
                    current = reference
                        .symbolic_target()
                        .ok_or_else(|| GitError::ResolutionFailed {
                            reference: current.clone(),
                            reason: "symbolic target is not valid UTF-8".to_string(),
                        })?
                        .to_string();
                }
                None => {
                    return Err(GitError::ResolutionFailed {
                        reference: current,
                        reason: "unknown reference type".to_string(),
                    })
                }
            }
        }
    }

    /// `HEAD` followed by every ref under `refs/`, each resolved.
    ///
    /// A log with no refs yields an empty set even though `HEAD` itself
    /// exists as a symbolic ref to an unborn branch.
    pub fn reference_set(&self) -> Result<ReferenceSet> {
        let names = self.list_refs()?;
        if names.is_empty() {
            return Ok(ReferenceSet::default());
        }

        let mut set = ReferenceSet::default();
        if let Some(target) = self.symbolic_target("HEAD")? {
            set.symbolic.insert("HEAD".to_string(), target);
        }

        let head = self.resolve("HEAD", HEAD_SYMBOLIC_DEPTH)?;
        set.refs.push(("HEAD".to_string(), head));
        for name in names {
            let oid = self.resolve(&name, HEAD_SYMBOLIC_DEPTH)?;
            if let Some(target) = self.symbolic_target(&name)? {
                set.symbolic.insert(name.clone(), target);
            }
            set.refs.push((name, oid));
        }
        Ok(set)
    }

    fn find(&self, name: &str) -> Result<git2::Reference<'r>> {
        self.repo.find_reference(name).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::RefNotFound(name.to_string())
            } else {
                GitError::ResolutionFailed {
                    reference: name.to_string(),
                    reason: e.message().to_string(),
                }
            }
        })
    }
}
