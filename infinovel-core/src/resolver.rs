//! Chapter path resolver.
//!
//! Every (chapter, choice) pair has a stable path id. The chapter behind a
//! path is generated once and then served from a cache shared by all
//! players, so everyone who takes the same branch reads the same chapter.
//!
//! Resolution never fails: a generator error, timeout or invalid response
//! yields the fixed generation-failed chapter instead.

use crate::chapter::{Chapter, Choice};
use crate::gate::{find_fallback, skill_check_outcome};
use crate::narrator::{ChapterGenerator, GenerationError, GenerationRequest};
use crate::stats::CharacterStats;
use crate::store::{get_typed, set_typed, DocumentStore, Namespace};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default bound on a single generator call.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Stable id for the branch taken by choosing `choice_id` in `chapter_id`.
///
/// Both ids are length-prefixed before hashing so distinct pairs can't
/// collide by concatenation.
pub fn path_id(chapter_id: &str, choice_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((chapter_id.len() as u64).to_be_bytes());
    hasher.update(chapter_id.as_bytes());
    hasher.update((choice_id.len() as u64).to_be_bytes());
    hasher.update(choice_id.as_bytes());
    let digest = hasher.finalize();
    format!("path_{}", hex::encode(&digest[..12]))
}

/// Where a resolved chapter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    Generated,
    /// Generation failed; the chapter is the fixed failure chapter.
    Degraded,
}

/// The chapter reached by a choice.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub chapter: Chapter,
    pub source: ResolutionSource,
    pub path_id: String,
}

/// Looks up or generates the chapter behind each path.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn ChapterGenerator>,
    collection: String,
    timeout: Duration,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn ChapterGenerator>,
        namespace: &Namespace,
    ) -> Self {
        Self {
            store,
            generator,
            collection: namespace.chapter_cache(),
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    /// Bound each generator call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The cached chapter for a path. Unreadable entries count as misses.
    pub async fn cached(&self, path_id: &str) -> Option<Chapter> {
        match get_typed(self.store.as_ref(), &self.collection, path_id).await {
            Ok(chapter) => chapter,
            Err(e) => {
                warn!(path = %path_id, error = %e, "chapter cache read failed, treating as miss");
                None
            }
        }
    }

    /// Resolve the chapter reached by picking `choice` in `parent`.
    pub async fn resolve(
        &self,
        parent: &Chapter,
        choice: &Choice,
        stats: &CharacterStats,
    ) -> Resolution {
        let path_id = path_id(&parent.unique_id(), &choice.choice_id);

        if let Some(chapter) = self.cached(&path_id).await {
            debug!(path = %path_id, chapter = %chapter.chapter_id, "chapter cache hit");
            return Resolution {
                chapter,
                source: ResolutionSource::Cache,
                path_id,
            };
        }

        let request = GenerationRequest {
            path_id: path_id.clone(),
            previous_title: parent.title.clone(),
            story_so_far: parent.text(),
            choice_text: choice.text.clone(),
            skill_check: skill_check_outcome(choice, stats),
            stats: *stats,
        };

        match self.generate(&request).await {
            Ok(chapter) => {
                if let Err(e) =
                    set_typed(self.store.as_ref(), &self.collection, &path_id, &chapter).await
                {
                    warn!(path = %path_id, error = %e, "failed to cache generated chapter");
                }
                info!(path = %path_id, chapter = %chapter.chapter_id, "generated chapter");
                Resolution {
                    chapter,
                    source: ResolutionSource::Generated,
                    path_id,
                }
            }
            Err(e) => {
                error!(path = %path_id, error = %e, "chapter generation failed");
                Resolution {
                    chapter: Chapter::generation_failed(),
                    source: ResolutionSource::Degraded,
                    path_id,
                }
            }
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Chapter, GenerationError> {
        let draft = tokio::time::timeout(self.timeout, self.generator.generate(request))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))??;

        let chapter = draft.into_chapter(&request.path_id)?;
        if chapter.is_timed_choice && !chapter.is_ending() && find_fallback(&chapter.choices).is_none() {
            warn!(
                path = %request.path_id,
                chapter = %chapter.chapter_id,
                "timed chapter has no choice without requirements"
            );
        }
        Ok(chapter)
    }
}
