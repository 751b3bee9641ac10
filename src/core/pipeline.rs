//! Batch pipeline
//!
//! Runs parse → catalog → map over a set of source files:
//!
//! 1. every file is parsed in parallel on scoped worker threads;
//! 2. the entity catalog is built from all parsed entities, so references
//!    resolve across files;
//! 3. every unit is mapped in parallel against that catalog;
//! 4. results are reduced on the calling thread in path order, which is
//!    where pattern usage events are applied.
//!
//! A failing file or unit never aborts the batch. Its error is recorded and
//! the rest of the batch carries on.

use crate::core::canonical::{CanonicalSpecification, SpecDocument};
use crate::core::config::Config;
use crate::core::error::{CanonError, ErrorCategory};
use crate::core::mapper::{CanonicalMapper, EntityCatalog};
use crate::core::patterns::{usage_events, PatternUsage};
use crate::core::test_spec::TestSpecification;
use crate::core::walker::{DefaultWalker, SourceFile, SourceWalker};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use xlang_ir::{ParsedUnit, ParserRegistry};

/// Shared flag checked before each unit of work starts
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One isolated failure inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub category: ErrorCategory,
    pub message: String,
}

impl BatchError {
    fn new(path: &str, entity: Option<&str>, err: &CanonError) -> Self {
        Self {
            path: path.to_string(),
            entity: err.entity().or(entity).map(str::to_string),
            category: err.category(),
            message: err.to_string(),
        }
    }
}

/// Counts of processed units
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub files: usize,
    pub succeeded: usize,
    pub failed: BTreeMap<ErrorCategory, usize>,
    /// Work not started because the batch was cancelled
    pub skipped: usize,
}

impl BatchSummary {
    pub fn total_failed(&self) -> usize {
        self.failed.values().sum()
    }

    fn record_failure(&mut self, category: ErrorCategory) {
        *self.failed.entry(category).or_insert(0) += 1;
    }
}

/// Everything a batch produced, in path order
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub entities: Vec<CanonicalSpecification>,
    pub tests: Vec<TestSpecification>,
    pub errors: Vec<BatchError>,
    pub summary: BatchSummary,
    pub usage: PatternUsage,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn entity(&self, name: &str) -> Option<&CanonicalSpecification> {
        self.entities.iter().find(|spec| spec.entity() == name)
    }

    /// Serializable view of the batch
    pub fn to_report(&self) -> BatchReport {
        BatchReport {
            entities: self.entities.iter().map(|s| s.to_document()).collect(),
            tests: self.tests.clone(),
            errors: self.errors.clone(),
            summary: self.summary.clone(),
            usage: self.usage.clone(),
            cancelled: self.cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub entities: Vec<SpecDocument>,
    pub tests: Vec<TestSpecification>,
    pub errors: Vec<BatchError>,
    pub summary: BatchSummary,
    pub usage: PatternUsage,
    pub cancelled: bool,
}

/// Output of mapping one unit
enum Mapped {
    Entity(CanonicalSpecification),
    Test(TestSpecification),
}

/// Parallel parse and map over source files
pub struct BatchPipeline {
    registry: ParserRegistry,
    config: Config,
    walker: Box<dyn SourceWalker>,
    cancel: CancellationToken,
}

impl BatchPipeline {
    pub fn new(config: Config) -> Self {
        Self {
            registry: ParserRegistry::with_builtin_parsers(),
            config,
            walker: Box::new(DefaultWalker::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_walker(mut self, walker: Box<dyn SourceWalker>) -> Self {
        self.walker = walker;
        self
    }

    /// Token that cancels this pipeline's running and future batches
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Walk `roots` and run the batch over every source found
    ///
    /// A root or an entry below it that cannot be walked is recorded as an
    /// error of the batch; the other sources still run.
    pub fn run_paths<P: AsRef<Path>>(&self, roots: &[P]) -> BatchResult {
        let mut files = Vec::new();
        let mut walk_errors = Vec::new();

        for root in roots {
            let root = root.as_ref();
            match self.walker.walk(root, &self.config) {
                Ok(walk) => {
                    debug!(
                        root = %root.display(),
                        files = walk.sources.len(),
                        failures = walk.failures.len(),
                        "walked"
                    );
                    for failure in walk.failures {
                        warn!(path = %failure.path, error = %failure.error, "cannot read source");
                        walk_errors.push(BatchError::new(&failure.path, None, &failure.error));
                    }
                    files.extend(walk.sources);
                }
                Err(err) => {
                    warn!(root = %root.display(), error = %err, "cannot walk");
                    walk_errors.push(BatchError::new(&root.to_string_lossy(), None, &err));
                }
            }
        }

        let mut result = self.run_files(files);
        for error in &walk_errors {
            result.summary.record_failure(error.category);
        }
        result.errors.splice(0..0, walk_errors);
        result
    }

    /// Run the batch over sources already in memory
    pub fn run_files(&self, files: Vec<SourceFile>) -> BatchResult {
        // path order, last duplicate wins
        let files: BTreeMap<String, SourceFile> =
            files.into_iter().map(|f| (f.path.clone(), f)).collect();
        let files: Vec<SourceFile> = files.into_values().collect();
        let workers = self.config.effective_workers();

        info!(files = files.len(), workers, "starting batch");

        let parsed = parallel_map(&files, workers, &self.cancel, |file| {
            self.registry
                .parse_path(Path::new(&file.path), &file.content)
                .map_err(CanonError::from)
        });

        let mut result = BatchResult {
            summary: BatchSummary {
                files: files.len(),
                ..BatchSummary::default()
            },
            ..BatchResult::default()
        };

        let mut units: Vec<(&str, ParsedUnit)> = Vec::new();
        for (file, outcome) in files.iter().zip(parsed) {
            match outcome {
                Some(Ok(found)) => units.extend(found.into_iter().map(|u| (file.path.as_str(), u))),
                Some(Err(err)) => {
                    warn!(path = %file.path, error = %err, "parse failed");
                    result.summary.record_failure(err.category());
                    result.errors.push(BatchError::new(&file.path, None, &err));
                }
                None => result.summary.skipped += 1,
            }
        }

        let catalog = EntityCatalog::from_entities(units.iter().filter_map(|(_, u)| u.as_entity()));
        debug!(entities = catalog.len(), "built catalog");
        let mapper = CanonicalMapper::new(catalog);

        let mapped = parallel_map(&units, workers, &self.cancel, |(_, unit)| match unit {
            ParsedUnit::Entity(entity) => mapper.map_detected(entity).map(Mapped::Entity),
            ParsedUnit::Test(test) => mapper.map_test(test).map(Mapped::Test),
        });

        for ((path, unit), outcome) in units.iter().zip(mapped) {
            match outcome {
                Some(Ok(Mapped::Entity(spec))) => {
                    result.usage.apply_all(usage_events(&spec));
                    result.entities.push(spec);
                    result.summary.succeeded += 1;
                }
                Some(Ok(Mapped::Test(spec))) => {
                    result.tests.push(spec);
                    result.summary.succeeded += 1;
                }
                Some(Err(err)) => {
                    warn!(path = %path, unit = %unit.name(), error = %err, "mapping failed");
                    result.summary.record_failure(err.category());
                    result.errors.push(BatchError::new(path, Some(unit.name()), &err));
                }
                None => result.summary.skipped += 1,
            }
        }

        result.cancelled = self.cancel.is_cancelled();
        info!(
            succeeded = result.summary.succeeded,
            failed = result.summary.total_failed(),
            skipped = result.summary.skipped,
            cancelled = result.cancelled,
            "batch complete"
        );
        result
    }
}

impl Default for BatchPipeline {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Apply `f` to every item on up to `workers` scoped threads
///
/// Output order matches input order. Items not started because of
/// cancellation, or lost to a panicking worker, come back as `None`.
fn parallel_map<T, R, F>(items: &[T], workers: usize, cancel: &CancellationToken, f: F) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }
    let chunk_size = items.len().div_ceil(workers.max(1));
    let f = &f;

    std::thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk_size)
            .map(|chunk| {
                let handle = scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|item| (!cancel.is_cancelled()).then(|| f(item)))
                        .collect::<Vec<_>>()
                });
                (chunk.len(), handle)
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|(len, handle)| {
                handle.join().unwrap_or_else(|_| {
                    warn!(items = len, "worker panicked");
                    std::iter::repeat_with(|| None).take(len).collect()
                })
            })
            .collect()
    })
}
