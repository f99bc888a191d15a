use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::parser::parse;
use crate::stats::Summary;
use crate::types::DataPoint;
use crate::validate::{Validated, Validator};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Bundled sample data set, served for `SourceLocator::Sample`.
pub const SAMPLE_CSV: &str = include_str!("../data/sample.csv");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    Sample,
    Path(PathBuf),
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Sample => write!(f, "sample data"),
            SourceLocator::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Identifies one ingestion request. Later requests carry larger tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// An immutable, validated point sequence. `version` is the token of the
/// request that produced it, so it doubles as the identity renderers cache on.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    version: u64,
    points: Arc<[DataPoint]>,
    rejected: usize,
}

impl PointSet {
    pub fn new(version: u64, points: Vec<DataPoint>, rejected: usize) -> Self {
        Self {
            version,
            points: points.into(),
            rejected,
        }
    }

    pub fn empty() -> Self {
        Self::new(0, Vec::new(), 0)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Same request and same allocation, without comparing the points.
    pub fn same_as(&self, other: &PointSet) -> bool {
        self.version == other.version && Arc::ptr_eq(&self.points, &other.points)
    }

    pub fn summary(&self) -> Summary {
        Summary::of(&self.points, self.rejected)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Failed { kind: ErrorKind, message: String },
}

/// What subscribers observe: the status of the latest request and the
/// current point set. A failed request leaves the previous set in place.
#[derive(Debug, Clone)]
pub struct IngestState {
    pub status: LoadStatus,
    pub points: PointSet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Applied(PointSet),
    /// A newer request was issued while this one ran; its result was dropped.
    Superseded,
}

/// Runs parse + validate passes and publishes their results, last request wins.
pub struct Ingestor {
    validator: Validator,
    issued: AtomicU64,
    validations: AtomicUsize,
    state: watch::Sender<IngestState>,
}

impl Ingestor {
    pub fn new(validator: Validator) -> Self {
        let (state, _) = watch::channel(IngestState {
            status: LoadStatus::Idle,
            points: PointSet::empty(),
        });
        Self {
            validator,
            issued: AtomicU64::new(0),
            validations: AtomicUsize::new(0),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<IngestState> {
        self.state.subscribe()
    }

    pub fn status(&self) -> LoadStatus {
        self.state.borrow().status.clone()
    }

    pub fn current(&self) -> PointSet {
        self.state.borrow().points.clone()
    }

    /// Number of validator passes run so far.
    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    /// Issues a new token; any request holding an older one is now stale.
    pub fn begin(&self) -> RequestToken {
        let token = RequestToken(self.issued.fetch_add(1, Ordering::SeqCst) + 1);
        self.state.send_modify(|state| state.status = LoadStatus::Loading);
        token
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.issued.load(Ordering::SeqCst) == token.0
    }

    /// Parse and validate one document. An empty result is an error here,
    /// distinct from a schema failure.
    pub fn ingest_text(&self, text: &str) -> IngestResult<Validated> {
        let table = parse(text);
        self.validations.fetch_add(1, Ordering::SeqCst);
        let validated = self.validator.validate(&table)?;
        if validated.points.is_empty() {
            return Err(IngestError::EmptyResult {
                rejected: validated.rejected,
            });
        }
        info!(
            points = validated.points.len(),
            rejected = validated.rejected,
            "validated point data"
        );
        Ok(validated)
    }

    /// Publishes `result` if `token` is still the latest request. The swap is
    /// a single channel update, so subscribers never see a partial set.
    pub fn finish(&self, token: RequestToken, result: IngestResult<Validated>) -> IngestResult<LoadOutcome> {
        let prepared = result.map(|v| PointSet::new(token.0, v.points, v.rejected));
        let status = match &prepared {
            Ok(_) => LoadStatus::Ready,
            Err(e) => LoadStatus::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        };

        let published = self.state.send_if_modified(|state| {
            if !self.is_current(token) {
                return false;
            }
            if let Ok(set) = &prepared {
                state.points = set.clone();
            }
            state.status = status;
            true
        });

        if !published {
            warn!(token = token.0, "discarding result of superseded ingestion");
            return Ok(LoadOutcome::Superseded);
        }
        prepared.map(LoadOutcome::Applied)
    }

    pub async fn load_from_source(&self, source: &SourceLocator) -> IngestResult<LoadOutcome> {
        let token = self.begin();
        info!(token = token.0, %source, "loading point data");
        let result = match read_source(source).await {
            Ok(text) => self.ingest_text(&text),
            Err(e) => Err(e),
        };
        self.finish(token, result)
    }

    pub async fn load_from_uploaded_text(&self, text: &str) -> IngestResult<LoadOutcome> {
        let token = self.begin();
        info!(token = token.0, bytes = text.len(), "loading uploaded text");
        // Let newer requests issued in the same tick take their token first.
        tokio::task::yield_now().await;
        let result = self.ingest_text(text);
        self.finish(token, result)
    }
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(Validator::default())
    }
}

pub async fn read_source(source: &SourceLocator) -> IngestResult<String> {
    match source {
        SourceLocator::Sample => Ok(SAMPLE_CSV.to_string()),
        SourceLocator::Path(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IngestError::SourceRead {
                locator: path.display().to_string(),
                source: e,
            }),
    }
}
