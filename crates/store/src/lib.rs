//! rxsearch store: partitions holding drug records.
//!
//! A partition is any independently queryable store behind the [`Partition`]
//! trait. [`MemoryPartition`] keeps its records in an immutable snapshot that
//! can be swapped atomically; [`PartitionSet`] is the ordered list opened once
//! at startup, first entry canonical.

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context};
use arc_swap::ArcSwap;
use rustc_hash::FxHashSet;
use rxsearch_core::{DrugRecord, PartitionQuery, PatternError, RankedDrug, Scorer, SynonymRule};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no partitions configured")]
    Empty,
    #[error("partition {0} is closed")]
    Closed(String),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("partition {partition} unavailable: {reason}")]
    Unavailable { partition: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An independently queryable store of drug records.
#[async_trait::async_trait]
pub trait Partition: Send + Sync {
    fn name(&self) -> &str;

    /// Filter, score, sort (score desc, name asc) and window.
    async fn search(&self, query: &PartitionQuery) -> StoreResult<Vec<RankedDrug>>;

    /// Number of records passing the filter for `pattern`.
    async fn count(&self, pattern: &str) -> StoreResult<u64>;

    /// Total records held.
    async fn docs(&self) -> StoreResult<usize>;

    async fn close(&self) -> StoreResult<()> { Ok(()) }
}

/// Immutable view of a partition's records.
#[derive(Debug, Default)]
pub struct PartitionSnapshot {
    pub epoch: u64,
    pub records: Vec<DrugRecord>,
}

/// Evaluate a query over a snapshot. Pure; used by [`MemoryPartition`] on a
/// blocking thread.
pub fn evaluate(records: &[DrugRecord], query: &PartitionQuery) -> StoreResult<Vec<RankedDrug>> {
    let scorer = Scorer::new(&query.pattern, query.synonym_rule)?;
    let mut hits: Vec<(u32, usize)> = records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| scorer.rank(r).map(|s| (s, i)))
        .collect();
    hits.sort_by(|a, b| {
        let (ra, rb) = (&records[a.1], &records[b.1]);
        b.0.cmp(&a.0)
            .then_with(|| ra.name.cmp(&rb.name))
            .then_with(|| ra.cmp_dedup_key(rb))
    });
    Ok(hits
        .into_iter()
        .skip(query.skip)
        .take(query.limit)
        .map(|(score, i)| RankedDrug { record: records[i].clone(), score })
        .collect())
}

/// In-RAM partition. Readers load the current snapshot without locking;
/// `replace` swaps in a new one.
pub struct MemoryPartition {
    name: String,
    snap: ArcSwap<PartitionSnapshot>,
    epoch: AtomicU64,
    open: AtomicBool,
}

impl MemoryPartition {
    pub fn new(name: impl Into<String>, records: Vec<DrugRecord>) -> Self {
        let name = name.into();
        let records = enforce_unique_ids(&name, records);
        metrics::gauge!("partition_docs", records.len() as f64, "partition" => name.clone());
        Self {
            name,
            snap: ArcSwap::from_pointee(PartitionSnapshot { epoch: 1, records }),
            epoch: AtomicU64::new(1),
            open: AtomicBool::new(true),
        }
    }

    pub fn current(&self) -> Arc<PartitionSnapshot> { self.snap.load_full() }

    /// Swap in a new record set; returns the new epoch.
    pub fn replace(&self, records: Vec<DrugRecord>) -> u64 {
        let records = enforce_unique_ids(&self.name, records);
        let epoch = self.epoch.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let docs = records.len();
        self.snap.store(Arc::new(PartitionSnapshot { epoch, records }));
        metrics::gauge!("partition_docs", docs as f64, "partition" => self.name.clone());
        info!(partition = %self.name, epoch, docs, "partition snapshot swapped");
        epoch
    }

    fn snapshot_if_open(&self) -> StoreResult<Arc<PartitionSnapshot>> {
        if !self.open.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Closed(self.name.clone()));
        }
        Ok(self.current())
    }

    async fn on_blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f).await.map_err(|e| StoreError::Unavailable {
            partition: self.name.clone(),
            reason: e.to_string(),
        })?
    }
}

#[async_trait::async_trait]
impl Partition for MemoryPartition {
    fn name(&self) -> &str { &self.name }

    async fn search(&self, query: &PartitionQuery) -> StoreResult<Vec<RankedDrug>> {
        let started = Instant::now();
        let snap = self.snapshot_if_open()?;
        let q = query.clone();
        let hits = self.on_blocking(move || evaluate(&snap.records, &q)).await?;
        metrics::histogram!("partition_eval_ms", started.elapsed().as_secs_f64() * 1_000.0, "partition" => self.name.clone());
        debug!(partition = %self.name, hits = hits.len(), skip = query.skip, limit = query.limit, "partition search");
        Ok(hits)
    }

    async fn count(&self, pattern: &str) -> StoreResult<u64> {
        let snap = self.snapshot_if_open()?;
        let pattern = pattern.to_string();
        self.on_blocking(move || {
            let scorer = Scorer::new(&pattern, SynonymRule::Contains)?;
            Ok(snap.records.iter().filter(|r| scorer.matches(r)).count() as u64)
        })
        .await
    }

    async fn docs(&self) -> StoreResult<usize> {
        Ok(self.snapshot_if_open()?.records.len())
    }

    async fn close(&self) -> StoreResult<()> {
        if self.open.swap(false, AtomicOrdering::SeqCst) {
            self.snap.store(Arc::new(PartitionSnapshot::default()));
            info!(partition = %self.name, "partition closed");
        }
        Ok(())
    }
}

// Identifiers are unique within one partition; later copies are dropped.
fn enforce_unique_ids(partition: &str, records: Vec<DrugRecord>) -> Vec<DrugRecord> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let before = records.len();
    let out: Vec<DrugRecord> = records
        .into_iter()
        .filter(|r| match r.dedup_key() {
            Some(k) => seen.insert(k),
            None => true,
        })
        .collect();
    if out.len() != before {
        warn!(partition, dropped = before - out.len(), "duplicate identifiers within partition; kept first");
    }
    out
}

// ----------------- Loading -----------------

/// Where a partition's records come from: `name=path` or a bare path named
/// after its file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub name: String,
    pub path: PathBuf,
}

impl PartitionSpec {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow!("empty partition spec"));
        }
        if let Some((name, path)) = s.split_once('=') {
            let (name, path) = (name.trim(), path.trim());
            if name.is_empty() || path.is_empty() {
                return Err(anyhow!("invalid partition spec: {} (expect name=path)", s));
            }
            return Ok(Self { name: name.to_string(), path: PathBuf::from(path) });
        }
        let path = PathBuf::from(s);
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("cannot derive partition name from {}", s))?
            .to_string();
        Ok(Self { name, path })
    }

    /// Comma separated list, order preserved.
    pub fn parse_list(s: &str) -> anyhow::Result<Vec<Self>> {
        s.split(',').filter(|p| !p.trim().is_empty()).map(Self::parse).collect()
    }
}

/// Read records from a JSON array file or a JSON Lines file.
pub fn load_records(path: &Path) -> anyhow::Result<Vec<DrugRecord>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(&text).with_context(|| format!("parsing JSON array in {}", path.display()));
    }
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let rec: DrugRecord = serde_json::from_str(line)
            .with_context(|| format!("parsing {} line {}", path.display(), lineno + 1))?;
        out.push(rec);
    }
    Ok(out)
}

// ----------------- Partition set -----------------

#[derive(Debug, Clone, Serialize)]
pub struct PartitionInfo {
    pub name: String,
    pub canonical: bool,
    /// `None` when the partition could not be asked.
    pub docs: Option<usize>,
}

/// Ordered, non-empty, read-only list of partitions. The first is canonical.
#[derive(Clone)]
pub struct PartitionSet {
    parts: Arc<[Arc<dyn Partition>]>,
}

impl std::fmt::Debug for PartitionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.parts.iter().map(|p| p.name())).finish()
    }
}

impl PartitionSet {
    pub fn new(parts: Vec<Arc<dyn Partition>>) -> StoreResult<Self> {
        if parts.is_empty() {
            return Err(StoreError::Empty);
        }
        Ok(Self { parts: parts.into() })
    }

    /// Load every spec into a [`MemoryPartition`], in order.
    pub fn open(specs: &[PartitionSpec]) -> anyhow::Result<Self> {
        let mut parts: Vec<Arc<dyn Partition>> = Vec::with_capacity(specs.len());
        for spec in specs {
            let t0 = Instant::now();
            let records = load_records(&spec.path)
                .with_context(|| format!("opening partition {}", spec.name))?;
            info!(partition = %spec.name, path = %spec.path.display(), docs = records.len(), took_ms = %t0.elapsed().as_millis(), "partition loaded");
            parts.push(Arc::new(MemoryPartition::new(spec.name.clone(), records)));
        }
        Ok(Self::new(parts)?)
    }

    /// Open from `RXS_PARTITIONS`.
    pub fn open_from_env() -> anyhow::Result<Self> {
        let raw = std::env::var("RXS_PARTITIONS").context("RXS_PARTITIONS is not set")?;
        Self::open(&PartitionSpec::parse_list(&raw)?)
    }

    pub fn canonical(&self) -> &Arc<dyn Partition> { &self.parts[0] }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Partition>> { self.parts.iter() }

    pub fn len(&self) -> usize { self.parts.len() }

    pub fn is_empty(&self) -> bool { self.parts.is_empty() }

    pub async fn describe(&self) -> Vec<PartitionInfo> {
        let mut out = Vec::with_capacity(self.parts.len());
        for (i, p) in self.parts.iter().enumerate() {
            let docs = match p.docs().await {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!(partition = %p.name(), error = %e, "describe: docs unavailable");
                    None
                }
            };
            out.push(PartitionInfo { name: p.name().to_string(), canonical: i == 0, docs });
        }
        out
    }

    /// Release every partition. Errors are logged, not returned.
    pub async fn close(&self) {
        for p in self.parts.iter() {
            if let Err(e) = p.close().await {
                warn!(partition = %p.name(), error = %e, "partition close failed");
            }
        }
        info!(partitions = self.parts.len(), "partition set closed");
    }
}
