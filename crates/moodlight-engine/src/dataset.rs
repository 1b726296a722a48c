use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use moodlight_contracts::audio::OBJECT_STORE_SCHEME;
use moodlight_contracts::dataset::{
    join_samples, training_messages, CatalogEntry, DatasetError, MoodSample,
};
use moodlight_contracts::mood::MoodVocabulary;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::ObjectStore;

pub const DEFAULT_SPLIT_SEED: u64 = 42;
pub const DEFAULT_TEST_RATIO: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPlan {
    pub samples_uri: String,
    pub catalog_uri: String,
    pub output_dir: PathBuf,
    pub test_ratio: f64,
    pub seed: u64,
}

impl DatasetPlan {
    pub fn new(
        samples_uri: impl Into<String>,
        catalog_uri: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            samples_uri: samples_uri.into(),
            catalog_uri: catalog_uri.into(),
            output_dir: output_dir.into(),
            test_ratio: DEFAULT_TEST_RATIO,
            seed: DEFAULT_SPLIT_SEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetReport {
    pub total_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct MessagesRow {
    messages: String,
}

/// Join samples onto the catalog, build chat-format rows and write a seeded
/// `train.csv` / `test.csv` split.
pub fn prepare_dataset(
    plan: &DatasetPlan,
    store: Option<&dyn ObjectStore>,
    vocabulary: &MoodVocabulary,
) -> Result<DatasetReport> {
    tracing::info!(uri = %plan.samples_uri, "loading mood samples");
    let samples: Vec<MoodSample> = read_csv_rows(&read_source(&plan.samples_uri, store)?)
        .with_context(|| format!("invalid samples file ({})", plan.samples_uri))?;
    tracing::info!(uri = %plan.catalog_uri, "loading mood catalog");
    let catalog: Vec<CatalogEntry> = read_csv_rows(&read_source(&plan.catalog_uri, store)?)
        .with_context(|| format!("invalid catalog file ({})", plan.catalog_uri))?;

    let joined = join_samples(&samples, &catalog)?;
    let mut rows = Vec::with_capacity(joined.len());
    for row in &joined {
        let messages = training_messages(row, vocabulary)?;
        rows.push(MessagesRow {
            messages: serde_json::to_string(&messages)?,
        });
    }

    tracing::info!(ratio = plan.test_ratio, rows = rows.len(), "splitting dataset");
    let total_rows = rows.len();
    let (train, test) = split_rows(rows, plan.test_ratio, plan.seed)?;

    fs::create_dir_all(&plan.output_dir)
        .with_context(|| format!("failed to create {}", plan.output_dir.display()))?;
    let train_path = plan.output_dir.join("train.csv");
    let test_path = plan.output_dir.join("test.csv");
    write_csv_rows(&train_path, &train)?;
    write_csv_rows(&test_path, &test)?;
    tracing::info!(train = %train_path.display(), test = %test_path.display(), "dataset written");

    Ok(DatasetReport {
        total_rows,
        train_rows: train.len(),
        test_rows: test.len(),
        train_path,
        test_path,
    })
}

/// Shuffle with a fixed seed, then cut `ceil(ratio * n)` rows off the front
/// for the test split. Both splits always keep at least one row.
pub fn split_rows<T>(mut rows: Vec<T>, test_ratio: f64, seed: u64) -> Result<(Vec<T>, Vec<T>)> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(DatasetError::InvalidSplitRatio(test_ratio).into());
    }
    let total = rows.len();
    if total < 2 {
        bail!("cannot split {total} row(s) into train and test sets");
    }
    let test_count = ((test_ratio * total as f64).ceil() as usize).clamp(1, total - 1);
    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);
    let train = rows.split_off(test_count);
    Ok((train, rows))
}

/// Reads a local path or a `gs://bucket/key` object.
pub fn read_source(uri: &str, store: Option<&dyn ObjectStore>) -> Result<Vec<u8>> {
    let Some(rest) = uri.strip_prefix(OBJECT_STORE_SCHEME) else {
        return fs::read(Path::new(uri)).with_context(|| format!("failed to read {uri}"));
    };
    let Some((bucket, key)) = rest.split_once('/') else {
        bail!("object URI has no key: {uri}");
    };
    if bucket.is_empty() || key.is_empty() {
        bail!("object URI has no key: {uri}");
    }
    let Some(store) = store else {
        bail!("no object store configured to read {uri}");
    };
    store
        .fetch(bucket, key)?
        .with_context(|| format!("object not found: {uri}"))
}

fn read_csv_rows<T: DeserializeOwned>(data: &[u8]) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_reader(data);
    let mut rows = Vec::new();
    for (index, row) in reader.deserialize().enumerate() {
        rows.push(row.with_context(|| format!("csv row {} is invalid", index + 1))?);
    }
    Ok(rows)
}

fn write_csv_rows(path: &Path, rows: &[MessagesRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
