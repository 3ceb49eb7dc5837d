use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::diff::ParsedDiff;
use crate::layers::ReviewLayer;
use crate::review::ReviewComment;

/// Jaccard cutoff above which two comment bodies count as near-duplicates.
const SIMILARITY_THRESHOLD: f64 = 0.6;
/// Tokens this short carry no signal and are dropped before comparison.
const MIN_TOKEN_LEN: usize = 4;

const DEFAULT_LAYER_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs a configured ordered list of layers against a parsed diff and merges
/// their findings.
///
/// Layers execute concurrently; a layer that panics or exceeds the per-layer
/// timeout contributes an empty result and never aborts the run. The
/// pipeline holds no mutable state between runs, so a single instance is
/// safe to use concurrently for different diffs.
pub struct ReviewPipeline {
    layers: Vec<Arc<dyn ReviewLayer>>,
    layer_timeout: Duration,
}

impl ReviewPipeline {
    pub fn new(layers: Vec<Arc<dyn ReviewLayer>>) -> Self {
        ReviewPipeline {
            layers,
            layer_timeout: DEFAULT_LAYER_TIMEOUT,
        }
    }

    pub fn with_layer_timeout(mut self, layer_timeout: Duration) -> Self {
        self.layer_timeout = layer_timeout;
        self
    }

    pub async fn run(&self, diff: &ParsedDiff) -> Vec<ReviewComment> {
        let diff = Arc::new(diff.clone());

        let handles: Vec<_> = self
            .layers
            .iter()
            .map(|layer| {
                let layer = Arc::clone(layer);
                let diff = Arc::clone(&diff);
                let layer_timeout = self.layer_timeout;
                tokio::spawn(
                    async move { timeout(layer_timeout, layer.analyze(&diff)).await },
                )
            })
            .collect();

        let mut all_comments = Vec::new();
        for (layer, handle) in self.layers.iter().zip(handles) {
            match handle.await {
                Ok(Ok(comments)) => all_comments.extend(comments),
                Ok(Err(_)) => {
                    warn!(layer = layer.name(), "review layer timed out");
                }
                Err(e) => {
                    warn!(layer = layer.name(), error = %e, "review layer failed");
                }
            }
        }

        aggregate(all_comments)
    }
}

/// Collapses near-duplicate findings.
///
/// Comments are grouped by location; within a location they are partitioned
/// into similarity clusters (Jaccard over normalized significant-word sets,
/// compared against the cluster's first representative) and each cluster is
/// reduced to its highest-severity member, first-seen order breaking ties.
/// Survivors keep the order in which they first appeared in the merged layer
/// output.
fn aggregate(comments: Vec<ReviewComment>) -> Vec<ReviewComment> {
    let mut order: Vec<(String, u32)> = Vec::new();
    let mut groups: HashMap<(String, u32), Vec<(usize, ReviewComment)>> = HashMap::new();

    for (index, comment) in comments.into_iter().enumerate() {
        let key = (comment.filename.clone(), comment.line);
        let group = groups.entry(key.clone()).or_default();
        if group.is_empty() {
            order.push(key);
        }
        group.push((index, comment));
    }

    let mut survivors: Vec<(usize, ReviewComment)> = Vec::new();
    for key in order {
        if let Some(group) = groups.remove(&key) {
            survivors.extend(reduce_location(group));
        }
    }

    survivors.sort_by_key(|(index, _)| *index);
    survivors.into_iter().map(|(_, c)| c).collect()
}

fn reduce_location(group: Vec<(usize, ReviewComment)>) -> Vec<(usize, ReviewComment)> {
    let mut clusters: Vec<Vec<(usize, ReviewComment)>> = Vec::new();

    for (index, comment) in group {
        let words = significant_words(&comment.body);
        let position = clusters
            .iter()
            .position(|cl| jaccard(&significant_words(&cl[0].1.body), &words) > SIMILARITY_THRESHOLD);
        match position {
            Some(i) => clusters[i].push((index, comment)),
            None => clusters.push(vec![(index, comment)]),
        }
    }

    clusters
        .into_iter()
        .filter_map(|cluster| {
            cluster
                .into_iter()
                // max_by_key returns the last maximum; reversing the index
                // makes ties resolve to the first-seen comment
                .max_by_key(|(index, c)| (c.severity, std::cmp::Reverse(*index)))
        })
        .collect()
}

/// Lower-cased words with non-alphanumerics stripped; short tokens dropped.
fn significant_words(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| w.len() >= MIN_TOKEN_LEN)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        // Two bodies with no significant words at all are duplicates
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
