//! TF-IDF vectorisation and k-means clustering of answers.

use std::collections::HashMap;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::{Result, SurveyError};
use crate::tokenize::Tokenizer;

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_N_INIT: usize = 10;
pub const DEFAULT_MAX_ITER: usize = 300;

/// Term weights with smoothed idf and L2-normalised rows.
#[derive(Debug, Clone)]
pub struct TfIdf {
    pub vocabulary: Vec<String>,
    index: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfIdf {
    /// Keep the `max_features` most frequent terms (ties alphabetically);
    /// the vocabulary itself is ordered alphabetically.
    pub fn fit(docs: &[Vec<String>], max_features: usize) -> TfIdf {
        let mut corpus_freq: HashMap<&str, u64> = HashMap::new();
        let mut doc_freq: HashMap<&str, u64> = HashMap::new();
        for doc in docs {
            let mut seen: Vec<&str> = Vec::new();
            for term in doc {
                *corpus_freq.entry(term.as_str()).or_insert(0) += 1;
                if !seen.contains(&term.as_str()) {
                    seen.push(term.as_str());
                    *doc_freq.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, u64)> = corpus_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);
        let mut vocabulary: Vec<String> = ranked.into_iter().map(|(t, _)| t.to_string()).collect();
        vocabulary.sort();

        let n = docs.len() as f64;
        let idf = vocabulary
            .iter()
            .map(|t| {
                let df = doc_freq.get(t.as_str()).copied().unwrap_or(0) as f64;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        let index = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        TfIdf {
            vocabulary,
            index,
            idf,
        }
    }

    pub fn transform(&self, docs: &[Vec<String>]) -> Vec<Vec<f64>> {
        docs.iter()
            .map(|doc| {
                let mut row = vec![0.0; self.vocabulary.len()];
                for term in doc {
                    if let Some(&i) = self.index.get(term) {
                        row[i] += 1.0;
                    }
                }
                for (v, idf) in row.iter_mut().zip(&self.idf) {
                    *v *= idf;
                }
                let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
                if norm > 0.0 {
                    row.iter_mut().for_each(|v| *v /= norm);
                }
                row
            })
            .collect()
    }
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (j, c) in centroids.iter().enumerate() {
        let d = sq_dist(point, c);
        if d < best.1 {
            best = (j, d);
        }
    }
    best
}

#[derive(Debug, Clone)]
pub struct KMeansResult {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
}

/// Best of `n_init` seeded k-means++ runs by inertia. Requires
/// `1 <= k <= data.len()`.
pub fn kmeans(
    data: &[Vec<f64>],
    k: usize,
    n_init: usize,
    seed: u64,
    max_iter: usize,
) -> KMeansResult {
    let runs: Vec<KMeansResult> = (0..n_init.max(1))
        .into_par_iter()
        .map(|run| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(run as u64));
            let init = kmeans_plus_plus(data, k, &mut rng);
            lloyd(data, init, max_iter)
        })
        .collect();

    let mut best: Option<KMeansResult> = None;
    for r in runs {
        if best.as_ref().is_none_or(|b| r.inertia < b.inertia) {
            best = Some(r);
        }
    }
    best.unwrap_or(KMeansResult {
        labels: vec![0; data.len()],
        centroids: Vec::new(),
        inertia: 0.0,
    })
}

fn kmeans_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![data[rng.gen_range(0..data.len())].clone()];
    let mut d2: Vec<f64> = data.iter().map(|p| sq_dist(p, &centroids[0])).collect();
    while centroids.len() < k {
        let total: f64 = d2.iter().sum();
        let pick = if total > 0.0 {
            let target = rng.gen_range(0.0..total);
            let mut acc = 0.0;
            d2.iter()
                .position(|d| {
                    acc += d;
                    acc >= target
                })
                .unwrap_or(data.len() - 1)
        } else {
            rng.gen_range(0..data.len())
        };
        let c = data[pick].clone();
        for (d, p) in d2.iter_mut().zip(data) {
            *d = d.min(sq_dist(p, &c));
        }
        centroids.push(c);
    }
    centroids
}

fn lloyd(data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iter: usize) -> KMeansResult {
    let dims = centroids.first().map_or(0, Vec::len);
    let mut labels: Vec<usize> = Vec::new();
    for iter in 0..max_iter {
        let assigned: Vec<usize> = data.iter().map(|p| nearest(p, &centroids).0).collect();
        if assigned == labels {
            debug!("k-means converged after {iter} iterations");
            break;
        }
        labels = assigned;

        let mut sums = vec![vec![0.0; dims]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (p, &l) in data.iter().zip(&labels) {
            counts[l] += 1;
            for (s, v) in sums[l].iter_mut().zip(p) {
                *s += v;
            }
        }
        for ((c, s), &n) in centroids.iter_mut().zip(sums).zip(&counts) {
            // empty clusters keep their previous centre
            if n > 0 {
                *c = s.into_iter().map(|v| v / n as f64).collect();
            }
        }
    }
    let inertia = data
        .iter()
        .zip(&labels)
        .map(|(p, &l)| sq_dist(p, &centroids[l]))
        .sum();
    KMeansResult {
        labels,
        centroids,
        inertia,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub count: usize,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Clustering {
    pub labels: Vec<usize>,
    pub summaries: Vec<ClusterSummary>,
}

/// Cluster answers into `min(n_clusters, texts.len())` groups.
pub fn cluster_texts(
    texts: &[String],
    tokenizer: &Tokenizer,
    n_clusters: usize,
    max_samples: usize,
    max_features: usize,
) -> Result<Clustering> {
    if texts.is_empty() {
        return Err(SurveyError::EmptyInput("no answers to cluster".to_string()));
    }
    if n_clusters == 0 {
        return Err(SurveyError::InvalidConfig(
            "number of clusters must be at least 1".to_string(),
        ));
    }
    let k = n_clusters.min(texts.len());
    let docs: Vec<Vec<String>> = texts
        .iter()
        .map(|t| {
            tokenizer
                .tokenize(t)
                .into_iter()
                .filter(|w| w.chars().count() > 1)
                .collect()
        })
        .collect();
    let tfidf = TfIdf::fit(&docs, max_features);
    if tfidf.vocabulary.is_empty() {
        warn!("No multi-character terms found; clusters will be arbitrary");
    }
    let vectors = tfidf.transform(&docs);
    let result = kmeans(&vectors, k, DEFAULT_N_INIT, DEFAULT_SEED, DEFAULT_MAX_ITER);
    info!(
        "Clustered {} answers into {k} clusters over {} terms (inertia {:.4})",
        texts.len(),
        tfidf.vocabulary.len(),
        result.inertia
    );

    let summaries = (0..k)
        .map(|cluster| {
            let members: Vec<&String> = texts
                .iter()
                .zip(&result.labels)
                .filter(|(_, l)| **l == cluster)
                .map(|(t, _)| t)
                .collect();
            ClusterSummary {
                cluster,
                count: members.len(),
                examples: members.into_iter().take(max_samples).cloned().collect(),
            }
        })
        .collect();
    Ok(Clustering {
        labels: result.labels,
        summaries,
    })
}
