//! Random test-data generator
//!
//! Writes a file of `N. text` lines until a target size is reached. Word
//! counts per line follow a Poisson distribution and line texts repeat
//! often enough that the comparator's numeric tiebreak gets real work.
//! Not part of the sort engine; it exists to produce inputs for it.

use crate::error::{IoContext, SortResult};
use crate::line_io::{LineWriter, NEWLINE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

/// Words the generator builds line texts from
const VOCABULARY: &[&str] = &[
    "Apple", "Banana", "Cherry", "Dog", "Elephant", "Mango", "Pineapple", "Juice", "Yellow",
    "Green", "Ripe", "Sweet", "Sour", "Fresh", "Frozen", "Best", "Tiny", "Giant", "Wild",
    "Golden",
];

/// Mean extra words per line for the Poisson draw
const MEAN_EXTRA_WORDS: f64 = 2.5;

/// How many distinct texts are kept around for re-use
const REUSE_POOL: usize = 64;

/// Parameters for one generated file
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub file_name: String,
    pub file_size_mb: u64,
    pub output_dir: Option<PathBuf>,
    /// Fixed seed for reproducible files; entropy-seeded when unset
    pub seed: Option<u64>,
}

/// Write the file described by `config`; returns its path.
pub fn generate(config: &GenerateConfig) -> SortResult<PathBuf> {
    let dir = match &config.output_dir {
        Some(dir) => dir.clone(),
        None => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).temp_context(&dir)?;
    let path = dir.join(&config.file_name);

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let target = config.file_size_mb * 1024 * 1024;
    let mut writer = LineWriter::create(&path, 64 * 1024).temp_context(&path)?;
    let mut written = 0u64;
    let mut pool: Vec<String> = Vec::with_capacity(REUSE_POOL);

    while written < target {
        // Roughly 5% negative prefixes
        let number: i64 = if rng.gen_ratio(1, 20) {
            -rng.gen_range(1..=100_000i64)
        } else {
            rng.gen_range(0..=u32::MAX as i64)
        };

        // One line in ten repeats an earlier text verbatim
        let text = if !pool.is_empty() && rng.gen_ratio(1, 10) {
            pool[rng.gen_range(0..pool.len())].clone()
        } else {
            let words = 1 + poisson(&mut rng, MEAN_EXTRA_WORDS);
            let mut text = String::new();
            for i in 0..words {
                if i > 0 {
                    text.push(' ');
                }
                text.push_str(VOCABULARY[rng.gen_range(0..VOCABULARY.len())]);
            }
            if pool.len() < REUSE_POOL {
                pool.push(text.clone());
            } else {
                let slot = rng.gen_range(0..pool.len());
                pool[slot] = text.clone();
            }
            text
        };

        let line = format!("{number}. {text}");
        writer.write_line(line.as_bytes()).temp_context(&path)?;
        written += (line.len() + NEWLINE.len()) as u64;
    }

    writer.finish().temp_context(&path)?;
    Ok(path)
}

/// Knuth's Poisson sampler; plenty fast for small means.
fn poisson<R: Rng>(rng: &mut R, mean: f64) -> usize {
    let limit = (-mean).exp();
    let mut k = 0usize;
    let mut p = 1.0f64;
    loop {
        p *= rng.gen::<f64>();
        if p <= limit {
            return k;
        }
        k += 1;
    }
}
