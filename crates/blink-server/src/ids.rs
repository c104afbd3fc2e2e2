//! Identifier draws for new records.
//!
//! An [`IdSource`] only produces candidates. Uniqueness is decided by the
//! store, which checks and inserts inside a single write transaction and
//! retries a bounded number of times (see [`MAX_ALLOCATION_ATTEMPTS`]).

use std::sync::Mutex;

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Upper bound on draws before allocation gives up.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 10;

/// Length of system-generated link slugs.
pub const GENERATED_SLUG_LEN: usize = 6;

const CODE_MIN: u16 = 1000;
const CODE_MAX: u16 = 9999;

pub trait IdSource: Send + Sync {
    /// A 4-digit decimal snippet code in `1000..=9999`.
    fn snippet_code(&self) -> String;
    /// A short alphanumeric link slug.
    fn link_slug(&self) -> String;
}

/// Draws from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn snippet_code(&self) -> String {
        draw_code(&mut rand::thread_rng())
    }

    fn link_slug(&self) -> String {
        draw_slug(&mut rand::thread_rng())
    }
}

/// Deterministic draws from a seeded `StdRng`.
#[derive(Debug)]
pub struct SeededIds {
    rng: Mutex<StdRng>,
}

impl SeededIds {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl IdSource for SeededIds {
    fn snippet_code(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        draw_code(&mut *rng)
    }

    fn link_slug(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        draw_slug(&mut *rng)
    }
}

fn draw_code<R: Rng>(rng: &mut R) -> String {
    rng.gen_range(CODE_MIN..=CODE_MAX).to_string()
}

fn draw_slug<R: Rng>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(GENERATED_SLUG_LEN)
        .map(char::from)
        .collect()
}
