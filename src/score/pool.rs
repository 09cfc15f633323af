// src/score/pool.rs
//! Failover pool: a fixed ordered sequence of model backends plus one shared
//! rotation cursor. The cursor is owned by the pool (no process-wide state)
//! and advances exactly once per `next()`, monotonically across calls, so
//! successive invocations round-robin over providers.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Groq,
    Google,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub provider: Provider,
    pub name: String,
}

#[derive(Debug)]
pub struct ModelPool {
    models: Vec<ModelDescriptor>,
    cursor: Mutex<u64>,
}

impl ModelPool {
    /// Panics on an empty model list — config validation rejects that earlier.
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        assert!(!models.is_empty(), "model pool must not be empty");
        Self {
            models,
            cursor: Mutex::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Total number of rotations so far; position in the pool is `cursor % len`.
    pub fn cursor(&self) -> u64 {
        *self.cursor.lock().expect("poisoned pool cursor")
    }

    /// Hand out the next backend in rotation and advance the cursor.
    pub fn next(&self) -> ModelDescriptor {
        let mut cursor = self.cursor.lock().expect("poisoned pool cursor");
        let model = self.models[(*cursor % self.models.len() as u64) as usize].clone();
        *cursor += 1;
        model
    }
}
