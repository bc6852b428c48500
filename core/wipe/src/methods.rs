//! Named overwrite methods.
//!
//! A method is a pass count plus an ordered list of byte patterns; pass
//! `i` writes `patterns[i % patterns.len()]`, replicated to fill the
//! buffer. The built-in catalog is a static table looked up by display name.

use serde::{Deserialize, Serialize};

use securevault_common::{Error, Result};

/// Named overwrite scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipeMethod {
    name: String,
    passes: usize,
    patterns: Vec<Vec<u8>>,
}

impl WipeMethod {
    /// Create a validated method.
    ///
    /// # Errors
    /// - `Error::InvalidInput` if `passes` is zero, `patterns` is empty, or
    ///   any pattern is empty
    pub fn new(name: impl Into<String>, passes: usize, patterns: Vec<Vec<u8>>) -> Result<Self> {
        let name = name.into();
        if passes == 0 {
            return Err(Error::InvalidInput(format!(
                "Wipe method '{}' needs at least one pass",
                name
            )));
        }
        if patterns.is_empty() || patterns.iter().any(Vec::is_empty) {
            return Err(Error::InvalidInput(format!(
                "Wipe method '{}' needs non-empty patterns",
                name
            )));
        }
        Ok(Self {
            name,
            passes,
            patterns,
        })
    }

    /// Display name, also the lookup key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of configured passes (excluding the final zero pass).
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Configured patterns in order.
    pub fn patterns(&self) -> &[Vec<u8>] {
        &self.patterns
    }

    /// Pattern written by pass `index` (0-based).
    pub fn pattern_for(&self, index: usize) -> &[u8] {
        &self.patterns[index % self.patterns.len()]
    }

    /// Built-in catalog, in display order.
    pub fn all() -> Vec<WipeMethod> {
        CATALOG
            .iter()
            .map(|(name, passes, patterns)| Self {
                name: (*name).to_string(),
                passes: *passes,
                patterns: patterns.iter().map(|p| p.to_vec()).collect(),
            })
            .collect()
    }

    /// Look up a built-in method by display name (case-insensitive).
    ///
    /// # Errors
    /// - `Error::InvalidInput` if no method has that name
    pub fn find(name: &str) -> Result<WipeMethod> {
        Self::all()
            .into_iter()
            .find(|method| method.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown wipe method: {}", name)))
    }

    /// Zero Fill, the default method.
    pub fn zero_fill() -> WipeMethod {
        Self {
            name: ZERO_FILL.to_string(),
            passes: 1,
            patterns: vec![vec![0x00]],
        }
    }
}

impl Default for WipeMethod {
    fn default() -> Self {
        Self::zero_fill()
    }
}

const ZERO_FILL: &str = "Zero Fill (1 Pass)";

const GUTMANN: &[&[u8]] = &[
    &[0x55],
    &[0xAA],
    &[0x92, 0x49, 0x24],
    &[0x49, 0x24, 0x92],
    &[0x24, 0x92, 0x49],
    &[0x00],
    &[0x11],
    &[0x22],
    &[0x33],
    &[0x44],
    &[0x55],
    &[0x66],
    &[0x77],
    &[0x88],
    &[0x99],
    &[0xAA],
    &[0xBB],
    &[0xCC],
    &[0xDD],
    &[0xEE],
    &[0xFF],
    &[0x92, 0x49, 0x24],
    &[0x49, 0x24, 0x92],
    &[0x24, 0x92, 0x49],
    &[0x6D, 0xB6, 0xDB],
    &[0xB6, 0xDB, 0x6D],
    &[0xDB, 0x6D, 0xB6],
    &[0x00],
    &[0x00],
    &[0x00],
    &[0x00],
    &[0x00],
    &[0x00],
    &[0x00],
    &[0x00],
    &[0x00],
    &[0x00],
    &[0x00],
    &[0x00],
];

static CATALOG: &[(&str, usize, &[&[u8]])] = &[
    ("DoD 5220.22-M (3 Passes)", 3, &[&[0x00], &[0xFF], &[0x55]]),
    ("Gutmann (35 Passes)", 35, GUTMANN),
    (ZERO_FILL, 1, &[&[0x00]]),
    (
        "Brigadier (5 Passes)",
        5,
        &[&[0x00], &[0xFF], &[0xAA], &[0x55], &[0x00]],
    ),
    (
        "VSITR (7 Passes)",
        7,
        &[&[0x00], &[0xFF], &[0x00], &[0xFF], &[0x00], &[0xFF], &[0xAA]],
    ),
    ("Russian GOST R 50739-95 (2 Passes)", 2, &[&[0x00], &[0xFF]]),
    ("British HMG IS5 (3 Passes)", 3, &[&[0x00], &[0xFF], &[0x00]]),
];
