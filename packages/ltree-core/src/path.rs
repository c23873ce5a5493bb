use std::fmt::Write as _;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::PathConfig;
use crate::error::{Error, Result};

/// Decoded hierarchical label: one octant per level, root first.
///
/// The empty path is the "not yet placed" marker and also stands for the virtual parent of
/// all roots. Derived ordering is lexicographic over octants, which is exactly the string
/// order of the fixed-width encoding.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Path(Vec<u32>);

impl Path {
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build a path from raw octants. Range is not checked here; see [`PathCodec::check`].
    pub fn from_octants(octants: impl Into<Vec<u32>>) -> Self {
        Self(octants.into())
    }

    pub fn octants(&self) -> &[u32] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn level(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    pub fn last_octant(&self) -> Option<u32> {
        self.0.last().copied()
    }

    pub fn octant_at(&self, index: usize) -> Option<u32> {
        self.0.get(index).copied()
    }

    /// Drop the last octant. Roots (and the empty path) yield the empty path.
    pub fn parent(&self) -> Path {
        match self.0.split_last() {
            Some((_, init)) => Path(init.to_vec()),
            None => Path::empty(),
        }
    }

    /// `self` equals `other` or is a prefix of it.
    pub fn contains(&self, other: &Path) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Strict prefix containment.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.0.len() < other.0.len() && self.contains(other)
    }

    pub fn is_descendant_of(&self, other: &Path) -> bool {
        other.is_ancestor_of(self)
    }

    pub fn is_sibling_of(&self, other: &Path) -> bool {
        !self.is_empty() && self != other && self.level() == other.level() && self.parent() == other.parent()
    }

    /// Octants below `prefix`, when `prefix` contains `self`.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<&[u32]> {
        self.0.strip_prefix(prefix.0.as_slice())
    }

    /// `self ++ suffix`.
    pub fn join(&self, suffix: &[u32]) -> Path {
        let mut octants = Vec::with_capacity(self.0.len() + suffix.len());
        octants.extend_from_slice(&self.0);
        octants.extend_from_slice(suffix);
        Path(octants)
    }

    /// Replace the octant at `index` (0-based), keeping everything else.
    pub(crate) fn with_octant(&self, index: usize, octant: u32) -> Path {
        let mut octants = self.0.clone();
        octants[index] = octant;
        Path(octants)
    }
}

/// Selects one sibling group: every path whose parent is `parent`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SiblingPattern {
    parent: Path,
}

impl SiblingPattern {
    pub fn new(parent: Path) -> Self {
        Self { parent }
    }

    pub fn parent(&self) -> &Path {
        &self.parent
    }

    /// Level of the group members.
    pub fn level(&self) -> usize {
        self.parent.level() + 1
    }

    /// `path` is a member of the group.
    pub fn matches(&self, path: &Path) -> bool {
        path.level() == self.level() && self.parent.is_ancestor_of(path)
    }

    /// `path` is a member of the group or a descendant of one.
    pub fn covers(&self, path: &Path) -> bool {
        path.level() >= self.level() && self.parent.is_ancestor_of(path)
    }
}

/// Pure encoder/decoder for one [`PathConfig`].
#[derive(Clone, Debug)]
pub struct PathCodec {
    config: PathConfig,
    max_octant: u32,
}

impl Default for PathCodec {
    fn default() -> Self {
        let config = PathConfig::default();
        Self {
            max_octant: config.max_octant(),
            config,
        }
    }
}

impl PathCodec {
    pub fn new(config: PathConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            max_octant: config.max_octant(),
            config,
        })
    }

    pub fn config(&self) -> &PathConfig {
        &self.config
    }

    pub fn width(&self) -> usize {
        self.config.width
    }

    pub fn separator(&self) -> char {
        self.config.separator
    }

    pub fn max_octant(&self) -> u32 {
        self.max_octant
    }

    pub fn encode_octant(&self, octant: u32) -> Result<String> {
        self.check_octant(octant)?;
        Ok(format!("{octant:0width$}", width = self.config.width))
    }

    /// Render `path` as zero-padded octants joined by the separator. The empty path renders
    /// as the empty string.
    pub fn encode(&self, path: &Path) -> String {
        let width = self.config.width;
        let mut out = String::with_capacity(path.level() * (width + 1));
        for (i, octant) in path.octants().iter().enumerate() {
            if i > 0 {
                out.push(self.config.separator);
            }
            let _ = write!(out, "{octant:0width$}");
        }
        out
    }

    pub fn decode(&self, label: &str) -> Result<Path> {
        if label.is_empty() {
            return Ok(Path::empty());
        }
        let mut octants = Vec::new();
        for component in label.split(self.config.separator) {
            if component.is_empty() {
                return Err(Error::Overflow(format!("empty component in {label:?}")));
            }
            if component.len() != self.config.width {
                return Err(Error::Overflow(format!(
                    "component {component:?} in {label:?} is not {} digits wide",
                    self.config.width
                )));
            }
            if !component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::Overflow(format!(
                    "component {component:?} in {label:?} is not numeric"
                )));
            }
            let octant: u32 = component
                .parse()
                .map_err(|_| Error::Overflow(format!("component {component:?} does not parse")))?;
            self.check_octant(octant)?;
            octants.push(octant);
        }
        Ok(Path(octants))
    }

    /// `count(separators) + 1`, or 0 for the empty label.
    pub fn level_of_label(&self, label: &str) -> usize {
        if label.is_empty() {
            0
        } else {
            label.matches(self.config.separator).count() + 1
        }
    }

    pub fn level(&self, path: &Path) -> usize {
        path.level()
    }

    pub fn parent(&self, path: &Path) -> Path {
        path.parent()
    }

    /// Append octant `n`.
    pub fn child_slot(&self, path: &Path, n: u32) -> Result<Path> {
        self.check_octant(n)?;
        Ok(path.join(&[n]))
    }

    pub fn next_sibling(&self, path: &Path) -> Result<Path> {
        let last = path
            .last_octant()
            .ok_or_else(|| Error::InvalidOperation("empty path has no siblings".into()))?;
        if last >= self.max_octant {
            return Err(Error::Overflow(format!(
                "{} has no next sibling within width {}",
                self.encode(path),
                self.config.width
            )));
        }
        Ok(path.with_octant(path.level() - 1, last + 1))
    }

    /// Decrement the last octant, clamped at 1. Callers must not rely on this for the first
    /// sibling.
    pub fn previous_sibling(&self, path: &Path) -> Result<Path> {
        let last = path
            .last_octant()
            .ok_or_else(|| Error::InvalidOperation("empty path has no siblings".into()))?;
        Ok(path.with_octant(path.level() - 1, last.saturating_sub(1).max(1)))
    }

    pub fn sibling_pattern(&self, path: &Path) -> SiblingPattern {
        SiblingPattern::new(path.parent())
    }

    /// Every octant of `path` within `[1, max_octant]`.
    pub fn check(&self, path: &Path) -> Result<()> {
        path.octants()
            .iter()
            .try_for_each(|octant| self.check_octant(*octant))
    }

    fn check_octant(&self, octant: u32) -> Result<()> {
        if octant == 0 || octant > self.max_octant {
            return Err(Error::Overflow(format!(
                "octant {octant} outside [1, {}]",
                self.max_octant
            )));
        }
        Ok(())
    }
}
