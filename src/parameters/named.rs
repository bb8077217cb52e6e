//! Named value sets.
//!
//! Parameter sets and observation sets are both ordered mappings from a unique
//! name to a real value. [`NamedVector`] is that mapping, with the set algebra the
//! solver needs (subsets, erasure, differences) and conversions to and from
//! dense `ndarray` vectors in a caller-chosen name order.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::Sub;

use crate::error::{Result, SvdOptError};

/// An ordered mapping from names to values.
///
/// Iteration order is the lexical order of the names, so any two sets holding the
/// same names iterate identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedVector {
    values: BTreeMap<String, f64>,
}

/// A set of parameter values in one coordinate space.
pub type Parameters = NamedVector;

/// A set of (simulated or observed) observation values.
pub type Observations = NamedVector;

impl NamedVector {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `(name, value)` pairs. Later duplicates overwrite earlier ones.
    ///
    /// # Examples
    ///
    /// ```
    /// use svdopt_rs::parameters::Parameters;
    ///
    /// let pars = Parameters::from_pairs([("k", 1.5), ("s", 0.2)]);
    /// assert_eq!(pars.len(), 2);
    /// assert_eq!(pars.get("k"), Some(1.5));
    /// ```
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Build a set from names and a dense vector holding the values in the same order.
    pub fn from_array(names: &[String], values: &Array1<f64>) -> Result<Self> {
        if names.len() != values.len() {
            return Err(SvdOptError::DimensionMismatch(format!(
                "{} names but {} values",
                names.len(),
                values.len()
            )));
        }
        Ok(Self::from_pairs(
            names.iter().cloned().zip(values.iter().copied()),
        ))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Value for `name`, or `ParameterNotFound`.
    pub fn value(&self, name: &str) -> Result<f64> {
        self.get(name)
            .ok_or_else(|| SvdOptError::ParameterNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut f64> {
        self.values.get_mut(name)
    }

    /// Insert or overwrite a value.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<f64> {
        self.values.remove(name)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Names in iteration order.
    pub fn names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, f64> {
        self.values.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, String, f64> {
        self.values.iter_mut()
    }

    /// Remove every name that is present in `other`.
    pub fn erase(&mut self, other: &NamedVector) {
        for name in other.values.keys() {
            self.values.remove(name);
        }
    }

    /// Remove every listed name.
    pub fn erase_names<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for name in names {
            self.values.remove(name);
        }
    }

    /// Overwrite (or add) every value held by `other`.
    pub fn update(&mut self, other: &NamedVector) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), *value);
        }
    }

    /// The subset of this set holding the listed names; unknown names are skipped.
    pub fn subset<'a, I>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        Self {
            values: names
                .into_iter()
                .filter_map(|n| self.values.get(n).map(|v| (n.clone(), *v)))
                .collect(),
        }
    }

    /// Dense vector of the values for `names`, in that order.
    pub fn to_array(&self, names: &[String]) -> Result<Array1<f64>> {
        names
            .iter()
            .map(|n| self.value(n))
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from_vec)
    }

    /// Add `delta` to every value whose name appears in `delta`; other names are ignored.
    pub fn add_shared(&mut self, delta: &NamedVector) {
        for (name, value) in self.values.iter_mut() {
            if let Some(d) = delta.values.get(name) {
                *value += d;
            }
        }
    }

    /// Euclidean distance to `other` over the names `other` holds.
    ///
    /// Names missing from `self` are skipped.
    pub fn l2_distance(&self, other: &NamedVector) -> f64 {
        other
            .values
            .iter()
            .filter_map(|(name, v)| self.values.get(name).map(|b| (v - b).powi(2)))
            .sum::<f64>()
            .sqrt()
    }
}

impl<'a> Sub<&'a NamedVector> for &'a NamedVector {
    type Output = NamedVector;

    /// Element-wise difference over the names of the left operand; names the right
    /// operand lacks are treated as zero.
    fn sub(self, rhs: &'a NamedVector) -> NamedVector {
        NamedVector {
            values: self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v - rhs.values.get(k).copied().unwrap_or(0.0)))
                .collect(),
        }
    }
}

impl FromIterator<(String, f64)> for NamedVector {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a NamedVector {
    type Item = (&'a String, &'a f64);
    type IntoIter = btree_map::Iter<'a, String, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
