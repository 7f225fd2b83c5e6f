//! Index ranges
//!
//! A range is a box over the columns of an index. Each column is bounded by
//! two cuts; a cut sits between values, so `Below(v)` is the position
//! immediately before `v` and `Above(v)` the position immediately after it.
//! NULL sorts before every value: `BelowAll < NULL < AboveNull < Below(v)`.

use crate::value::Literal;
use arrow_schema::DataType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RangeCut {
    BelowAll,
    AboveNull,
    Below(Literal),
    Above(Literal),
    AboveAll,
}

impl RangeCut {
    fn rank(&self) -> u8 {
        match self {
            RangeCut::BelowAll => 0,
            RangeCut::AboveNull => 1,
            RangeCut::Below(_) | RangeCut::Above(_) => 2,
            RangeCut::AboveAll => 3,
        }
    }

    /// Position of this cut relative to a value. NULL is passed as
    /// `Literal::Null`.
    fn cmp_value(&self, value: &Literal) -> Ordering {
        if value.is_null() {
            return match self {
                RangeCut::BelowAll => Ordering::Less,
                _ => Ordering::Greater,
            };
        }
        match self {
            RangeCut::BelowAll | RangeCut::AboveNull => Ordering::Less,
            RangeCut::AboveAll => Ordering::Greater,
            RangeCut::Below(v) => match v.total_cmp(value) {
                Ordering::Equal => Ordering::Less,
                ord => ord,
            },
            RangeCut::Above(v) => match v.total_cmp(value) {
                Ordering::Equal => Ordering::Greater,
                ord => ord,
            },
        }
    }
}

impl Eq for RangeCut {}

impl PartialOrd for RangeCut {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RangeCut {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (RangeCut::Below(a), RangeCut::Below(b)) | (RangeCut::Above(a), RangeCut::Above(b)) => {
                a.total_cmp(b)
            }
            (RangeCut::Below(a), RangeCut::Above(b)) => match a.total_cmp(b) {
                Ordering::Equal => Ordering::Less,
                ord => ord,
            },
            (RangeCut::Above(a), RangeCut::Below(b)) => match a.total_cmp(b) {
                Ordering::Equal => Ordering::Greater,
                ord => ord,
            },
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Interval on a single index column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeColumnExpr {
    pub lower: RangeCut,
    pub upper: RangeCut,
    pub data_type: DataType,
}

impl RangeColumnExpr {
    pub fn new(lower: RangeCut, upper: RangeCut, data_type: DataType) -> Self {
        Self {
            lower,
            upper,
            data_type,
        }
    }

    pub fn full(data_type: DataType) -> Self {
        Self::new(RangeCut::BelowAll, RangeCut::AboveAll, data_type)
    }

    pub fn null_point(data_type: DataType) -> Self {
        Self::new(RangeCut::BelowAll, RangeCut::AboveNull, data_type)
    }

    pub fn not_null(data_type: DataType) -> Self {
        Self::new(RangeCut::AboveNull, RangeCut::AboveAll, data_type)
    }

    /// Closed interval `[v, v]`
    pub fn point(value: Literal, data_type: DataType) -> Self {
        if value.is_null() {
            return Self::null_point(data_type);
        }
        Self::new(
            RangeCut::Below(value.clone()),
            RangeCut::Above(value),
            data_type,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.lower >= self.upper
    }

    pub fn is_full(&self) -> bool {
        self.lower == RangeCut::BelowAll && self.upper == RangeCut::AboveAll
    }

    pub fn contains(&self, value: &Literal) -> bool {
        self.lower.cmp_value(value) == Ordering::Less
            && self.upper.cmp_value(value) == Ordering::Greater
    }

    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let out = Self::new(
            self.lower.clone().max(other.lower.clone()),
            self.upper.clone().min(other.upper.clone()),
            self.data_type.clone(),
        );
        (!out.is_empty()).then_some(out)
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.intersect(other).is_some()
    }

    /// Union of two intervals that overlap or touch
    pub fn try_union(&self, other: &Self) -> Option<Self> {
        if self.upper < other.lower || other.upper < self.lower {
            return None;
        }
        Some(Self::new(
            self.lower.clone().min(other.lower.clone()),
            self.upper.clone().max(other.upper.clone()),
            self.data_type.clone(),
        ))
    }

    fn cmp_bounds(&self, other: &Self) -> Ordering {
        self.lower
            .cmp(&other.lower)
            .then_with(|| self.upper.cmp(&other.upper))
    }
}

impl fmt::Display for RangeColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            RangeCut::BelowAll => write!(f, "(-∞")?,
            RangeCut::AboveNull => write!(f, "(NULL")?,
            RangeCut::Below(v) => write!(f, "[{v}")?,
            RangeCut::Above(v) => write!(f, "({v}")?,
            RangeCut::AboveAll => write!(f, "(∞")?,
        }
        write!(f, ", ")?;
        match &self.upper {
            RangeCut::BelowAll => write!(f, "-∞)"),
            RangeCut::AboveNull => write!(f, "NULL]"),
            RangeCut::Below(v) => write!(f, "{v})"),
            RangeCut::Above(v) => write!(f, "{v}]"),
            RangeCut::AboveAll => write!(f, "∞)"),
        }
    }
}

/// Box over all columns of an index, one interval per column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub columns: Vec<RangeColumnExpr>,
}

impl Range {
    pub fn new(columns: Vec<RangeColumnExpr>) -> Self {
        Self { columns }
    }

    pub fn full(types: &[DataType]) -> Self {
        Self::new(types.iter().cloned().map(RangeColumnExpr::full).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.iter().any(RangeColumnExpr::is_empty)
    }

    pub fn is_full(&self) -> bool {
        self.columns.iter().all(RangeColumnExpr::is_full)
    }

    /// True when a row whose index column values are `values` falls in the box
    pub fn contains(&self, values: &[Literal]) -> bool {
        self.columns
            .iter()
            .zip(values)
            .all(|(col, v)| col.contains(v))
    }

    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let columns = self
            .columns
            .iter()
            .zip(&other.columns)
            .map(|(a, b)| a.intersect(b))
            .collect::<Option<Vec<_>>>()?;
        Some(Self::new(columns))
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.intersect(other).is_some()
    }

    /// Parts of `self` not covered by `other`, as disjoint boxes
    pub fn difference(&self, other: &Self) -> Vec<Range> {
        if !self.overlaps(other) {
            return vec![self.clone()];
        }
        let mut pieces = Vec::new();
        let mut rest = self.clone();
        for i in 0..self.columns.len() {
            let cur = rest.columns[i].clone();
            let cut = &other.columns[i];
            let below = RangeColumnExpr::new(
                cur.lower.clone(),
                cut.lower.clone().min(cur.upper.clone()),
                cur.data_type.clone(),
            );
            if !below.is_empty() {
                let mut piece = rest.clone();
                piece.columns[i] = below;
                pieces.push(piece);
            }
            let above = RangeColumnExpr::new(
                cut.upper.clone().max(cur.lower.clone()),
                cur.upper.clone(),
                cur.data_type.clone(),
            );
            if !above.is_empty() {
                let mut piece = rest.clone();
                piece.columns[i] = above;
                pieces.push(piece);
            }
            match cur.intersect(cut) {
                Some(mid) => rest.columns[i] = mid,
                None => break,
            }
        }
        pieces
    }

    /// Merges two boxes that agree on every column but one, where that
    /// column's intervals touch or overlap
    pub fn try_merge(&self, other: &Self) -> Option<Self> {
        let mut differing = None;
        for (i, (a, b)) in self.columns.iter().zip(&other.columns).enumerate() {
            if a != b {
                if differing.is_some() {
                    return None;
                }
                differing = Some(i);
            }
        }
        let Some(i) = differing else {
            return Some(self.clone());
        };
        let merged = self.columns[i].try_union(&other.columns[i])?;
        let mut out = self.clone();
        out.columns[i] = merged;
        Some(out)
    }

    fn cmp_bounds(&self, other: &Self) -> Ordering {
        self.columns
            .iter()
            .zip(&other.columns)
            .map(|(a, b)| a.cmp_bounds(b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{col}")?;
        }
        write!(f, "}}")
    }
}

/// Set of ranges; after `remove_overlaps` no two ranges overlap
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeCollection(pub Vec<Range>);

impl RangeCollection {
    pub fn new(ranges: Vec<Range>) -> Self {
        Self(ranges.into_iter().filter(|r| !r.is_empty()).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Range> {
        self.0.iter()
    }

    /// One range spanning every value of every column
    pub fn is_full_table(&self) -> bool {
        self.0.len() == 1 && self.0[0].is_full()
    }

    pub fn contains(&self, values: &[Literal]) -> bool {
        self.0.iter().any(|r| r.contains(values))
    }

    /// Pairwise intersection
    pub fn intersect(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        for a in &self.0 {
            for b in &other.0 {
                if let Some(r) = a.intersect(b) {
                    out.push(r);
                }
            }
        }
        Self(out)
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = self.0.clone();
        out.extend(other.0.iter().cloned());
        Self(out)
    }

    /// Rewrites the collection into disjoint, merged and sorted ranges
    /// covering the same rows
    pub fn remove_overlaps(self) -> Self {
        let mut disjoint: Vec<Range> = Vec::new();
        for range in self.0 {
            let mut pieces = vec![range];
            for existing in &disjoint {
                pieces = pieces
                    .iter()
                    .flat_map(|p| p.difference(existing))
                    .collect();
                if pieces.is_empty() {
                    break;
                }
            }
            disjoint.extend(pieces);
        }

        let mut merged = true;
        while merged {
            merged = false;
            'outer: for i in 0..disjoint.len() {
                for j in (i + 1)..disjoint.len() {
                    if let Some(m) = disjoint[i].try_merge(&disjoint[j]) {
                        disjoint[i] = m;
                        disjoint.remove(j);
                        merged = true;
                        break 'outer;
                    }
                }
            }
        }

        disjoint.sort_by(|a, b| a.cmp_bounds(b));
        Self(disjoint)
    }
}

impl fmt::Display for RangeCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, r) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{r}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(v: i64) -> RangeColumnExpr {
        RangeColumnExpr::point(Literal::Int(v), DataType::Int64)
    }

    fn open(lo: i64, hi: i64) -> RangeColumnExpr {
        RangeColumnExpr::new(
            RangeCut::Above(Literal::Int(lo)),
            RangeCut::Below(Literal::Int(hi)),
            DataType::Int64,
        )
    }

    #[test]
    fn test_cut_order() {
        let mut cuts = vec![
            RangeCut::AboveAll,
            RangeCut::Above(Literal::Int(1)),
            RangeCut::Below(Literal::Int(1)),
            RangeCut::AboveNull,
            RangeCut::BelowAll,
            RangeCut::Below(Literal::Int(0)),
        ];
        cuts.sort();
        assert_eq!(
            cuts,
            vec![
                RangeCut::BelowAll,
                RangeCut::AboveNull,
                RangeCut::Below(Literal::Int(0)),
                RangeCut::Below(Literal::Int(1)),
                RangeCut::Above(Literal::Int(1)),
                RangeCut::AboveAll,
            ]
        );
    }

    #[test]
    fn test_column_contains() {
        assert!(point(3).contains(&Literal::Int(3)));
        assert!(!point(3).contains(&Literal::Null));
        assert!(!open(1, 5).contains(&Literal::Int(1)));
        assert!(open(1, 5).contains(&Literal::Int(4)));
        let null = RangeColumnExpr::null_point(DataType::Int64);
        assert!(null.contains(&Literal::Null));
        assert!(!null.contains(&Literal::Int(0)));
        assert!(!RangeColumnExpr::not_null(DataType::Int64).contains(&Literal::Null));
        assert!(open(1, 2).intersect(&point(2)).is_none());
    }

    #[test]
    fn test_remove_overlaps_merges() {
        let coll = RangeCollection::new(vec![
            Range::new(vec![open(0, 10)]),
            Range::new(vec![open(5, 20)]),
            Range::new(vec![point(10)]),
        ]);
        let out = coll.remove_overlaps();
        assert_eq!(out.len(), 1);
        assert_eq!(out.0[0].columns[0], open(0, 20));
    }

    #[test]
    fn test_remove_overlaps_two_columns() {
        let full = RangeColumnExpr::full(DataType::Int64);
        let coll = RangeCollection::new(vec![
            Range::new(vec![point(1), full.clone()]),
            Range::new(vec![open(0, 5), point(7)]),
        ]);
        let out = coll.clone().remove_overlaps();
        for (i, a) in out.0.iter().enumerate() {
            for b in &out.0[i + 1..] {
                assert!(!a.overlaps(b), "{a} overlaps {b}");
            }
        }
        for x in 0..6 {
            for y in [Literal::Null, Literal::Int(7), Literal::Int(8)] {
                let row = [Literal::Int(x), y];
                assert_eq!(coll.contains(&row), out.contains(&row));
            }
        }
    }

    #[test]
    fn test_full_table() {
        let coll = RangeCollection::new(vec![Range::full(&[DataType::Int64, DataType::Utf8])]);
        assert!(coll.is_full_table());
        assert_eq!(coll.to_string(), "[{(-∞, ∞), (-∞, ∞)}]");
        assert_eq!(Range::new(vec![point(1)]).to_string(), "{[1, 1]}");
    }
}
