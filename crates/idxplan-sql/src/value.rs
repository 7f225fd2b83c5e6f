//! Literal values, type families and value ordering

use crate::expr::BinaryOperator;
use arrow_schema::DataType;
use idxplan_common::{IdxError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// 2D point
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Geometry operand of a spatial predicate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Geometry {
    Point(Point),
    LineString(Vec<Point>),
    Polygon(Vec<Point>),
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Point { x, y })
    }

    fn points(&self) -> &[Point] {
        match self {
            Geometry::Point(p) => std::slice::from_ref(p),
            Geometry::LineString(pts) | Geometry::Polygon(pts) => pts,
        }
    }

    /// Axis-aligned bounding box `(min_x, min_y, max_x, max_y)`; `None` for an
    /// empty geometry
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        let pts = self.points();
        let first = pts.first()?;
        let mut bbox = (first.x, first.y, first.x, first.y);
        for p in &pts[1..] {
            bbox.0 = bbox.0.min(p.x);
            bbox.1 = bbox.1.min(p.y);
            bbox.2 = bbox.2.max(p.x);
            bbox.3 = bbox.3.max(p.y);
        }
        Some(bbox)
    }

    pub fn bbox_intersects(&self, other: &Geometry) -> bool {
        match (self.bbox(), other.bbox()) {
            (Some(a), Some(b)) => a.0 <= b.2 && b.0 <= a.2 && a.1 <= b.3 && b.1 <= a.3,
            _ => false,
        }
    }

    pub fn bbox_within(&self, other: &Geometry) -> bool {
        match (self.bbox(), other.bbox()) {
            (Some(a), Some(b)) => a.0 >= b.0 && a.1 >= b.1 && a.2 <= b.2 && a.3 <= b.3,
            _ => false,
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |pts: &[Point]| {
            pts.iter()
                .map(|p| format!("{} {}", p.x, p.y))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Geometry::Point(p) => write!(f, "POINT({} {})", p.x, p.y),
            Geometry::LineString(pts) => write!(f, "LINESTRING({})", list(pts)),
            Geometry::Polygon(pts) => write!(f, "POLYGON(({}))", list(pts)),
        }
    }
}

/// Literal value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Geometry(Geometry),
}

/// Coarse type classes; two values in the same family compare without
/// coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeFamily {
    Boolean,
    Numeric,
    Text,
    Binary,
    Other,
}

impl TypeFamily {
    pub fn of(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => TypeFamily::Boolean,
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => TypeFamily::Numeric,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => TypeFamily::Text,
            DataType::Binary | DataType::LargeBinary | DataType::BinaryView => TypeFamily::Binary,
            _ => TypeFamily::Other,
        }
    }

    /// Text and blob columns; a unique index stores a content hash for these
    pub fn is_text_blob(data_type: &DataType) -> bool {
        matches!(Self::of(data_type), TypeFamily::Text | TypeFamily::Binary)
    }
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    pub fn family(&self) -> Option<TypeFamily> {
        match self {
            Literal::Null => None,
            Literal::Boolean(_) => Some(TypeFamily::Boolean),
            Literal::Int(_) | Literal::Float(_) => Some(TypeFamily::Numeric),
            Literal::String(_) => Some(TypeFamily::Text),
            Literal::Geometry(_) => Some(TypeFamily::Binary),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Boolean(b) => Some(*b),
            Literal::Int(i) => Some(*i != 0),
            Literal::Float(f) => Some(*f != 0.0),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            Literal::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Literal::Null => 0,
            Literal::Boolean(_) => 1,
            Literal::Int(_) | Literal::Float(_) => 2,
            Literal::String(_) => 3,
            Literal::Geometry(_) => 4,
        }
    }

    /// Total order used for histogram keys and range cuts. NULL sorts first;
    /// integers and floats compare numerically.
    pub fn total_cmp(&self, other: &Literal) -> Ordering {
        match (self, other) {
            (Literal::Null, Literal::Null) => Ordering::Equal,
            (Literal::Boolean(a), Literal::Boolean(b)) => a.cmp(b),
            (Literal::Int(a), Literal::Int(b)) => a.cmp(b),
            (Literal::Int(a), Literal::Float(b)) => (*a as f64).total_cmp(b),
            (Literal::Float(a), Literal::Int(b)) => a.total_cmp(&(*b as f64)),
            (Literal::Float(a), Literal::Float(b)) => a.total_cmp(b),
            (Literal::String(a), Literal::String(b)) => a.cmp(b),
            (Literal::Geometry(a), Literal::Geometry(b)) => {
                let key = |g: &Geometry| g.bbox().unwrap_or((0.0, 0.0, 0.0, 0.0));
                let (ka, kb) = (key(a), key(b));
                ka.0.total_cmp(&kb.0)
                    .then(ka.1.total_cmp(&kb.1))
                    .then(ka.2.total_cmp(&kb.2))
                    .then(ka.3.total_cmp(&kb.3))
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Converts the literal to a column's declared type, failing with
    /// `InvalidValueType` when no faithful conversion exists.
    pub fn coerce_to(&self, data_type: &DataType) -> Result<Literal> {
        if self.is_null() {
            return Ok(Literal::Null);
        }
        let invalid =
            || IdxError::InvalidValueType(format!("cannot use {} as {}", self, data_type));
        match TypeFamily::of(data_type) {
            TypeFamily::Numeric => match self {
                Literal::Int(_) => Ok(self.clone()),
                Literal::Float(f) if is_float_type(data_type) => Ok(Literal::Float(*f)),
                Literal::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Ok(Literal::Int(*f as i64))
                }
                Literal::Float(_) => Ok(self.clone()),
                Literal::Boolean(b) => Ok(Literal::Int(i64::from(*b))),
                Literal::String(s) => {
                    let s = s.trim();
                    if let Ok(i) = s.parse::<i64>() {
                        Ok(Literal::Int(i))
                    } else if let Ok(f) = s.parse::<f64>() {
                        Ok(Literal::Float(f))
                    } else {
                        Err(invalid())
                    }
                }
                _ => Err(invalid()),
            },
            TypeFamily::Text => match self {
                Literal::String(_) => Ok(self.clone()),
                _ => Err(invalid()),
            },
            TypeFamily::Boolean => match self {
                Literal::Boolean(_) => Ok(self.clone()),
                Literal::Int(0) => Ok(Literal::Boolean(false)),
                Literal::Int(1) => Ok(Literal::Boolean(true)),
                _ => Err(invalid()),
            },
            TypeFamily::Binary => match self {
                Literal::Geometry(_) | Literal::String(_) => Ok(self.clone()),
                _ => Err(invalid()),
            },
            TypeFamily::Other => Ok(self.clone()),
        }
    }

    pub(crate) fn arithmetic(&self, op: BinaryOperator, other: &Literal) -> Literal {
        match (self, other) {
            (Literal::Int(a), Literal::Int(b)) => {
                let v = match op {
                    BinaryOperator::Plus => a.checked_add(*b),
                    BinaryOperator::Minus => a.checked_sub(*b),
                    BinaryOperator::Multiply => a.checked_mul(*b),
                    BinaryOperator::Divide => {
                        return if *b == 0 {
                            Literal::Null
                        } else {
                            Literal::Float(*a as f64 / *b as f64)
                        }
                    }
                    BinaryOperator::Modulo => a.checked_rem(*b),
                    _ => None,
                };
                v.map_or(Literal::Null, Literal::Int)
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => match op {
                    BinaryOperator::Plus => Literal::Float(a + b),
                    BinaryOperator::Minus => Literal::Float(a - b),
                    BinaryOperator::Multiply => Literal::Float(a * b),
                    BinaryOperator::Divide if b != 0.0 => Literal::Float(a / b),
                    BinaryOperator::Modulo if b != 0.0 => Literal::Float(a % b),
                    _ => Literal::Null,
                },
                _ => Literal::Null,
            },
        }
    }
}

fn is_float_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _)
    )
}

/// SQL comparison of two values. `None` when either side is NULL. A string
/// compared with a number is parsed as a number first.
pub fn compare_values(a: &Literal, b: &Literal) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match (a, b) {
        (Literal::String(s), n) | (n, Literal::String(s))
            if n.family() == Some(TypeFamily::Numeric) =>
        {
            let parsed = s.trim().parse::<f64>().ok()?;
            let ord = Literal::Float(parsed).total_cmp(n);
            Some(if matches!(a, Literal::String(_)) {
                ord
            } else {
                ord.reverse()
            })
        }
        _ => Some(a.total_cmp(b)),
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Geometry(g) => write!(f, "{g}"),
        }
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Literal::Int(i64::from(v))
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Boolean(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::String(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::String(v)
    }
}

impl From<Geometry> for Literal {
    fn from(v: Geometry) -> Self {
        Literal::Geometry(v)
    }
}
