//! Histogram truncation, union and intersection
//!
//! Bucket bounds are key prefixes compared column by column over their
//! common length. Row estimates only ever shrink under truncation.

use idxplan_catalog::HistogramBucket;
use idxplan_sql::Literal;
use std::cmp::Ordering;

/// Compares two keys over their common prefix
fn cmp_prefix(a: &[Literal], b: &[Literal]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn cmp_keys(a: &[Literal], b: &[Literal]) -> Ordering {
    cmp_prefix(a, b).then_with(|| a.len().cmp(&b.len()))
}

fn contains_key(bucket: &HistogramBucket, key: &[Literal]) -> bool {
    cmp_prefix(&bucket.lower, key).is_le() && cmp_prefix(key, &bucket.upper).is_le()
}

fn is_null_bucket(bucket: &HistogramBucket) -> bool {
    bucket.lower.first().is_some_and(Literal::is_null)
        && bucket.upper.first().is_some_and(Literal::is_null)
}

pub fn row_count(hist: &[HistogramBucket]) -> f64 {
    hist.iter().map(|b| b.row_count).sum()
}

/// Rows matching a `key` prefix of length `k` out of `columns` index columns.
/// A bucket's distinct count covers full keys, so a k-column prefix has about
/// `distinct^(k/columns)` distinct values.
fn prefix_rows(bucket: &HistogramBucket, key: &[Literal], columns: usize) -> f64 {
    let mcv_rows: f64 = bucket
        .mcvs
        .iter()
        .zip(&bucket.mcv_counts)
        .filter(|(mcv, _)| mcv.len() >= key.len() && cmp_prefix(mcv, key).is_eq())
        .map(|(_, count)| *count)
        .sum();
    if mcv_rows > 0.0 {
        return mcv_rows;
    }
    let non_null = (bucket.row_count - bucket.null_count).max(0.0);
    let exponent = key.len() as f64 / columns.max(1) as f64;
    non_null / bucket.distinct_count.max(1.0).powf(exponent)
}

/// Keeps the rows whose leading columns equal `key`
pub fn prefix_key(hist: &[HistogramBucket], key: &[Literal], columns: usize) -> Vec<HistogramBucket> {
    let Some(first) = key.first() else {
        return hist.to_vec();
    };
    let columns = columns.max(key.len());
    let mut rows = 0.0;
    let mut distinct: f64 = 0.0;
    if first.is_null() {
        for b in hist {
            let nulls = if is_null_bucket(b) { b.row_count } else { b.null_count };
            if nulls <= 0.0 {
                continue;
            }
            let rest = (key.len() - 1) as f64 / columns as f64;
            rows += nulls / b.distinct_count.max(1.0).powf(rest);
            distinct += 1.0;
        }
    } else {
        for b in hist.iter().filter(|b| !is_null_bucket(b) && contains_key(b, key)) {
            let r = prefix_rows(b, key, columns);
            rows += r;
            let remaining = (columns - key.len()) as f64 / columns as f64;
            distinct += b.distinct_count.max(1.0).powf(remaining).min(r.max(1.0));
        }
    }
    if rows <= 0.0 {
        return vec![];
    }
    let mcvs: Vec<(Vec<Literal>, f64)> = hist
        .iter()
        .flat_map(|b| b.mcvs.iter().cloned().zip(b.mcv_counts.iter().copied()))
        .filter(|(mcv, _)| mcv.len() >= key.len() && cmp_prefix(mcv, key).is_eq())
        .collect();
    let (mcvs, counts) = mcvs.into_iter().unzip();
    vec![HistogramBucket::new(key.to_vec(), key.to_vec(), rows, distinct.max(1.0))
        .with_null_count(if first.is_null() { rows } else { 0.0 })
        .with_mcvs(mcvs, counts)]
}

/// Bound on the first index column
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub value: Literal,
    pub inclusive: bool,
}

fn below_lower(v: &Literal, lower: &Option<Bound>) -> bool {
    lower.as_ref().is_some_and(|b| match v.total_cmp(&b.value) {
        Ordering::Less => true,
        Ordering::Equal => !b.inclusive,
        Ordering::Greater => false,
    })
}

fn above_upper(v: &Literal, upper: &Option<Bound>) -> bool {
    upper.as_ref().is_some_and(|b| match v.total_cmp(&b.value) {
        Ordering::Greater => true,
        Ordering::Equal => !b.inclusive,
        Ordering::Less => false,
    })
}

/// Keeps rows whose first column falls between `lower` and `upper`. NULLs
/// never satisfy a range. A bucket straddling a bound keeps the covered share
/// of its rows, interpolated for numeric bounds and halved otherwise.
pub fn range_truncate(
    hist: &[HistogramBucket],
    lower: Option<Bound>,
    upper: Option<Bound>,
) -> Vec<HistogramBucket> {
    let mut out = Vec::new();
    for b in hist {
        if is_null_bucket(b) {
            continue;
        }
        let (Some(lo), Some(hi)) = (b.lower.first(), b.upper.first()) else {
            continue;
        };
        if above_upper(lo, &upper) || below_lower(hi, &lower) {
            continue;
        }
        let mut fraction = 1.0;
        if below_lower(lo, &lower) {
            fraction *= covered_share(lo, hi, lower.as_ref().map(|l| &l.value), None);
        }
        if above_upper(hi, &upper) {
            fraction *= covered_share(lo, hi, None, upper.as_ref().map(|u| &u.value));
        }

        let (mcvs, counts): (Vec<_>, Vec<_>) = b
            .mcvs
            .iter()
            .zip(&b.mcv_counts)
            .filter(|(mcv, _)| {
                mcv.first()
                    .is_some_and(|v| !v.is_null() && !below_lower(v, &lower) && !above_upper(v, &upper))
            })
            .map(|(m, c)| (m.clone(), *c))
            .unzip();
        let non_null = (b.row_count - b.null_count).max(0.0);
        let rows = non_null * fraction;
        if rows <= 0.0 {
            continue;
        }
        out.push(
            HistogramBucket::new(
                b.lower.clone(),
                b.upper.clone(),
                rows,
                (b.distinct_count * fraction).max(1.0).min(rows.max(1.0)),
            )
            .with_mcvs(mcvs, counts),
        );
    }
    out
}

fn covered_share(lo: &Literal, hi: &Literal, from: Option<&Literal>, to: Option<&Literal>) -> f64 {
    let (Some(l), Some(h)) = (lo.as_f64(), hi.as_f64()) else {
        return 0.5;
    };
    if h <= l {
        return 0.5;
    }
    let start = from.and_then(Literal::as_f64).unwrap_or(l).max(l);
    let end = to.and_then(Literal::as_f64).unwrap_or(h).min(h);
    ((end - start) / (h - l)).clamp(0.0, 1.0)
}

/// Removes the rows whose first column equals `value`
pub fn not_eq(hist: &[HistogramBucket], value: &Literal) -> Vec<HistogramBucket> {
    let key = std::slice::from_ref(value);
    hist.iter()
        .filter_map(|b| {
            if is_null_bucket(b) {
                return None;
            }
            let mut b = b.clone();
            if contains_key(&b, key) {
                let removed = prefix_rows(&b, key, b.lower.len().max(1)).min(b.row_count);
                let keep: Vec<bool> = b
                    .mcvs
                    .iter()
                    .map(|m| m.first().map_or(true, |v| v.total_cmp(value).is_ne()))
                    .collect();
                let mut it = keep.iter();
                b.mcvs.retain(|_| it.next().copied().unwrap_or(true));
                let mut it = keep.iter();
                b.mcv_counts.retain(|_| it.next().copied().unwrap_or(true));
                b.row_count -= removed;
                b.distinct_count = (b.distinct_count - 1.0).max(1.0);
            }
            // NULL never differs from a value
            b.row_count -= b.null_count;
            b.null_count = 0.0;
            (b.row_count > 0.0).then_some(b)
        })
        .collect()
}

/// Keeps only the NULL rows of the first column, or only the non-NULL rows
pub fn null_filter(hist: &[HistogramBucket], keep_null: bool) -> Vec<HistogramBucket> {
    hist.iter()
        .filter_map(|b| {
            let mut b = b.clone();
            if keep_null {
                if !is_null_bucket(&b) {
                    b.row_count = b.null_count;
                    b.distinct_count = 1.0;
                    b.mcvs.clear();
                    b.mcv_counts.clear();
                }
            } else if is_null_bucket(&b) {
                return None;
            } else {
                b.row_count -= b.null_count;
                b.null_count = 0.0;
            }
            (b.row_count > 0.0).then_some(b)
        })
        .collect()
}

fn sort_buckets(hist: &mut [HistogramBucket]) {
    hist.sort_by(|a, b| {
        cmp_keys(&a.lower, &b.lower).then_with(|| cmp_keys(&a.upper, &b.upper))
    });
}

/// Union of two truncated histograms over the same index. Buckets with the
/// same or nested bounds collapse into one, keeping the larger counts.
pub fn union(a: &[HistogramBucket], b: &[HistogramBucket]) -> Vec<HistogramBucket> {
    let mut all: Vec<HistogramBucket> = a.iter().chain(b).cloned().collect();
    sort_buckets(&mut all);
    let mut out: Vec<HistogramBucket> = Vec::with_capacity(all.len());
    for bucket in all {
        if let Some(last) = out.last_mut() {
            let nested = cmp_prefix(&last.lower, &bucket.lower).is_le()
                && cmp_prefix(&bucket.upper, &last.upper).is_le();
            if nested {
                last.row_count = last.row_count.max(bucket.row_count);
                last.distinct_count = last.distinct_count.max(bucket.distinct_count);
                last.null_count = last.null_count.max(bucket.null_count);
                for (mcv, count) in bucket.mcvs.into_iter().zip(bucket.mcv_counts) {
                    if !last.mcvs.contains(&mcv) {
                        last.mcvs.push(mcv);
                        last.mcv_counts.push(count);
                    }
                }
                continue;
            }
        }
        out.push(bucket);
    }
    out
}

/// Intersection of two truncated histograms over the same index
pub fn intersect(a: &[HistogramBucket], b: &[HistogramBucket]) -> Vec<HistogramBucket> {
    let mut out = Vec::new();
    for x in a {
        for y in b {
            if cmp_prefix(&x.upper, &y.lower).is_lt() || cmp_prefix(&y.upper, &x.lower).is_lt() {
                continue;
            }
            let lower = if cmp_keys(&x.lower, &y.lower).is_ge() { &x.lower } else { &y.lower };
            let upper = if cmp_keys(&x.upper, &y.upper).is_le() { &x.upper } else { &y.upper };
            let rows = x.row_count.min(y.row_count);
            if rows <= 0.0 {
                continue;
            }
            out.push(
                HistogramBucket::new(
                    lower.clone(),
                    upper.clone(),
                    rows,
                    x.distinct_count.min(y.distinct_count),
                )
                .with_null_count(x.null_count.min(y.null_count)),
            );
        }
    }
    sort_buckets(&mut out);
    out
}

/// Scales every bucket so the histogram holds at most `max_rows` rows
pub fn cap_rows(hist: Vec<HistogramBucket>, max_rows: f64) -> Vec<HistogramBucket> {
    let total = row_count(&hist);
    if total <= max_rows || total <= 0.0 {
        return hist;
    }
    let scale = max_rows / total;
    hist.into_iter()
        .map(|mut b| {
            b.row_count *= scale;
            b.null_count *= scale;
            b.mcv_counts.iter_mut().for_each(|c| *c *= scale);
            b
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(lo: i64, hi: i64, rows: f64, distinct: f64) -> HistogramBucket {
        HistogramBucket::new(vec![Literal::Int(lo)], vec![Literal::Int(hi)], rows, distinct)
    }

    fn hist() -> Vec<HistogramBucket> {
        vec![
            bucket(0, 9, 100.0, 10.0).with_null_count(10.0),
            bucket(10, 19, 100.0, 10.0)
                .with_mcvs(vec![vec![Literal::Int(15)]], vec![40.0]),
            bucket(20, 29, 100.0, 50.0),
        ]
    }

    #[test]
    fn test_prefix_key_uses_mcvs() {
        let out = prefix_key(&hist(), &[Literal::Int(15)], 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].row_count, 40.0);

        let out = prefix_key(&hist(), &[Literal::Int(5)], 1);
        assert_eq!(out[0].row_count, 9.0);

        assert!(prefix_key(&hist(), &[Literal::Int(99)], 1).is_empty());
    }

    #[test]
    fn test_prefix_key_longer_prefix_is_smaller() {
        let h = vec![HistogramBucket::new(
            vec![Literal::Int(0), Literal::Int(0)],
            vec![Literal::Int(9), Literal::Int(9)],
            1000.0,
            100.0,
        )];
        let one = prefix_key(&h, &[Literal::Int(1)], 2);
        let two = prefix_key(&h, &[Literal::Int(1), Literal::Int(4)], 2);
        assert!((row_count(&one) - 100.0).abs() < 1e-9);
        assert!((row_count(&two) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_prefix_key_null() {
        let out = prefix_key(&hist(), &[Literal::Null], 1);
        assert_eq!(row_count(&out), 10.0);
    }

    #[test]
    fn test_range_truncate_interpolates() {
        let out = range_truncate(
            &hist(),
            Some(Bound {
                value: Literal::Int(15),
                inclusive: false,
            }),
            None,
        );
        assert_eq!(out.len(), 2);
        // (15, 19] of [10, 19]
        assert!((out[0].row_count - 100.0 * 4.0 / 9.0).abs() < 1e-9);
        assert!(out[0].mcvs.is_empty());
        assert_eq!(out[1].row_count, 100.0);
    }

    #[test]
    fn test_range_truncate_drops_nulls() {
        let out = range_truncate(
            &hist(),
            None,
            Some(Bound {
                value: Literal::Int(9),
                inclusive: true,
            }),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].row_count, 90.0);
    }

    #[test]
    fn test_not_eq_and_null_filter() {
        let out = not_eq(&hist(), &Literal::Int(15));
        assert_eq!(row_count(&out), 90.0 + 60.0 + 100.0);
        assert!(out[1].mcvs.is_empty());

        assert_eq!(row_count(&null_filter(&hist(), true)), 10.0);
        assert_eq!(row_count(&null_filter(&hist(), false)), 290.0);
    }

    #[test]
    fn test_union_and_intersect() {
        let a = prefix_key(&hist(), &[Literal::Int(1)], 1);
        let b = prefix_key(&hist(), &[Literal::Int(2)], 1);
        let u = union(&a, &b);
        assert_eq!(u.len(), 2);
        assert_eq!(row_count(&u), row_count(&a) + row_count(&b));
        assert_eq!(union(&a, &a).len(), 1);

        let i = intersect(&hist(), &a);
        assert_eq!(i.len(), 1);
        assert!(row_count(&i) <= row_count(&a));
        assert!(intersect(&a, &b).is_empty());
    }

    #[test]
    fn test_cap_rows() {
        let capped = cap_rows(hist(), 30.0);
        assert!((row_count(&capped) - 30.0).abs() < 1e-9);
        assert_eq!(row_count(&cap_rows(hist(), 1000.0)), 300.0);
    }
}
