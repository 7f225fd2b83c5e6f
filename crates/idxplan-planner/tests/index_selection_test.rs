//! Index selection over a small `t(a, b, c)` table

use arrow_schema::{DataType, Field, Schema};
use idxplan_catalog::{
    HistogramBucket, IndexClass, IndexColumn, IndexDef, StatQualifier, Statistic, StatsProvider,
    TableEntry,
};
use idxplan_common::{CosterConfig, IdSet, Result};
use idxplan_planner::{
    costed_index_scan, histogram, index_fds, uniform_dist_statistic, BestCandidate, Flattener,
    IndexCoster, IndexFilter,
};
use idxplan_sql::expr::{and, binary, col, in_list, lit, or};
use idxplan_sql::{BinaryOperator, ColumnRef, Expr, Literal, LookupPayload};
use std::sync::Arc;

/// Provider without index statistics; every index gets the uniform fallback
struct UniformStats;

impl StatsProvider for UniformStats {
    fn get_table_stats(&self, _database: &str, _table: &str) -> Result<Vec<Statistic>> {
        Ok(vec![])
    }

    fn row_count(&self, _database: &str, _table: &str) -> Result<u64> {
        Ok(1000)
    }

    fn data_length(&self, _database: &str, _table: &str) -> Result<u64> {
        Ok(64_000)
    }
}

fn table(indexes: Vec<IndexDef>) -> TableEntry {
    let schema = Arc::new(Schema::new(vec![
        Field::new("a", DataType::Int64, true),
        Field::new("b", DataType::Int64, true),
        Field::new("c", DataType::Int64, true),
    ]));
    indexes
        .into_iter()
        .fold(TableEntry::new("db", "t", schema), |t, i| t.with_index(i))
}

fn index(id: &str, cols: &[&str]) -> IndexDef {
    IndexDef::new(
        id,
        "db",
        "t",
        cols.iter()
            .map(|c| IndexColumn::new(*c, DataType::Int64))
            .collect(),
    )
}

fn cmp(c: &str, op: BinaryOperator, v: i64) -> Expr {
    binary(col(c, DataType::Int64), op, lit(v))
}

fn eq(c: &str, v: i64) -> Expr {
    cmp(c, BinaryOperator::Eq, v)
}

fn ranges_of(lookup: &LookupPayload) -> String {
    match lookup {
        LookupPayload::Ranges(r) => r.to_string(),
        other => panic!("expected ranges, got {other:?}"),
    }
}

/// Costs `filter` against each index in the given order and returns the best
fn best_of(t: &TableEntry, filter: &Expr, order: &[usize]) -> Option<BestCandidate> {
    let config = CosterConfig::default();
    let root = Flattener::new().flatten(filter).root?;
    let mut coster = IndexCoster::new(&root, &config);
    for &i in order {
        let idx = &t.indexes[i];
        let stat = uniform_dist_statistic(t, idx, 1000, 64, &config).unwrap();
        coster.cost(&root, &stat, idx).unwrap();
    }
    coster.into_best()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_unique_prefix_with_trailing_range() {
    let _ = tracing_subscriber::fmt::try_init();
    let t = table(vec![index("ab", &["a", "b"]).with_unique(true)]);
    let filter = and(eq("a", 1), cmp("b", BinaryOperator::Gt, 5));

    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert_eq!(result.index_id, "ab");
    assert_eq!(ranges_of(&result.lookup.payload), "[{[1, 1], (5, ∞)}]");
    assert!(result.residual.is_none());
    assert!(!result.max1_row);

    let best = best_of(&t, &filter, &[0]).unwrap();
    assert_eq!(best.prefix, 1);
    assert!(best.has_range);
    assert!(!best.fds.has_max1_row());
    assert!(best.fds.constants().contains(0));
}

#[test]
fn test_or_of_equalities_unions_points() {
    let t = table(vec![index("a_idx", &["a"])]);
    let filter = or(eq("a", 1), eq("a", 2));
    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert_eq!(ranges_of(&result.lookup.payload), "[{[1, 1]}, {[2, 2]}]");
    assert!(result.residual.is_none());
}

#[test]
fn test_or_with_uncovered_column_keeps_table_scan() {
    let t = table(vec![index("ab", &["a", "b"]), index("a_idx", &["a"])]);
    let filter = or(and(eq("a", 1), eq("b", 2)), eq("c", 3));

    let flat = Flattener::new().flatten(&filter);
    assert!(matches!(flat.root, Some(IndexFilter::Or(_))));
    assert!(best_of(&t, &filter, &[0, 1]).is_none());

    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default()).unwrap();
    assert!(result.is_none());
}

#[test]
fn test_conflicting_constants_are_unsatisfiable() {
    let t = table(vec![index("a_idx", &["a"])]);
    let filter = and(eq("a", 1), eq("a", 2));

    let best = best_of(&t, &filter, &[0]).unwrap();
    assert!(best.is_false);
    assert_eq!(best.row_count, 0.0);

    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert!(result.is_false);
    assert!(result.lookup.is_empty);
    assert_eq!(result.lookup.ranges().map(|r| r.len()), Some(0));
    assert_eq!(result.residual, Some(filter));
}

// ============================================================================
// Residuals
// ============================================================================

#[test]
fn test_unindexed_conjuncts_stay_in_residual() {
    let t = table(vec![index("a_idx", &["a"])]);
    let like = binary(col("c", DataType::Int64), BinaryOperator::Like, lit("1%"));
    let filter = and(and(eq("a", 1), eq("b", 2)), like.clone());
    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert_eq!(result.residual, Some(and(eq("b", 2), like)));
}

#[test]
fn test_prefix_length_index_keeps_whole_filter() {
    let t = table(vec![index("a_idx", &["a"]).with_prefix_lengths(vec![4])]);
    let filter = eq("a", 1);
    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert_eq!(result.residual, Some(filter));
}

#[test]
fn test_imprecise_match_table_keeps_whole_filter() {
    let t = table(vec![index("a_idx", &["a"])]).with_precise_match(false);
    let filter = in_list(col("a", DataType::Int64), vec![lit(1), lit(4)], false);
    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert_eq!(result.residual, Some(filter));
}

#[test]
fn test_full_table_range_is_abandoned() {
    let t = table(vec![index("a_idx", &["a"])]);
    let filter = or(
        cmp("a", BinaryOperator::Lt, 5),
        Expr::IsNull(Box::new(col("a", DataType::Int64))),
    );
    let filter = or(filter, cmp("a", BinaryOperator::Gte, 5));
    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default()).unwrap();
    assert!(result.is_none());
}

#[test]
fn test_unique_equality_is_max1_row() {
    let schema = Arc::new(Schema::new(vec![
        Field::new("a", DataType::Int64, false),
        Field::new("b", DataType::Int64, true),
        Field::new("c", DataType::Int64, true),
    ]));
    let t = TableEntry::new("db", "t", schema).with_index(index("primary", &["a"]).with_unique(true));
    let result = costed_index_scan(&UniformStats, &t, &eq("a", 7), &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert!(result.max1_row);
    assert_eq!(result.stat.row_count, 1.0);
    assert_eq!(result.stat.distinct_count, 1.0);
}

#[test]
fn test_disabled_config_skips_costing() {
    let t = table(vec![index("a_idx", &["a"])]);
    let config = CosterConfig {
        enabled: false,
        ..Default::default()
    };
    assert!(costed_index_scan(&UniformStats, &t, &eq("a", 1), &config)
        .unwrap()
        .is_none());
}

// ============================================================================
// Spatial and full-text
// ============================================================================

fn spatial_table() -> TableEntry {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("g", DataType::Binary, true),
    ]));
    TableEntry::new("db", "places", schema).with_index(
        IndexDef::new("sp_g", "db", "places", vec![IndexColumn::new("g", DataType::Binary)])
            .with_class(IndexClass::Spatial),
    )
}

fn intersects(x: i64, y: i64) -> Expr {
    let point = Expr::Function {
        name: "POINT".into(),
        args: vec![lit(x), lit(y)],
    };
    Expr::Function {
        name: "ST_Intersects".into(),
        args: vec![col("g", DataType::Binary), point],
    }
}

#[test]
fn test_spatial_lookup_uses_bounding_box() {
    let t = spatial_table();
    let filter = intersects(1, 2);
    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert_eq!(result.index_id, "sp_g");
    assert!(result.lookup.is_spatial);
    assert_eq!(ranges_of(&result.lookup.payload), "[{[POINT(1 2), POINT(1 2)]}]");
    assert_eq!(result.residual, Some(filter));
}

#[test]
fn test_spatial_lookup_over_disjoint_boxes_is_abandoned() {
    let t = spatial_table();
    let filter = or(intersects(1, 2), intersects(5, 6));
    assert!(best_of(&t, &filter, &[0]).is_some());
    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default()).unwrap();
    assert!(result.is_none());
}

fn fulltext_table() -> TableEntry {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("body", DataType::Utf8, true),
    ]));
    TableEntry::new("db", "docs", schema).with_index(
        IndexDef::new("ft_body", "db", "docs", vec![IndexColumn::new("body", DataType::Utf8)])
            .with_class(IndexClass::Fulltext),
    )
}

fn match_body(query: &str) -> Expr {
    Expr::MatchAgainst {
        columns: vec![ColumnRef::new("body", DataType::Utf8)],
        query: query.into(),
        index: Some("ft_body".into()),
    }
}

#[test]
fn test_fulltext_match_selects_index() {
    let _ = tracing_subscriber::fmt::try_init();
    let t = fulltext_table();
    let filter = match_body("rust");
    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert_eq!(result.index_id, "ft_body");
    assert_eq!(result.lookup.payload, LookupPayload::FullText(filter.clone()));
    assert!(result.lookup.ranges().is_none());
    assert_eq!(result.residual, Some(filter));
    assert!(!result.is_false);
}

#[test]
fn test_fulltext_match_in_conjunction_keeps_whole_filter() {
    let t = fulltext_table();
    let filter = and(match_body("rust"), cmp("id", BinaryOperator::Gt, 3));
    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert_eq!(result.lookup.payload, LookupPayload::FullText(match_body("rust")));
    assert_eq!(result.residual, Some(filter));
}

#[test]
fn test_fulltext_match_bound_elsewhere_is_ignored() {
    let t = fulltext_table();
    let filter = Expr::MatchAgainst {
        columns: vec![ColumnRef::new("body", DataType::Utf8)],
        query: "rust".into(),
        index: Some("ft_title".into()),
    };
    let result = costed_index_scan(&UniformStats, &t, &filter, &CosterConfig::default()).unwrap();
    assert!(result.is_none());
}

// ============================================================================
// Recorded statistics
// ============================================================================

struct RecordedStats(Vec<Statistic>);

impl StatsProvider for RecordedStats {
    fn get_table_stats(&self, _database: &str, _table: &str) -> Result<Vec<Statistic>> {
        Ok(self.0.clone())
    }

    fn row_count(&self, _database: &str, _table: &str) -> Result<u64> {
        Ok(1000)
    }

    fn data_length(&self, _database: &str, _table: &str) -> Result<u64> {
        Ok(64_000)
    }
}

#[test]
fn test_recorded_statistic_keeps_its_dependencies() {
    let idx = index("u_a", &["a"]).with_unique(true);
    let t = table(vec![idx.clone()]);

    // the catalog only knows a lax key over the nullable column
    let uniform = costed_index_scan(&UniformStats, &t, &eq("a", 7), &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert!(!uniform.max1_row);

    let not_null = Arc::new(Schema::new(vec![
        Field::new("a", DataType::Int64, false),
        Field::new("b", DataType::Int64, true),
        Field::new("c", DataType::Int64, true),
    ]));
    let strict = index_fds(&TableEntry::new("db", "t", not_null), &idx).unwrap();
    let stat = Statistic::new(
        StatQualifier::new("db", "db", "t", "u_a"),
        idx.column_names(),
        idx.column_types(),
    )
    .with_row_count(1000.0)
    .with_col_set(vec![0])
    .with_func_deps(strict);

    let recorded = RecordedStats(vec![stat]);
    let result = costed_index_scan(&recorded, &t, &eq("a", 7), &CosterConfig::default())
        .unwrap()
        .unwrap();
    assert!(result.max1_row);
    assert_eq!(result.stat.row_count, 1.0);
}

// ============================================================================
// Determinism and monotonicity
// ============================================================================

#[test]
fn test_costing_is_deterministic() {
    let t = table(vec![
        index("b_idx", &["b"]),
        index("ab", &["a", "b"]),
        index("a_idx", &["a"]),
        index("ba", &["b", "a"]),
    ]);
    let filter = and(cmp("a", BinaryOperator::Gte, 2), eq("b", 3));
    let config = CosterConfig::default();
    let first = costed_index_scan(&UniformStats, &t, &filter, &config)
        .unwrap()
        .unwrap();
    for _ in 0..5 {
        let again = costed_index_scan(&UniformStats, &t, &filter, &config)
            .unwrap()
            .unwrap();
        assert_eq!(again.index_id, first.index_id);
        assert_eq!(again.lookup, first.lookup);
        assert_eq!(again.residual, first.residual);
    }
}

fn histogram_stat(t: &TableEntry) -> Statistic {
    let idx = &t.indexes[0];
    let mut buckets = Vec::new();
    for a in 0..4 {
        let lower = vec![Literal::Int(a), Literal::Int(0), Literal::Int(0)];
        let upper = vec![Literal::Int(a), Literal::Int(9), Literal::Int(9)];
        buckets.push(HistogramBucket::new(lower, upper, 250.0, 100.0));
    }
    Statistic::new(
        StatQualifier::new("db", "db", "t", &idx.id),
        idx.column_names(),
        idx.column_types(),
    )
    .with_histogram(buckets)
    .with_col_set(vec![0, 1, 2])
    .with_func_deps(index_fds(t, idx).unwrap())
    .update_counts()
}

#[test]
fn test_equality_on_next_column_is_monotone() {
    let t = table(vec![index("abc", &["a", "b", "c"])]);
    let stat = histogram_stat(&t);
    let config = CosterConfig::default();
    let filters = [
        eq("a", 1),
        and(eq("a", 1), eq("b", 2)),
        and(and(eq("a", 1), eq("b", 2)), eq("c", 3)),
    ];

    let mut last: Option<(usize, f64)> = None;
    for filter in &filters {
        let root = Flattener::new().flatten(filter).root.unwrap();
        let mut coster = IndexCoster::new(&root, &config);
        coster.cost(&root, &stat, &t.indexes[0]).unwrap();
        let best = coster.into_best().unwrap();
        let rows = histogram::row_count(&best.hist);
        if let Some((prefix, prev_rows)) = last {
            assert!(best.prefix >= prefix);
            assert!(rows <= prev_rows, "{rows} > {prev_rows}");
        }
        last = Some((best.prefix, rows));
    }
    assert_eq!(last.map(|(p, _)| p), Some(3));
}

// ============================================================================
// Three-way ties
// ============================================================================

const PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

#[test]
fn test_three_way_tie_primary_wins() {
    let t = table(vec![index("a1", &["a"]), index("PRIMARY", &["a"]), index("a0", &["a"])]);
    for order in PERMUTATIONS {
        let best = best_of(&t, &eq("a", 1), &order).unwrap();
        assert_eq!(best.index.id, "PRIMARY", "order {order:?}");
    }
}

#[test]
fn test_three_way_tie_prefix_then_lexical() {
    let t = table(vec![index("x_ba", &["b", "a"]), index("u_a", &["a"]), index("x_ab", &["a", "b"])]);
    let filter = and(eq("a", 1), eq("b", 2));
    for order in PERMUTATIONS {
        let best = best_of(&t, &filter, &order).unwrap();
        assert_eq!(best.index.id, "x_ab", "order {order:?}");
        assert_eq!(best.prefix, 2);
    }
}

#[test]
fn test_three_way_tie_strict_key_wins() {
    let schema = Arc::new(Schema::new(vec![
        Field::new("a", DataType::Int64, false),
        Field::new("b", DataType::Int64, false),
        Field::new("c", DataType::Int64, true),
    ]));
    let t = TableEntry::new("db", "t", schema)
        .with_index(index("k_a", &["a", "c"]))
        .with_index(index("u_ab", &["a", "b"]).with_unique(true))
        .with_index(index("j_ab", &["a", "b"]));
    let filter = and(eq("a", 1), eq("b", 2));
    for order in PERMUTATIONS {
        let best = best_of(&t, &filter, &order).unwrap();
        assert_eq!(best.index.id, "u_ab", "order {order:?}");
        assert!(best.fds.has_max1_row());
    }
    let covered: IdSet = best_of(&t, &filter, &[1]).unwrap().filters;
    assert_eq!(covered.len(), 2);
}
