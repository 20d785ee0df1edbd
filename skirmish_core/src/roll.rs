// Weighted roll resolution — stat value to concrete outcome.
//
// A stat definition may carry a per-level weighted table: for each stat
// value ("level"), a list of candidate outcomes with relative weights.
// Resolving a roll picks among the candidates with probability proportional
// to weight. Three degenerate cases matter:
// - no table entry for the level: the raw stat value is the outcome;
// - all entries at the level have weight <= 0: same as no entry;
// - exactly one usable entry: its value is returned deterministically.
//
// The last case doubles as "lookup mode": a stat flagged `lookup` uses its
// table as a fixed value transform applied once at entity creation, rather
// than a per-use roll. See `apply_lookup`.
//
// **Critical constraint: determinism.** All selection randomness comes from
// the caller's `GameRng` — given the same rng state, the same outcome.

use crate::data::StatDef;
use crate::prng::GameRng;

/// Resolve a stat value to a concrete outcome via the stat's weighted table.
///
/// Returns the raw `value` unchanged when the table has no usable entries
/// for that level.
pub fn resolve(value: i64, def: &StatDef, rng: &mut GameRng) -> i64 {
    let Some(entries) = def.weighted.get(&value) else {
        return value;
    };
    // Entries with non-positive weight are excluded from selection.
    let usable: Vec<_> = entries.iter().filter(|e| e.weight > 0).collect();
    match usable.len() {
        0 => value,
        1 => usable[0].value,
        _ => {
            let weights: Vec<u64> = usable.iter().map(|e| e.weight as u64).collect();
            usable[rng.weighted_index(&weights)].value
        }
    }
}

/// Apply a lookup-mode transform: for stats flagged `lookup`, the table maps
/// the authored value to its converted value once, at entity-creation time.
///
/// Non-lookup stats and unmapped levels pass through unchanged. Lookup
/// tables are expected to hold a single usable entry per level; if an editor
/// exported several, the heaviest entry wins (deterministically, no roll).
pub fn apply_lookup(value: i64, def: &StatDef) -> i64 {
    if !def.lookup {
        return value;
    }
    def.weighted
        .get(&value)
        .and_then(|entries| entries.iter().filter(|e| e.weight > 0).max_by_key(|e| e.weight))
        .map_or(value, |e| e.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::WeightedValue;

    fn def_with_table(table: &[(i64, Vec<WeightedValue>)]) -> StatDef {
        let mut def = StatDef::plain("attack", "Attack", 0, 20, 5);
        for (level, entries) in table {
            def.weighted.insert(*level, entries.clone());
        }
        def
    }

    fn wv(value: i64, weight: i64) -> WeightedValue {
        WeightedValue { value, weight }
    }

    #[test]
    fn unmapped_level_returns_raw_value() {
        let def = def_with_table(&[]);
        let mut rng = GameRng::new(1);
        assert_eq!(resolve(7, &def, &mut rng), 7);
    }

    #[test]
    fn single_entry_is_deterministic() {
        let def = def_with_table(&[(3, vec![wv(10, 1)])]);
        let mut rng = GameRng::new(1);
        for _ in 0..100 {
            assert_eq!(resolve(3, &def, &mut rng), 10);
        }
    }

    #[test]
    fn non_positive_weights_excluded() {
        let def = def_with_table(&[(3, vec![wv(10, 0), wv(20, -5), wv(30, 2)])]);
        let mut rng = GameRng::new(1);
        for _ in 0..1000 {
            assert_eq!(resolve(3, &def, &mut rng), 30);
        }
    }

    #[test]
    fn all_non_positive_weights_fall_back_to_raw() {
        let def = def_with_table(&[(3, vec![wv(10, 0), wv(20, -1)])]);
        let mut rng = GameRng::new(1);
        assert_eq!(resolve(3, &def, &mut rng), 3);
    }

    #[test]
    fn observed_frequency_converges_to_weights() {
        // Weights [1, 3]: value 100 ~25%, value 200 ~75%.
        let def = def_with_table(&[(5, vec![wv(100, 1), wv(200, 3)])]);
        let mut rng = GameRng::new(42);
        let n = 100_000;
        let mut hits_200 = 0u32;
        for _ in 0..n {
            match resolve(5, &def, &mut rng) {
                200 => hits_200 += 1,
                100 => {}
                other => panic!("unexpected outcome {other}"),
            }
        }
        let pct = f64::from(hits_200) / f64::from(n);
        assert!(
            (0.73..0.77).contains(&pct),
            "expected ~75% for weight 3/4, got {:.1}%",
            pct * 100.0
        );
    }

    #[test]
    fn lookup_transforms_at_creation_values() {
        let mut def = def_with_table(&[(1, vec![wv(15, 1)]), (2, vec![wv(25, 1)])]);
        def.lookup = true;
        assert_eq!(apply_lookup(1, &def), 15);
        assert_eq!(apply_lookup(2, &def), 25);
        // Unmapped level passes through.
        assert_eq!(apply_lookup(9, &def), 9);
    }

    #[test]
    fn lookup_ignored_for_non_lookup_stats() {
        let def = def_with_table(&[(1, vec![wv(15, 1)])]);
        assert_eq!(apply_lookup(1, &def), 1);
    }
}
