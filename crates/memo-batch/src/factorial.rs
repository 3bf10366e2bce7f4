use indexmap::IndexMap;
use memo_core::{Param, ParameterSet};

/// Per-parameter value lists for a full factorial design, in declaration order.
pub type Factors = IndexMap<String, Vec<Param>>;

/// Expands factors into their Cartesian product.
///
/// The first factor varies slowest and the last varies fastest, so
/// `{A: [1, 2], B: [10, 20]}` yields `A1B10, A1B20, A2B10, A2B20`. No factors
/// yields a single empty set; any empty value list yields nothing.
pub fn expand_factors(factors: &Factors) -> Vec<ParameterSet> {
    let levels: Vec<(&String, &Vec<Param>)> = factors.iter().collect();
    let mut outputs = Vec::with_capacity(levels.iter().map(|(_, values)| values.len()).product());
    expand_grid(&levels, 0, ParameterSet::new(), &mut outputs);
    outputs
}

fn expand_grid(
    levels: &[(&String, &Vec<Param>)],
    idx: usize,
    current: ParameterSet,
    outputs: &mut Vec<ParameterSet>,
) {
    if idx == levels.len() {
        outputs.push(current);
        return;
    }
    let (name, values) = levels[idx];
    for value in values {
        let mut next = current.clone();
        next.insert(name.clone(), value.clone());
        expand_grid(levels, idx + 1, next, outputs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factors(pairs: Vec<(&str, Vec<Param>)>) -> Factors {
        pairs
            .into_iter()
            .map(|(name, values)| (name.to_string(), values))
            .collect()
    }

    #[test]
    fn rightmost_factor_varies_fastest() {
        let expanded = expand_factors(&factors(vec![
            ("A", vec![Param::from(1), Param::from(2)]),
            ("B", vec![Param::from(10), Param::from(20)]),
        ]));
        let pairs: Vec<(i64, i64)> = expanded
            .iter()
            .map(|set| {
                (
                    set["A"].as_i64().expect("A"),
                    set["B"].as_i64().expect("B"),
                )
            })
            .collect();
        assert_eq!(pairs, [(1, 10), (1, 20), (2, 10), (2, 20)]);
    }

    #[test]
    fn no_factors_yield_one_empty_set() {
        let expanded = expand_factors(&Factors::new());
        assert_eq!(expanded.len(), 1);
        assert!(expanded[0].is_empty());
    }

    #[test]
    fn empty_level_yields_nothing() {
        let expanded = expand_factors(&factors(vec![
            ("A", vec![Param::from(1)]),
            ("B", Vec::new()),
        ]));
        assert!(expanded.is_empty());
    }
}
