// Copyright 2026 Wireflow contributors

//! Fan-out input expansion.
//!
//! A map specification names the inputs to iterate over; their values must
//! be arrays. Expansion turns one input map into an ordered list of
//! per-iteration input maps, combining several mapped inputs either
//! pairwise (zip) or as a cross product. Non-mapped inputs are carried
//! unchanged into every iteration.

use crate::error::{Error, Result};
use crate::node::{MapMode, MapSpec};
use crate::value::{Value, ValueMap};

/// Expand `inputs` into one map per iteration, in iteration order.
///
/// Product mode varies the last mapped input fastest. Empty arrays are
/// legal and produce zero iterations.
pub(crate) fn combinations(inputs: &ValueMap, spec: &MapSpec) -> Result<Vec<ValueMap>> {
    let mut arrays: Vec<(&str, &[Value])> = Vec::with_capacity(spec.names.len());
    for name in &spec.names {
        let value = inputs.get(name).ok_or_else(|| Error::MissingInput {
            input: name.clone(),
        })?;
        match value {
            Value::Array(items) => arrays.push((name, items)),
            _ => {
                return Err(Error::NotIterable {
                    input: name.clone(),
                })
            }
        }
    }

    let base: ValueMap = inputs
        .iter()
        .filter(|(name, _)| !spec.names.iter().any(|n| n == *name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    match spec.mode {
        MapMode::Zip => {
            let expected = arrays.first().map_or(0, |(_, items)| items.len());
            for (name, items) in &arrays {
                if items.len() != expected {
                    return Err(Error::ZipLengthMismatch {
                        input: (*name).to_string(),
                        got: items.len(),
                        expected,
                    });
                }
            }
            Ok((0..expected)
                .map(|i| {
                    let mut combo = base.clone();
                    for (name, items) in &arrays {
                        combo.insert((*name).to_string(), items[i].clone());
                    }
                    combo
                })
                .collect())
        }
        MapMode::Product => {
            let mut combos = vec![base];
            for (name, items) in &arrays {
                let mut next = Vec::with_capacity(combos.len() * items.len());
                for combo in &combos {
                    for item in *items {
                        let mut expanded = combo.clone();
                        expanded.insert((*name).to_string(), item.clone());
                        next.push(expanded);
                    }
                }
                combos = next;
            }
            Ok(combos)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(names: &[&str], mode: MapMode) -> MapSpec {
        MapSpec {
            names: names.iter().map(|n| (*n).to_string()).collect(),
            mode,
        }
    }

    fn inputs(pairs: &[(&str, Value)]) -> ValueMap {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn zip_pairs_elements_and_carries_constants() {
        let combos = combinations(
            &inputs(&[("a", json!([1, 2])), ("b", json!(["x", "y"])), ("k", json!(true))]),
            &spec(&["a", "b"], MapMode::Zip),
        )
        .unwrap();
        assert_eq!(combos.len(), 2);
        assert_eq!(combos[0]["a"], json!(1));
        assert_eq!(combos[0]["b"], json!("x"));
        assert_eq!(combos[0]["k"], json!(true));
        assert_eq!(combos[1]["a"], json!(2));
        assert_eq!(combos[1]["b"], json!("y"));
    }

    #[test]
    fn zip_rejects_uneven_lengths() {
        let err = combinations(
            &inputs(&[("a", json!([1, 2])), ("b", json!(["x"]))]),
            &spec(&["a", "b"], MapMode::Zip),
        )
        .unwrap_err();
        match err {
            Error::ZipLengthMismatch { input, got, expected } => {
                assert_eq!(input, "b");
                assert_eq!(got, 1);
                assert_eq!(expected, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn product_crosses_all_elements_in_order() {
        let combos = combinations(
            &inputs(&[("a", json!([1, 2])), ("b", json!(["x", "y"]))]),
            &spec(&["a", "b"], MapMode::Product),
        )
        .unwrap();
        let pairs: Vec<(Value, Value)> = combos
            .iter()
            .map(|c| (c["a"].clone(), c["b"].clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (json!(1), json!("x")),
                (json!(1), json!("y")),
                (json!(2), json!("x")),
                (json!(2), json!("y")),
            ]
        );
    }

    #[test]
    fn non_array_input_is_rejected() {
        let err = combinations(
            &inputs(&[("a", json!(7))]),
            &spec(&["a"], MapMode::Zip),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotIterable { .. }));
    }

    #[test]
    fn empty_arrays_yield_zero_iterations() {
        let combos = combinations(
            &inputs(&[("a", json!([]))]),
            &spec(&["a"], MapMode::Zip),
        )
        .unwrap();
        assert!(combos.is_empty());

        let combos = combinations(
            &inputs(&[("a", json!([])), ("b", json!([1]))]),
            &spec(&["a", "b"], MapMode::Product),
        )
        .unwrap();
        assert!(combos.is_empty());
    }
}
