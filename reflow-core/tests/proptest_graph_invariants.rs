//! Property-based invariant tests for the reactive runtime.
//!
//! Random graphs of sources and derived cells are driven with random
//! sequences of writes and reads. Every derived cell reads a gate source
//! first and then, depending on the gate's parity, all or half of its
//! inputs, so dependencies change as values do.
//!
//! 1. Every read returns the value a from-scratch recomputation gives.
//! 2. Writes alone never run a compute function.
//! 3. A second read of the same cell runs nothing.
//! 4. A cell's recorded dependencies are exactly what its last run read.
//! 5. Edges are recorded on both endpoints at all times.
//! 6. A clean cell only depends on clean cells.

use proptest::prelude::*;
use reflow_core::{CellKey, Runtime};

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct DerivedSpec {
    gate: usize,
    inputs: Vec<usize>,
}

impl DerivedSpec {
    /// Indices read for the given cell values, in read order.
    fn reads(&self, values: &[i64]) -> Vec<usize> {
        let take = if values[self.gate] % 2 == 0 {
            self.inputs.len()
        } else {
            self.inputs.len().div_ceil(2)
        };
        std::iter::once(self.gate)
            .chain(self.inputs[..take].iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Op {
    Write(usize, i64),
    Read(usize),
}

/// Sources count plus one spec per derived cell. Derived cell `j` sits at
/// index `sources + j` and only reads cells with smaller indices.
fn graph_shape() -> impl Strategy<Value = (usize, Vec<DerivedSpec>)> {
    (1usize..5).prop_flat_map(|sources| {
        let derived = (0usize..12).prop_flat_map(move |count| {
            (0..count)
                .map(|j| {
                    (
                        0..sources,
                        proptest::collection::vec(0..sources + j, 1..4),
                    )
                        .prop_map(|(gate, inputs)| DerivedSpec { gate, inputs })
                })
                .collect::<Vec<_>>()
        });
        (Just(sources), derived)
    })
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<usize>(), -50i64..50).prop_map(|(s, v)| Op::Write(s, v)),
        any::<usize>().prop_map(Op::Read),
    ]
}

struct Fixture {
    rt: Runtime<i64>,
    keys: Vec<CellKey>,
    sources: Vec<i64>,
    specs: Vec<DerivedSpec>,
}

impl Fixture {
    fn build(sources: usize, specs: Vec<DerivedSpec>) -> Self {
        let mut rt = Runtime::new();
        let mut keys: Vec<CellKey> = (0..sources).map(|_| rt.create_source(0)).collect();

        for spec in &specs {
            let gate = keys[spec.gate];
            let inputs: Vec<CellKey> = spec.inputs.iter().map(|&i| keys[i]).collect();
            let key = rt.create_derived(move |cx| {
                let gate_value = cx.read(gate)?;
                let take = if gate_value % 2 == 0 {
                    inputs.len()
                } else {
                    inputs.len().div_ceil(2)
                };
                let mut sum: i64 = gate_value;
                for &input in &inputs[..take] {
                    sum = sum.wrapping_add(cx.read(input)?);
                }
                Ok(sum)
            });
            keys.push(key);
        }

        Self {
            rt,
            keys,
            sources: vec![0; sources],
            specs,
        }
    }

    /// Every cell's value computed from scratch.
    fn model(&self) -> Vec<i64> {
        let mut values = self.sources.clone();
        for spec in &self.specs {
            let reads = spec.reads(&values);
            let sum = reads[1..]
                .iter()
                .fold(values[reads[0]], |acc, &i| acc.wrapping_add(values[i]));
            values.push(sum);
        }
        values
    }

    fn expected_dependencies(&self, index: usize) -> Vec<CellKey> {
        let values = self.model();
        let mut deps: Vec<CellKey> = self.specs[index - self.sources.len()]
            .reads(&values)
            .into_iter()
            .map(|i| self.keys[i])
            .collect();
        deps.sort();
        deps.dedup();
        deps
    }

    fn clean_cells_have_clean_dependencies(&self) -> bool {
        self.keys.iter().all(|&key| {
            self.rt.is_dirty(key) == Some(true)
                || self
                    .rt
                    .dependencies(key)
                    .iter()
                    .all(|&dep| self.rt.is_dirty(dep) == Some(false))
        })
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Reads agree with recomputation, writes stay lazy
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn reads_match_recomputation(
        (sources, specs) in graph_shape(),
        ops in proptest::collection::vec(op(), 1..40),
    ) {
        let mut fx = Fixture::build(sources, specs);

        for op in ops {
            match op {
                Op::Write(s, value) => {
                    let s = s % sources;
                    let before = fx.rt.evaluation_count();
                    fx.rt.write(fx.keys[s], value).unwrap();
                    fx.sources[s] = value;
                    prop_assert_eq!(fx.rt.evaluation_count(), before,
                        "write to source {} ran a compute function", s);
                }
                Op::Read(c) => {
                    let c = c % fx.keys.len();
                    let key = fx.keys[c];
                    let value = fx.rt.read(key).unwrap();
                    prop_assert_eq!(value, fx.model()[c], "cell {} disagrees", c);
                    prop_assert_eq!(fx.rt.is_dirty(key), Some(false));

                    let before = fx.rt.evaluation_count();
                    prop_assert_eq!(fx.rt.read(key).unwrap(), value);
                    prop_assert_eq!(fx.rt.evaluation_count(), before,
                        "second read of cell {} recomputed", c);
                }
            }
            prop_assert!(fx.rt.graph().is_consistent());
            prop_assert!(fx.clean_cells_have_clean_dependencies());
        }
    }

    #[test]
    fn dependencies_track_the_last_run(
        (sources, specs) in graph_shape(),
        writes in proptest::collection::vec((any::<usize>(), -50i64..50), 0..20),
    ) {
        let mut fx = Fixture::build(sources, specs);

        for (s, value) in writes {
            let s = s % sources;
            fx.rt.write(fx.keys[s], value).unwrap();
            fx.sources[s] = value;

            for index in sources..fx.keys.len() {
                let key = fx.keys[index];
                fx.rt.read(key).unwrap();

                let mut actual = fx.rt.dependencies(key);
                actual.sort();
                prop_assert_eq!(actual, fx.expected_dependencies(index),
                    "cell {} has stale edges", index);
            }
        }
        prop_assert!(fx.rt.graph().is_consistent());
    }

    /// Reading every derived cell once evaluates each exactly once, no
    /// matter how many paths lead to it.
    #[test]
    fn each_cell_evaluates_once_per_write(
        (sources, specs) in graph_shape(),
        s in any::<usize>(),
        value in -50i64..50,
    ) {
        let mut fx = Fixture::build(sources, specs);
        let derived = fx.keys.len() - sources;

        for &key in &fx.keys[sources..] {
            fx.rt.read(key).unwrap();
        }
        prop_assert_eq!(fx.rt.evaluation_count(), derived as u64);

        let s = s % sources;
        fx.rt.write(fx.keys[s], value).unwrap();
        let dirty = fx.keys[sources..]
            .iter()
            .filter(|&&key| fx.rt.is_dirty(key) == Some(true))
            .count();

        for &key in fx.keys[sources..].iter().rev() {
            fx.rt.read(key).unwrap();
        }
        prop_assert_eq!(fx.rt.evaluation_count(), (derived + dirty) as u64);
    }
}
