//! End-to-end solve of the routing sample model.
use float_cmp::assert_approx_eq;
use mathprog::instance;
use mathprog::model::Model;
use mathprog::solver::{Budget, SolveStatus, Solution, solve};
use std::collections::HashMap;
use std::fs;

fn solve_sample() -> Solution {
    let model_src = fs::read_to_string("models/tsp.mod").unwrap();
    let data_src = fs::read_to_string("models/tsp.dat").unwrap();
    let model = Model::from_text_with_data(&model_src, &data_src).unwrap();
    let instance = instance::build(&model).unwrap();
    solve(&instance, &Budget::default()).unwrap()
}

#[test]
fn test_symmetric_three_node_tour() {
    let solution = solve_sample();
    assert_eq!(solution.status, SolveStatus::Optimal);

    // All off-diagonal distances are 10, so any tour over three nodes costs 30
    assert_approx_eq!(f64, solution.objective.unwrap(), 30.0);

    let values: HashMap<String, f64> = solution
        .values
        .iter()
        .map(|(key, value)| (key.to_string(), *value))
        .collect();

    // Exactly one arc out of and one arc into every node
    for node in 1..=3 {
        let out: f64 = (1..=3)
            .filter(|other| *other != node)
            .map(|other| values[&format!("x[{node},{other}]")])
            .sum();
        let into: f64 = (1..=3)
            .filter(|other| *other != node)
            .map(|other| values[&format!("x[{other},{node}]")])
            .sum();
        assert_approx_eq!(f64, out, 1.0);
        assert_approx_eq!(f64, into, 1.0);
    }
}

#[test]
fn test_diagonal_arcs_are_never_created() {
    let model_src = fs::read_to_string("models/tsp.mod").unwrap();
    let data_src = fs::read_to_string("models/tsp.dat").unwrap();
    let model = Model::from_text_with_data(&model_src, &data_src).unwrap();
    let instance = instance::build(&model).unwrap();

    // The i <> j filter removes the diagonal: 6 arcs and 6 flows for 3 nodes
    let arcs = instance
        .columns
        .iter()
        .filter(|c| &*c.key.name == "x")
        .count();
    assert_eq!(arcs, 6);
    assert!(
        !instance
            .columns
            .iter()
            .any(|c| c.key.to_string() == "x[1,1]")
    );
}
