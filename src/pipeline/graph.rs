//! Stage dependency graph
//!
//! Builds the static graph of [`PipelineStage::dependencies`] and checks the
//! two properties the executor relies on: the declared stage order is a
//! topological order, and a stage selection carries its own dependencies.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use petgraph::{Directed, Graph};

use super::config::PipelineStage;

/// Dependency graph; edges point from a dependency to its dependent
pub fn stage_graph() -> (Graph<PipelineStage, (), Directed>, HashMap<PipelineStage, NodeIndex>) {
    let mut graph = Graph::<PipelineStage, (), Directed>::new();
    let nodes: HashMap<_, _> = PipelineStage::all()
        .into_iter()
        .map(|stage| (stage, graph.add_node(stage)))
        .collect();

    for stage in PipelineStage::all() {
        for dependency in stage.dependencies() {
            graph.add_edge(nodes[dependency], nodes[&stage], ());
        }
    }
    (graph, nodes)
}

/// Check that the declared order of [`PipelineStage::all`] is a
/// topological order of the dependency graph
pub fn validate_declared_order() -> Result<(), String> {
    let (graph, _) = stage_graph();
    toposort(&graph, None).map_err(|cycle| {
        format!(
            "Stage dependencies contain a cycle through '{}'",
            graph[cycle.node_id()]
        )
    })?;

    let order = PipelineStage::all();
    for (position, stage) in order.iter().enumerate() {
        for dependency in stage.dependencies() {
            let declared = order.iter().position(|s| s == dependency);
            if declared.is_none_or(|d| d >= position) {
                return Err(format!(
                    "Stage '{stage}' is declared before its dependency '{dependency}'"
                ));
            }
        }
    }
    Ok(())
}

/// Check that every dependency of a selected stage is selected too
pub fn validate_selection(stages: &[PipelineStage]) -> Result<(), String> {
    validate_declared_order()?;

    let missing: Vec<String> = stages
        .iter()
        .flat_map(|stage| {
            stage
                .dependencies()
                .iter()
                .filter(|d| !stages.contains(d))
                .map(move |d| format!("'{stage}' requires '{d}'"))
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "Stage selection is missing dependencies: {}",
            missing.join(", ")
        ))
    }
}
