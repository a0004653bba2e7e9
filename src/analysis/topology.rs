use crate::error::{Result, SimulationError};
use crate::store::{Edge, FormulaRole, NodeId, Registry};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, Graph, NodeIndex};
use smallvec::SmallVec;

type Parents = SmallVec<[NodeId; 4]>;

/// The evaluation orders derived from a registry. Computed once per registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Non-stateful nodes in dependency order, then every stateful node.
    pub order: Vec<NodeId>,
    /// Stateful nodes ordered so each initial formula only reads already-seeded state.
    pub init_order: Vec<NodeId>,
}

/// Links every dependency name and computes the step and initialization orders.
///
/// Same-step edges exist only between non-stateful nodes: a stock or smoother
/// publishes the state it carried into the step, so any loop through one is
/// broken in time. A loop made only of constants and auxiliaries has no such
/// break and is rejected.
pub fn resolve(registry: &Registry) -> Result<Resolution> {
    let count = registry.count();
    let mut step_parents: Vec<Parents> = vec![Parents::new(); count];
    let mut init_parents: Vec<Parents> = vec![Parents::new(); count];

    for id in registry.ids() {
        let stateful = registry.kind(id).is_stateful();
        for (role, formula) in registry.definitions[id.index()].formulas() {
            for dep in formula.dependencies() {
                let parent = registry.lookup(dep)?;
                match (stateful, role) {
                    (false, _) => {
                        init_parents[id.index()].push(parent);
                        if !registry.kind(parent).is_stateful() {
                            step_parents[id.index()].push(parent);
                        }
                    }
                    (true, FormulaRole::Initial) => init_parents[id.index()].push(parent),
                    (true, FormulaRole::Step) => {}
                }
            }
        }
    }

    let stateless = registry.ids().filter(|&id| !registry.kind(id).is_stateful());
    let mut order = sort(count, stateless, &step_parents)
        .map_err(|culprit| cycle_error(registry, &step_parents, culprit))?;
    order.extend(registry.ids().filter(|&id| registry.kind(id).is_stateful()));

    let init_order = sort(count, registry.ids(), &init_parents)
        .map_err(|culprit| cycle_error(registry, &init_parents, culprit))?
        .into_iter()
        .filter(|&id| registry.kind(id).is_stateful())
        .collect();

    Ok(Resolution { order, init_order })
}

/// Performs a Topological Sort using Depth-First Search (DFS).
///
/// Returns the node that closed a cycle on failure.
fn sort(
    count: usize,
    roots: impl Iterator<Item = NodeId>,
    parents: &[Parents],
) -> std::result::Result<Vec<NodeId>, NodeId> {
    let mut order = Vec::with_capacity(count);
    let mut state = vec![VisitState::None; count];

    for root in roots {
        if state[root.index()] == VisitState::None {
            visit(root, parents, &mut state, &mut order)?;
        }
    }

    Ok(order)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    None,
    Visiting, // Used for cycle detection
    Visited,
}

fn visit(
    node: NodeId,
    parents: &[Parents],
    state: &mut [VisitState],
    order: &mut Vec<NodeId>,
) -> std::result::Result<(), NodeId> {
    let idx = node.index();

    match state[idx] {
        VisitState::Visited => return Ok(()),
        VisitState::Visiting => return Err(node),
        VisitState::None => state[idx] = VisitState::Visiting,
    }

    for &parent in &parents[idx] {
        visit(parent, parents, state, order)?;
    }

    state[idx] = VisitState::Visited;
    order.push(node);
    Ok(())
}

/// Names every member of the strongly connected component that contains `culprit`.
fn cycle_error(registry: &Registry, parents: &[Parents], culprit: NodeId) -> SimulationError {
    let edges = parents.iter().enumerate().flat_map(|(child, ps)| {
        ps.iter().map(move |p| (p.0, child as u32))
    });
    let mut graph: DiGraph<(), ()> = DiGraph::from_edges(edges);
    // Guarantee the culprit exists even for a bare self-loop at the highest index.
    while graph.node_count() <= culprit.index() {
        graph.add_node(());
    }

    let target = NodeIndex::new(culprit.index());
    let mut members: Vec<usize> = tarjan_scc(&graph)
        .into_iter()
        .find(|component| component.contains(&target))
        .map(|component| component.into_iter().map(|n| n.index()).collect())
        .unwrap_or_else(|| vec![culprit.index()]);
    members.sort_unstable();

    SimulationError::CyclicDependency {
        nodes: members.into_iter().map(|i| registry.name(NodeId::new(i)).to_string()).collect(),
    }
}

/// Exports the full dependency graph, including edges broken through state.
///
/// Node index `i` of the returned graph is `NodeId(i)` of the registry.
pub fn dependency_graph(registry: &Registry) -> Result<Graph<String, Edge>> {
    let mut graph = Graph::with_capacity(registry.count(), 0);
    for id in registry.ids() {
        graph.add_node(registry.name(id).to_string());
    }
    for id in registry.ids() {
        let stateful = registry.kind(id).is_stateful();
        for (role, formula) in registry.definitions[id.index()].formulas() {
            let edge = match (stateful, role) {
                (false, _) => Edge::SameStep,
                (true, FormulaRole::Step) => Edge::Integrated,
                (true, FormulaRole::Initial) => Edge::Initial,
            };
            for dep in formula.dependencies() {
                let parent = registry.lookup(dep)?;
                graph.add_edge(NodeIndex::new(parent.index()), NodeIndex::new(id.index()), edge);
            }
        }
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Formula, NodeKind};

    fn sum(deps: &[&str]) -> Formula {
        Formula::new(deps, |x| x.as_slice().iter().sum())
    }

    #[test]
    fn test_sort_diamond_dependency() {
        // Shape: A -> B, A -> C, B+C -> D
        let mut reg = Registry::new();
        let d = reg.auxiliary("D", sum(&["B", "C"])).unwrap();
        let b = reg.auxiliary("B", sum(&["A"])).unwrap();
        let c = reg.auxiliary("C", sum(&["A"])).unwrap();
        let a = reg.constant("A", 1.0).unwrap();

        let res = resolve(&reg).expect("Resolve failed");

        let pos = |id: NodeId| res.order.iter().position(|&x| x == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(a) < pos(c));
        assert!(pos(b) < pos(d));
        assert!(pos(c) < pos(d));
        assert!(res.init_order.is_empty());
    }

    #[test]
    fn test_mutual_auxiliaries_are_a_cycle() {
        let mut reg = Registry::new();
        reg.constant("k", 1.0).unwrap();
        reg.auxiliary("x", sum(&["y", "k"])).unwrap();
        reg.auxiliary("y", sum(&["x"])).unwrap();

        let err = resolve(&reg).unwrap_err();
        assert_eq!(err, SimulationError::CyclicDependency { nodes: vec!["x".into(), "y".into()] });
    }

    #[test]
    fn test_self_referencing_auxiliary_is_a_cycle() {
        let mut reg = Registry::new();
        reg.auxiliary("loop", sum(&["loop"])).unwrap();
        let err = resolve(&reg).unwrap_err();
        assert_eq!(err, SimulationError::CyclicDependency { nodes: vec!["loop".into()] });
    }

    #[test]
    fn test_cycle_through_stock_is_legal() {
        // S -> outflow -> S is broken by the stock's stored value.
        let mut reg = Registry::new();
        let outflow = reg.auxiliary("outflow", Formula::new(&["S"], |x| -x[0] / 12.0)).unwrap();
        let s = reg.stock("S", Formula::identity("outflow"), Formula::constant(100.0)).unwrap();

        let res = resolve(&reg).unwrap();
        assert_eq!(res.order, vec![outflow, s]);
        assert_eq!(res.init_order, vec![s]);
    }

    #[test]
    fn test_stock_reading_itself_is_legal() {
        let mut reg = Registry::new();
        reg.constant("g", 0.01).unwrap();
        reg.stock("pop", Formula::new(&["g", "pop"], |x| x[0] * x[1]), Formula::constant(1.0)).unwrap();
        assert!(resolve(&reg).is_ok());
    }

    #[test]
    fn test_initial_values_follow_their_dependencies() {
        // `late` seeds from `early`, which is registered after it.
        let mut reg = Registry::new();
        let late = reg
            .smoother("late", Formula::identity("early"), Formula::constant(2.0), Formula::identity("early"))
            .unwrap();
        let early = reg.stock("early", Formula::constant(0.0), Formula::constant(5.0)).unwrap();

        let res = resolve(&reg).unwrap();
        assert_eq!(res.init_order, vec![early, late]);
    }

    #[test]
    fn test_initial_value_cycle_is_rejected() {
        let mut reg = Registry::new();
        reg.stock("a", Formula::constant(0.0), Formula::identity("b")).unwrap();
        reg.stock("b", Formula::constant(0.0), Formula::identity("a")).unwrap();
        let err = resolve(&reg).unwrap_err();
        assert_eq!(err, SimulationError::CyclicDependency { nodes: vec!["a".into(), "b".into()] });
    }

    #[test]
    fn test_unknown_dependency() {
        let mut reg = Registry::new();
        reg.auxiliary("x", Formula::identity("ghost")).unwrap();
        assert_eq!(resolve(&reg).unwrap_err(), SimulationError::UnknownNode("ghost".into()));
    }

    #[test]
    fn test_dependency_graph_edge_kinds() {
        let mut reg = Registry::new();
        reg.constant("seed", 1.0).unwrap();
        reg.auxiliary("flow", Formula::identity("stock")).unwrap();
        reg.stock("stock", Formula::identity("flow"), Formula::identity("seed")).unwrap();

        let graph = dependency_graph(&reg).unwrap();
        assert_eq!(graph.node_count(), 3);
        let mut kinds: Vec<(String, String, Edge)> = graph
            .edge_indices()
            .map(|e| {
                let (from, to) = graph.edge_endpoints(e).unwrap();
                (graph[from].clone(), graph[to].clone(), graph[e])
            })
            .collect();
        kinds.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(kinds, vec![
            ("flow".into(), "stock".into(), Edge::Integrated),
            ("seed".into(), "stock".into(), Edge::Initial),
            ("stock".into(), "flow".into(), Edge::SameStep),
        ]);
        assert_eq!(reg.kind(NodeId::new(2)), NodeKind::Stock);
    }
}
