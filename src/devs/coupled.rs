//! Coupled model composition.
//!
//! A coupled model is a set of named children plus a coupling relation; it
//! has no transitions of its own. Couplings connect a child output to a child
//! input (internal coupling), a parent input to a child input (external input
//! coupling), or a child output to a parent output (external output
//! coupling).
//!
//! Before a run, the hierarchy is flattened: every atomic model gets a
//! path-joined name (`node0.raft.controller`) and every coupling chain is
//! resolved to a direct atomic-to-atomic route, so the coordinator never
//! walks the tree at event time. All identity and peer data is handed to the
//! children at construction; nothing reaches into a child after wiring.

use std::collections::BTreeMap;

use crate::error::SimulationError;

/// A child of a coupled model.
pub enum Component<M> {
    /// A leaf state machine.
    Atomic(M),
    /// A nested coupled model.
    Coupled(Coupled<M>),
}

enum Endpoint {
    Child { child: String, port: String },
    Parent { port: String },
}

struct Coupling {
    from: Endpoint,
    to: Endpoint,
}

/// A container of children and the couplings between them.
pub struct Coupled<M> {
    children: Vec<(String, Component<M>)>,
    couplings: Vec<Coupling>,
}

/// The flattened form of a coupled model: atomic children with path names,
/// direct routes between them, and the mapping of any parent-facing ports.
pub(crate) struct Flattened<M> {
    pub atomics: Vec<(String, M)>,
    pub routes: Vec<((usize, String), (usize, String))>,
    /// Parent-facing input port -> atomic input ports it feeds.
    pub inputs: BTreeMap<String, Vec<(usize, String)>>,
    /// Parent-facing output port -> atomic output ports feeding it.
    pub outputs: BTreeMap<String, Vec<(usize, String)>>,
}

enum ChildPorts {
    /// Atomic child at the given index: any port name maps to itself.
    Atomic(usize),
    /// Coupled child: only its declared parent-facing ports are reachable.
    Coupled {
        inputs: BTreeMap<String, Vec<(usize, String)>>,
        outputs: BTreeMap<String, Vec<(usize, String)>>,
    },
}

impl<M> Coupled<M> {
    /// Creates an empty coupled model.
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            couplings: Vec::new(),
        }
    }

    /// Adds an atomic child under the given name.
    pub fn add_atomic(&mut self, name: &str, model: M) {
        self.children
            .push((name.to_string(), Component::Atomic(model)));
    }

    /// Adds a coupled child under the given name.
    pub fn add_coupled(&mut self, name: &str, child: Coupled<M>) {
        self.children
            .push((name.to_string(), Component::Coupled(child)));
    }

    /// Internal coupling: child output port to child input port.
    pub fn couple(&mut self, from_child: &str, from_port: &str, to_child: &str, to_port: &str) {
        self.couplings.push(Coupling {
            from: Endpoint::Child {
                child: from_child.to_string(),
                port: from_port.to_string(),
            },
            to: Endpoint::Child {
                child: to_child.to_string(),
                port: to_port.to_string(),
            },
        });
    }

    /// External input coupling: parent input port to child input port.
    pub fn couple_input(&mut self, port: &str, to_child: &str, to_port: &str) {
        self.couplings.push(Coupling {
            from: Endpoint::Parent {
                port: port.to_string(),
            },
            to: Endpoint::Child {
                child: to_child.to_string(),
                port: to_port.to_string(),
            },
        });
    }

    /// External output coupling: child output port to parent output port.
    pub fn couple_output(&mut self, from_child: &str, from_port: &str, port: &str) {
        self.couplings.push(Coupling {
            from: Endpoint::Child {
                child: from_child.to_string(),
                port: from_port.to_string(),
            },
            to: Endpoint::Parent {
                port: port.to_string(),
            },
        });
    }

    pub(crate) fn flatten(self, prefix: &str) -> Result<Flattened<M>, SimulationError> {
        let mut flattened = Flattened {
            atomics: Vec::new(),
            routes: Vec::new(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        };
        let mut child_ports: BTreeMap<String, ChildPorts> = BTreeMap::new();

        for (name, component) in self.children {
            let path = join_path(prefix, &name);
            match component {
                Component::Atomic(model) => {
                    let index = flattened.atomics.len();
                    flattened.atomics.push((path, model));
                    child_ports.insert(name, ChildPorts::Atomic(index));
                }
                Component::Coupled(coupled) => {
                    let offset = flattened.atomics.len();
                    let child = coupled.flatten(&path)?;
                    flattened.atomics.extend(child.atomics);
                    flattened.routes.extend(
                        child
                            .routes
                            .into_iter()
                            .map(|(from, to)| (offset_endpoint(from, offset), offset_endpoint(to, offset))),
                    );
                    child_ports.insert(
                        name,
                        ChildPorts::Coupled {
                            inputs: offset_port_map(child.inputs, offset),
                            outputs: offset_port_map(child.outputs, offset),
                        },
                    );
                }
            }
        }

        for coupling in self.couplings {
            match (coupling.from, coupling.to) {
                (Endpoint::Child { child: a, port: ap }, Endpoint::Child { child: b, port: bp }) => {
                    let sources = resolve_outputs(&child_ports, &a, &ap)?;
                    let targets = resolve_inputs(&child_ports, &b, &bp)?;
                    for source in &sources {
                        for target in &targets {
                            flattened.routes.push((source.clone(), target.clone()));
                        }
                    }
                }
                (Endpoint::Parent { port }, Endpoint::Child { child, port: cp }) => {
                    let targets = resolve_inputs(&child_ports, &child, &cp)?;
                    flattened.inputs.entry(port).or_default().extend(targets);
                }
                (Endpoint::Child { child, port: cp }, Endpoint::Parent { port }) => {
                    let sources = resolve_outputs(&child_ports, &child, &cp)?;
                    flattened.outputs.entry(port).or_default().extend(sources);
                }
                (Endpoint::Parent { port }, Endpoint::Parent { .. }) => {
                    return Err(SimulationError::DanglingCoupling {
                        endpoint: join_path(prefix, &port),
                    });
                }
            }
        }

        Ok(flattened)
    }
}

impl<M> Default for Coupled<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn offset_endpoint((index, port): (usize, String), offset: usize) -> (usize, String) {
    (index + offset, port)
}

fn offset_port_map(
    map: BTreeMap<String, Vec<(usize, String)>>,
    offset: usize,
) -> BTreeMap<String, Vec<(usize, String)>> {
    map.into_iter()
        .map(|(port, endpoints)| {
            let endpoints = endpoints
                .into_iter()
                .map(|endpoint| offset_endpoint(endpoint, offset))
                .collect();
            (port, endpoints)
        })
        .collect()
}

fn resolve_inputs(
    children: &BTreeMap<String, ChildPorts>,
    child: &str,
    port: &str,
) -> Result<Vec<(usize, String)>, SimulationError> {
    match children.get(child) {
        None => Err(SimulationError::UnknownComponent {
            name: child.to_string(),
        }),
        Some(ChildPorts::Atomic(index)) => Ok(vec![(*index, port.to_string())]),
        Some(ChildPorts::Coupled { inputs, .. }) => {
            inputs
                .get(port)
                .cloned()
                .ok_or_else(|| SimulationError::DanglingCoupling {
                    endpoint: format!("{}.{}", child, port),
                })
        }
    }
}

fn resolve_outputs(
    children: &BTreeMap<String, ChildPorts>,
    child: &str,
    port: &str,
) -> Result<Vec<(usize, String)>, SimulationError> {
    match children.get(child) {
        None => Err(SimulationError::UnknownComponent {
            name: child.to_string(),
        }),
        Some(ChildPorts::Atomic(index)) => Ok(vec![(*index, port.to_string())]),
        Some(ChildPorts::Coupled { outputs, .. }) => {
            outputs
                .get(port)
                .cloned()
                .ok_or_else(|| SimulationError::DanglingCoupling {
                    endpoint: format!("{}.{}", child, port),
                })
        }
    }
}
