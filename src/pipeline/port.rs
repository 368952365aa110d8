//! Port descriptors for the node system.
//!
//! Each node declares its ports (inputs/outputs) via static `PortDescriptor` arrays.
//! The loader uses these to validate edge endpoints before a graph starts.

/// Port used when an edge source omits the port name.
pub const DEFAULT_OUTPUT: &str = "out";

/// Port used when an edge target omits the port name.
pub const DEFAULT_INPUT: &str = "in";

/// How a descriptor matches port names used in edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// Exactly this name.
    Fixed,
    /// Any name starting with this prefix (e.g. `in_` accepts `in_left`).
    Dynamic,
}

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Static descriptor for a node's port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub direction: PortDirection,
    pub kind: PortKind,
}

impl PortDescriptor {
    pub const fn input(name: &'static str) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            kind: PortKind::Fixed,
        }
    }

    pub const fn output(name: &'static str) -> Self {
        Self {
            name,
            direction: PortDirection::Output,
            kind: PortKind::Fixed,
        }
    }

    pub const fn dynamic_input(prefix: &'static str) -> Self {
        Self {
            name: prefix,
            direction: PortDirection::Input,
            kind: PortKind::Dynamic,
        }
    }

    pub const fn dynamic_output(prefix: &'static str) -> Self {
        Self {
            name: prefix,
            direction: PortDirection::Output,
            kind: PortKind::Dynamic,
        }
    }

    /// Whether an edge may attach to `port` through this descriptor.
    pub fn accepts(&self, direction: PortDirection, port: &str) -> bool {
        if self.direction != direction {
            return false;
        }
        match self.kind {
            PortKind::Fixed => self.name == port,
            PortKind::Dynamic => port.len() > self.name.len() && port.starts_with(self.name),
        }
    }
}

/// Whether any descriptor in `ports` accepts the named port.
pub fn exposes(ports: &[PortDescriptor], direction: PortDirection, port: &str) -> bool {
    ports.iter().any(|p| p.accepts(direction, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    static PORTS: &[PortDescriptor] = &[
        PortDescriptor::input("in"),
        PortDescriptor::dynamic_input("in_"),
        PortDescriptor::output("out"),
    ];

    #[test]
    fn test_fixed_ports() {
        assert!(exposes(PORTS, PortDirection::Input, "in"));
        assert!(exposes(PORTS, PortDirection::Output, "out"));
        assert!(!exposes(PORTS, PortDirection::Input, "out"));
        assert!(!exposes(PORTS, PortDirection::Output, "in"));
    }

    #[test]
    fn test_dynamic_ports() {
        assert!(exposes(PORTS, PortDirection::Input, "in_left"));
        assert!(!exposes(PORTS, PortDirection::Input, "in_"));
        assert!(!exposes(PORTS, PortDirection::Output, "out_left"));
    }
}
