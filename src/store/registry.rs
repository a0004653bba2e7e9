use super::types::*;
use crate::error::{Result, SimulationError};
use std::collections::HashMap;

/// Columnar store of every node definition.
///
/// Built once at load time and treated as read-only afterwards. Dependencies are
/// recorded by name so nodes may be registered in any order; names are linked to
/// ids by the resolver.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    // Columnar Arrays
    pub kinds: Vec<NodeKind>,
    pub meta: Vec<NodeMetadata>,
    pub definitions: Vec<Definition>,

    names: HashMap<String, NodeId>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.kinds.len() }

    pub fn register(&mut self, name: &str, definition: Definition) -> Result<NodeId> {
        self.register_with_meta(NodeMetadata { name: name.to_string(), ..Default::default() }, definition)
    }

    pub fn register_with_meta(&mut self, meta: NodeMetadata, definition: Definition) -> Result<NodeId> {
        if self.names.contains_key(&meta.name) {
            return Err(SimulationError::DuplicateNode(meta.name));
        }
        if meta.name.trim().is_empty() {
            return Err(SimulationError::invalid_kind(meta.name, "node names must not be blank"));
        }

        let id = NodeId::new(self.kinds.len());
        self.names.insert(meta.name.clone(), id);
        self.kinds.push(definition.kind());
        self.definitions.push(definition);
        self.meta.push(meta);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Result<NodeId> {
        self.names.get(name).copied().ok_or_else(|| SimulationError::UnknownNode(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool { self.names.contains_key(name) }

    #[inline(always)]
    pub fn name(&self, id: NodeId) -> &str { &self.meta[id.index()].name }

    #[inline(always)]
    pub fn kind(&self, id: NodeId) -> NodeKind { self.kinds[id.index()] }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.count()).map(NodeId::new)
    }

    // --- Builders ---

    pub fn constant(&mut self, name: &str, value: f64) -> Result<NodeId> {
        self.register(name, Definition::Constant { value, overridable: true })
    }

    /// A constant that rejects run-time overrides.
    pub fn locked_constant(&mut self, name: &str, value: f64) -> Result<NodeId> {
        self.register(name, Definition::Constant { value, overridable: false })
    }

    pub fn auxiliary(&mut self, name: &str, formula: Formula) -> Result<NodeId> {
        self.register(name, Definition::Auxiliary { formula })
    }

    pub fn stock(&mut self, name: &str, rate: Formula, initial: Formula) -> Result<NodeId> {
        self.register(name, Definition::Stock { rate, initial })
    }

    pub fn smoother(&mut self, name: &str, target: Formula, tau: Formula, initial: Formula) -> Result<NodeId> {
        self.register(name, Definition::Smoother { target, tau, initial })
    }

    /// Attaches an informational unit to an existing node.
    pub fn set_unit(&mut self, name: &str, unit: &str) -> Result<()> {
        let id = self.lookup(name)?;
        self.meta[id.index()].unit = Some(Unit(unit.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut reg = Registry::new();
        let a = reg.constant("a", 1.0).unwrap();
        let b = reg.auxiliary("b", Formula::identity("a")).unwrap();
        assert_eq!(reg.lookup("a").unwrap(), a);
        assert_eq!(reg.lookup("b").unwrap(), b);
        assert_eq!(reg.kind(b), NodeKind::Auxiliary);
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut reg = Registry::new();
        reg.constant("tax", 0.0).unwrap();
        let err = reg.stock("tax", Formula::constant(1.0), Formula::constant(0.0)).unwrap_err();
        assert_eq!(err, SimulationError::DuplicateNode("tax".into()));
        // The failed registration leaves the registry untouched.
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_unknown_lookup() {
        let reg = Registry::new();
        assert_eq!(reg.lookup("missing").unwrap_err(), SimulationError::UnknownNode("missing".into()));
    }

    #[test]
    fn test_forward_references_are_accepted() {
        // Names are linked later by the resolver.
        let mut reg = Registry::new();
        reg.auxiliary("later", Formula::identity("not_yet")).unwrap();
        reg.constant("not_yet", 3.0).unwrap();
        assert!(reg.contains("not_yet"));
    }

    #[test]
    fn test_set_unit() {
        let mut reg = Registry::new();
        reg.constant("price", 108.0).unwrap();
        reg.set_unit("price", "¥/liter").unwrap();
        assert_eq!(reg.meta[0].unit, Some(Unit("¥/liter".into())));
        assert!(reg.set_unit("nope", "m").is_err());
    }

    #[test]
    fn test_metadata_is_name_and_unit() {
        let mut reg = Registry::new();
        reg.constant("price", 108.0).unwrap();
        reg.set_unit("price", "yen").unwrap();
        let json = serde_json::to_string(&reg.meta[0]).unwrap();
        assert_eq!(json, r#"{"name":"price","unit":"yen"}"#);
    }
}
