//! Variable Manager
//!
//! Global environment map plus a stack of local scopes. Reads resolve
//! with scope precedence (innermost first); plain writes go to the scope
//! that already holds the name, otherwise to the global map. Tracks
//! readonly and exported flags; the readonly flag, once set, cannot be
//! cleared and makes writes fail.
//!
//! Special parameters (`$?`, `$#`, positionals, ...) are resolved by the
//! interpreter state, which layers them over this store.

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0}: readonly variable")]
pub struct ReadonlyError(pub String);

/// One variable binding.
#[derive(Debug, Clone, Default)]
pub struct Variable {
    pub value: String,
    pub exported: bool,
    pub readonly: bool,
}

impl Variable {
    fn new(value: impl Into<String>) -> Self {
        Self { value: value.into(), exported: false, readonly: false }
    }
}

/// The scope-stacked variable store.
#[derive(Debug, Clone, Default)]
pub struct VariableManager {
    global: IndexMap<String, Variable>,
    scopes: Vec<IndexMap<String, Variable>>,
}

impl VariableManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a name: innermost local scope first, then outer scopes,
    /// then global.
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        for scope in self.scopes.iter().rev() {
            if let Some(var) = scope.get(name) {
                return Some(var);
            }
        }
        self.global.get(name)
    }

    /// Value of a variable, empty string when unset.
    pub fn get(&self, name: &str) -> String {
        self.lookup(name).map(|v| v.value.clone()).unwrap_or_default()
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn is_readonly(&self, name: &str) -> bool {
        self.lookup(name).map(|v| v.readonly).unwrap_or(false)
    }

    /// Write a variable. If a scope already holds the name, the write
    /// lands there; otherwise it lands in the global map.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<(), ReadonlyError> {
        let value = value.into();
        for scope in self.scopes.iter_mut().rev() {
            if let Some(var) = scope.get_mut(name) {
                if var.readonly {
                    return Err(ReadonlyError(name.to_string()));
                }
                var.value = value;
                return Ok(());
            }
        }
        match self.global.get_mut(name) {
            Some(var) => {
                if var.readonly {
                    return Err(ReadonlyError(name.to_string()));
                }
                var.value = value;
                Ok(())
            }
            None => {
                self.global.insert(name.to_string(), Variable::new(value));
                Ok(())
            }
        }
    }

    /// Force a write into the top-of-stack scope (the `local` builtin's
    /// discipline). Falls back to global when no scope is pushed.
    pub fn set_local(&mut self, name: &str, value: impl Into<String>) -> Result<(), ReadonlyError> {
        if self.is_readonly(name) {
            return Err(ReadonlyError(name.to_string()));
        }
        let value = value.into();
        match self.scopes.last_mut() {
            Some(scope) => {
                scope
                    .entry(name.to_string())
                    .and_modify(|v| v.value = value.clone())
                    .or_insert_with(|| Variable::new(value));
                Ok(())
            }
            None => self.set(name, value),
        }
    }

    /// Remove a binding: from the top scope if present there, else from
    /// global. Not present anywhere is a no-op.
    pub fn unset(&mut self, name: &str) -> Result<(), ReadonlyError> {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(name) {
                if scope.get(name).map(|v| v.readonly).unwrap_or(false) {
                    return Err(ReadonlyError(name.to_string()));
                }
                scope.shift_remove(name);
                return Ok(());
            }
        }
        if self.global.get(name).map(|v| v.readonly).unwrap_or(false) {
            return Err(ReadonlyError(name.to_string()));
        }
        self.global.shift_remove(name);
        Ok(())
    }

    /// Flag a variable for propagation to child processes. Creates an
    /// empty binding when the name is unset.
    pub fn mark_exported(&mut self, name: &str) {
        if let Some(var) = self.lookup_mut(name) {
            var.exported = true;
            return;
        }
        let mut var = Variable::new("");
        var.exported = true;
        self.global.insert(name.to_string(), var);
    }

    /// Flag a variable readonly. Future writes and unsets fail.
    pub fn mark_readonly(&mut self, name: &str) {
        if let Some(var) = self.lookup_mut(name) {
            var.readonly = true;
            return;
        }
        let mut var = Variable::new("");
        var.readonly = true;
        self.global.insert(name.to_string(), var);
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Variable> {
        for scope in self.scopes.iter_mut().rev() {
            if scope.contains_key(name) {
                return scope.get_mut(name);
            }
        }
        self.global.get_mut(name)
    }

    /// Function call discipline.
    pub fn push_scope(&mut self) {
        self.scopes.push(IndexMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Exported name/value pairs, for snapshotting into a child's
    /// environment. Locals shadow globals.
    pub fn exported_list(&self) -> Vec<(String, String)> {
        let mut out: IndexMap<String, String> = IndexMap::new();
        for (name, var) in &self.global {
            if var.exported {
                out.insert(name.clone(), var.value.clone());
            }
        }
        for scope in &self.scopes {
            for (name, var) in scope {
                if var.exported {
                    out.insert(name.clone(), var.value.clone());
                }
            }
        }
        out.into_iter().collect()
    }

    /// All visible names, for diagnostics and suggestions.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.global.keys().cloned().collect();
        for scope in &self.scopes {
            for name in scope.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_global() {
        let mut vars = VariableManager::new();
        vars.set("x", "1").unwrap();
        assert_eq!(vars.get("x"), "1");
        assert!(vars.is_set("x"));
        assert!(!vars.is_set("y"));
        assert_eq!(vars.get("y"), "");
    }

    #[test]
    fn test_scope_precedence() {
        let mut vars = VariableManager::new();
        vars.set("x", "global").unwrap();
        vars.push_scope();
        vars.set_local("x", "local").unwrap();
        assert_eq!(vars.get("x"), "local");
        vars.pop_scope();
        assert_eq!(vars.get("x"), "global");
    }

    #[test]
    fn test_set_writes_owning_scope() {
        let mut vars = VariableManager::new();
        vars.push_scope();
        vars.set_local("x", "a").unwrap();
        // Plain set finds the local binding and updates it there.
        vars.set("x", "b").unwrap();
        assert_eq!(vars.get("x"), "b");
        vars.pop_scope();
        assert!(!vars.is_set("x"));
    }

    #[test]
    fn test_set_without_local_goes_global() {
        let mut vars = VariableManager::new();
        vars.push_scope();
        vars.set("x", "v").unwrap();
        vars.pop_scope();
        assert_eq!(vars.get("x"), "v");
    }

    #[test]
    fn test_readonly_blocks_writes() {
        let mut vars = VariableManager::new();
        vars.set("x", "1").unwrap();
        vars.mark_readonly("x");
        assert!(vars.set("x", "2").is_err());
        assert_eq!(vars.get("x"), "1");
        assert!(vars.unset("x").is_err());
    }

    #[test]
    fn test_readonly_unset_name() {
        let mut vars = VariableManager::new();
        vars.mark_readonly("pinned");
        assert!(vars.is_set("pinned"));
        assert!(vars.set("pinned", "x").is_err());
    }

    #[test]
    fn test_unset() {
        let mut vars = VariableManager::new();
        vars.set("x", "1").unwrap();
        vars.unset("x").unwrap();
        assert!(!vars.is_set("x"));
        // Unsetting a missing name is a no-op.
        vars.unset("missing").unwrap();
    }

    #[test]
    fn test_unset_local_uncovers_global() {
        let mut vars = VariableManager::new();
        vars.set("x", "global").unwrap();
        vars.push_scope();
        vars.set_local("x", "local").unwrap();
        vars.unset("x").unwrap();
        assert_eq!(vars.get("x"), "global");
        vars.pop_scope();
    }

    #[test]
    fn test_exported_list() {
        let mut vars = VariableManager::new();
        vars.set("a", "1").unwrap();
        vars.set("b", "2").unwrap();
        vars.mark_exported("b");
        vars.push_scope();
        vars.set_local("b", "shadow").unwrap();
        vars.mark_exported("b");
        let exported = vars.exported_list();
        assert_eq!(exported, vec![("b".to_string(), "shadow".to_string())]);
    }
}
