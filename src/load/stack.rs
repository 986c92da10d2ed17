//! Import stack used for cycle detection and error context

/// Import paths currently being resolved, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStack {
    paths: Vec<String>,
}

impl ImportStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>) {
        self.paths.push(path.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.paths.pop()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// A snapshot of the stack for error reporting.
    pub fn copy(&self) -> Vec<String> {
        self.paths.clone()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_contains() {
        let mut stack = ImportStack::new();
        assert!(stack.is_empty());
        stack.push("a.test/m/a");
        stack.push("a.test/m/b");
        assert!(stack.contains("a.test/m/a"));
        assert!(!stack.contains("a.test/m/c"));

        let snapshot = stack.copy();
        assert_eq!(stack.pop().as_deref(), Some("a.test/m/b"));
        assert_eq!(stack.len(), 1);
        // Snapshots are unaffected by later pops.
        assert_eq!(snapshot, vec!["a.test/m/a", "a.test/m/b"]);
    }
}
