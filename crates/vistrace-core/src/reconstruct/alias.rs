// Formal parameter -> actual argument location, resolved transitively

use std::collections::HashMap;

use crate::trace::Location;

#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    aliases: HashMap<String, Location>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite `location` through the alias chain of its root identifier
    pub fn resolve(&self, location: &Location) -> Location {
        let mut current = location.clone();
        // Bounded by the number of aliases so a malformed cycle terminates
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(&current.identifier) {
                Some(actual) => current = actual.extend(&current.index),
                None => break,
            }
        }
        current
    }

    /// Alias `formal` to wherever `actual` ultimately points
    pub fn bind(&mut self, formal: &str, actual: &Location) {
        let resolved = self.resolve(actual);
        if resolved.identifier == formal {
            self.aliases.remove(formal);
            return;
        }
        self.aliases.insert(formal.to_string(), resolved);
    }

    pub fn unbind(&mut self, formal: &str) {
        self.aliases.remove(formal);
    }

    pub fn get(&self, formal: &str) -> Option<&Location> {
        self.aliases.get(formal)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
