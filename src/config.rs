/// Limits applied while building and resolving a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// How many macro expansions may nest inside each other.
    pub max_expansion_depth: usize,
    /// How deep the tree builder may nest environments, commands and
    /// parameters.
    pub max_nesting_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_expansion_depth: 100,
            max_nesting_depth: 256,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_expansion_depth(mut self, depth: usize) -> Self {
        self.max_expansion_depth = depth;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }
}
