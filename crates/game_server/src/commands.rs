//! Server command aliases.
//!
//! Aliases come from the `[aliases]` configuration table. They are registered
//! during startup and re-registered on every reload. Argument placeholders
//! `$1`..`$9` in an expansion are replaced by the matching argument.

use dashmap::DashMap;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct CommandAliases {
    aliases: DashMap<String, Vec<String>>,
}

impl CommandAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every registered alias with `aliases`.
    pub fn register_server_aliases(&self, aliases: &BTreeMap<String, Vec<String>>) -> usize {
        self.aliases.clear();
        for (name, expansions) in aliases {
            let name = name.trim().to_lowercase();
            if name.is_empty() || expansions.is_empty() {
                continue;
            }
            self.aliases.insert(name, expansions.clone());
        }
        self.aliases.len()
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Expands `line` into the command lines it stands for.
    ///
    /// A line whose first word is not an alias expands to itself.
    pub fn expand(&self, line: &str) -> Vec<String> {
        let mut words = line.split_whitespace();
        let Some(label) = words.next() else {
            return Vec::new();
        };
        let args: Vec<&str> = words.collect();

        let Some(expansions) = self.aliases.get(&label.to_lowercase()) else {
            return vec![line.trim().to_string()];
        };

        expansions
            .iter()
            .map(|expansion| {
                let mut expanded = expansion.clone();
                // descending so $1 does not clobber $10-style prefixes
                for (i, arg) in args.iter().enumerate().rev() {
                    expanded = expanded.replace(&format!("${}", i + 1), arg);
                }
                expanded
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> CommandAliases {
        let mut table = BTreeMap::new();
        table.insert("Bye".to_string(), vec!["save-all".to_string(), "stop".to_string()]);
        table.insert("gm".to_string(), vec!["gamemode $1 $2".to_string()]);
        table.insert("empty".to_string(), vec![]);
        let aliases = CommandAliases::new();
        assert_eq!(aliases.register_server_aliases(&table), 2);
        aliases
    }

    #[test]
    fn test_expansion() {
        let aliases = aliases();
        assert_eq!(aliases.expand("bye"), ["save-all", "stop"]);
        assert_eq!(aliases.expand("gm creative Steve"), ["gamemode creative Steve"]);
        assert_eq!(aliases.expand("list"), ["list"]);
        assert!(aliases.expand("   ").is_empty());
    }

    #[test]
    fn test_reregistration_replaces() {
        let aliases = aliases();
        assert!(aliases.is_alias("BYE"));
        aliases.register_server_aliases(&BTreeMap::new());
        assert!(!aliases.is_alias("bye"));
        assert!(aliases.is_empty());
    }
}
