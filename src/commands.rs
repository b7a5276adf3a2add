//! Command registry for text typed into a viewer session
//!
//! A small fixed table: commands are matched case-insensitively on the
//! first token, arguments are split on blanks with double quotes grouping.

use std::sync::Arc;

/// Maximum number of registered commands
pub const MAX_COMMANDS: usize = 32;

/// Maximum number of tokens (command name included) passed to a handler
pub const MAX_ARGS: usize = 12;

/// Reply for input that matches no command
pub const UNKNOWN_COMMAND: &str = "Unknown command. Type 'help'\n";

/// Command handler: receives argv (name first), returns reply text
pub type CommandFn = Arc<dyn Fn(&[String]) -> String + Send + Sync>;

struct CommandEntry {
    name: String,
    args: String,
    help: String,
    handler: CommandFn,
}

/// Table of named commands
#[derive(Default)]
pub struct CommandRegistry {
    entries: Vec<CommandEntry>,
}

impl CommandRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command
    ///
    /// # Arguments
    ///
    /// * `name` - Command word, matched case-insensitively
    /// * `args` - Argument synopsis shown in the help table
    /// * `help` - One-line description
    /// * `handler` - Called with the tokenised input
    ///
    /// # Returns
    ///
    /// `false` if `name` is empty or the table is full
    pub fn add<F>(&mut self, name: &str, args: &str, help: &str, handler: F) -> bool
    where
        F: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        if name.is_empty() || self.entries.len() >= MAX_COMMANDS {
            return false;
        }
        self.entries.push(CommandEntry {
            name: name.to_string(),
            args: args.to_string(),
            help: help.to_string(),
            handler: Arc::new(handler),
        });
        true
    }

    /// Number of registered commands
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no command is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aligned `Commands:` table, or an empty string with no commands
    pub fn help_text(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let name_w = self.entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
        let args_w = self.entries.iter().map(|e| e.args.len()).max().unwrap_or(0);

        let mut out = String::from("Commands:\n");
        for entry in &self.entries {
            out.push_str(&format!("  {:<name_w$} {:<args_w$}", entry.name, entry.args));
            if !entry.help.is_empty() {
                out.push_str("  - ");
                out.push_str(&entry.help);
            }
            out.push('\n');
        }
        out
    }

    /// Find the handler for `argv[0]`
    pub fn lookup(&self, name: &str) -> Option<CommandFn> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.handler.clone())
    }

    /// Run one line of input and return the reply
    pub fn dispatch(&self, raw: &str) -> String {
        let argv = tokenize(raw.trim());
        let Some(name) = argv.first() else {
            return String::new();
        };
        if name == "help" {
            return self.help_text();
        }
        match self.lookup(name) {
            Some(handler) => handler(argv.as_slice()),
            None => UNKNOWN_COMMAND.to_string(),
        }
    }
}

/// Split on spaces and tabs; double quotes group and are stripped
///
/// At most [`MAX_ARGS`] tokens are returned; the rest are dropped.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;

    for ch in input.chars() {
        match ch {
            '"' => quoted = !quoted,
            ' ' | '\t' if !quoted => {
                if !cur.is_empty() && out.len() < MAX_ARGS {
                    out.push(std::mem::take(&mut cur));
                }
                cur.clear();
            }
            _ => cur.push(ch),
        }
    }
    if !cur.is_empty() && out.len() < MAX_ARGS {
        out.push(cur);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CommandRegistry {
        let mut reg = CommandRegistry::new();
        assert!(reg.add("echo", "<text...>", "Print arguments", |argv| {
            format!("{}\n", argv[1..].join(" "))
        }));
        assert!(reg.add("reboot", "", "", |_| "rebooting\n".to_string()));
        reg
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("set  name\t\"two words\" x"), vec!["set", "name", "two words", "x"]);
        assert!(tokenize("   ").is_empty());
        let many = (0..20).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        assert_eq!(tokenize(&many).len(), MAX_ARGS);
    }

    #[test]
    fn test_dispatch_case_insensitive() {
        let reg = registry();
        assert_eq!(reg.dispatch("  ECHO hello world "), "hello world\n");
        assert_eq!(reg.dispatch("reboot"), "rebooting\n");
    }

    #[test]
    fn test_dispatch_unknown_and_empty() {
        let reg = registry();
        assert_eq!(reg.dispatch("launch"), UNKNOWN_COMMAND);
        assert_eq!(reg.dispatch("   "), "");
    }

    #[test]
    fn test_help_table_alignment() {
        let reg = registry();
        let expected = "Commands:\n  echo   <text...>  - Print arguments\n  reboot          \n";
        assert_eq!(reg.help_text(), expected);
        assert_eq!(reg.dispatch("help"), expected);
    }

    #[test]
    fn test_registry_limits() {
        let mut reg = CommandRegistry::new();
        assert!(reg.help_text().is_empty());
        assert!(!reg.add("", "", "", |_| String::new()));
        for i in 0..MAX_COMMANDS {
            assert!(reg.add(&format!("c{}", i), "", "", |_| String::new()));
        }
        assert!(!reg.add("overflow", "", "", |_| String::new()));
        assert_eq!(reg.len(), MAX_COMMANDS);
    }
}
